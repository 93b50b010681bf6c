//! Shared primitive types used across the appraisal engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Exact-decimal monetary value or multiplicative factor.
pub type Money = rust_decimal::Decimal;

/// A stable identifier for a pawned garment.
pub type GarmentId = String;

/// Row id assigned by the datastore.
pub type RecordId = i64;

/// The three kinds of valuable piece a garment can hold.
/// Codes are persisted — never rename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PieceKind {
    Jewelry,
    Diamond,
    Complementary,
}

impl PieceKind {
    pub const ALL: [PieceKind; 3] = [
        PieceKind::Jewelry,
        PieceKind::Diamond,
        PieceKind::Complementary,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            PieceKind::Jewelry       => "jewelry",
            PieceKind::Diamond       => "diamond",
            PieceKind::Complementary => "complementary",
        }
    }
}

impl fmt::Display for PieceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Precious metal of a jewelry piece.
///
/// Gold is priced by color and quality; every other metal by
/// metal, quality and range.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Metal {
    Gold,
    Silver,
    Platinum,
    Palladium,
    Other(String),
}

impl Metal {
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_ascii_uppercase().as_str() {
            "AU" | "GOLD" | "ORO"    => Metal::Gold,
            "AG" | "SILVER" | "PLATA" => Metal::Silver,
            "PT" | "PLATINUM"        => Metal::Platinum,
            "PD" | "PALLADIUM"       => Metal::Palladium,
            _ => Metal::Other(code.trim().to_string()),
        }
    }

    /// Canonical code handed to the reference connector.
    pub fn code(&self) -> &str {
        match self {
            Metal::Gold      => "AU",
            Metal::Silver    => "AG",
            Metal::Platinum  => "PT",
            Metal::Palladium => "PD",
            Metal::Other(c)  => c.as_str(),
        }
    }

    pub fn is_gold(&self) -> bool {
        matches!(self, Metal::Gold)
    }
}

impl From<String> for Metal {
    fn from(code: String) -> Self {
        Metal::from_code(&code)
    }
}

impl From<Metal> for String {
    fn from(metal: Metal) -> Self {
        metal.code().to_string()
    }
}

impl fmt::Display for Metal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Inclusive carat band used to select a diamond commercial-value row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaratRange {
    pub low:  Money,
    pub high: Money,
}

impl CaratRange {
    pub fn contains(&self, carats: Money) -> bool {
        carats >= self.low && carats <= self.high
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metal_codes_normalise() {
        assert!(Metal::from_code("au").is_gold());
        assert!(Metal::from_code(" ORO ").is_gold());
        assert_eq!(Metal::from_code("ag"), Metal::Silver);
        assert_eq!(Metal::from_code("TI"), Metal::Other("TI".into()));
        assert_eq!(Metal::Other("TI".into()).code(), "TI");
    }

    #[test]
    fn piece_kind_codes_are_stable() {
        let codes: Vec<_> = PieceKind::ALL.iter().map(|k| k.code()).collect();
        assert_eq!(codes, vec!["jewelry", "diamond", "complementary"]);
    }
}
