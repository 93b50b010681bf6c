//! Piece valuation — per-kind pricing of a single valuable.
//!
//! A `Piece` wraps one of three variants and memoizes its appraisal:
//! the first `valuate()` computes under a per-instance lock, every later
//! call returns the cached triple without touching the connector.
//! A failed valuation caches nothing.

use crate::{
    appraisal::AppraisalTriple,
    error::{AppraisalError, AppraisalResult},
    reference::ReferencePriceConnector,
    types::{CaratRange, Metal, Money, PieceKind},
};
use std::sync::{Mutex, MutexGuard};

/// Anything that can produce an appraisal triple.
pub trait Valuable {
    fn kind(&self) -> PieceKind;

    fn valuate(&self, connector: &dyn ReferencePriceConnector) -> AppraisalResult<AppraisalTriple>;
}

// ── Validation helpers ─────────────────────────────────────────────

pub(crate) fn require_code(field: &str, value: &str) -> AppraisalResult<()> {
    if value.trim().is_empty() {
        return Err(AppraisalError::invalid(format!("{field} must not be blank")));
    }
    Ok(())
}

pub(crate) fn require_positive(field: &str, value: Money) -> AppraisalResult<()> {
    if value <= Money::ZERO {
        return Err(AppraisalError::invalid(format!(
            "{field} must be greater than zero, got {value}"
        )));
    }
    Ok(())
}

fn require_positive_if_present(field: &str, value: Option<Money>) -> AppraisalResult<()> {
    match value {
        Some(v) => require_positive(field, v),
        None => Ok(()),
    }
}

/// `Some(f)` only when the optional factor is present and positive.
fn applicable(factor: Option<Money>) -> Option<Money> {
    factor.filter(|f| *f > Money::ZERO)
}

// ── Jewelry ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct JewelryPiece {
    pub metal:   Metal,
    pub color:   String,
    pub quality: String,
    pub range:   String,
    /// Grams.
    pub weight:  Money,
    /// Physical-condition increment; multiplied in only when > 0.
    pub increment_factor: Option<Money>,
    /// Commercial displacement; multiplied in only when > 0.
    pub displacement_factor: Option<Money>,
    /// Carried for the record; the metal algorithm does not use it.
    pub expert_value: Option<Money>,
}

impl JewelryPiece {
    pub fn validate(&self) -> AppraisalResult<()> {
        require_code("jewelry metal", self.metal.code())?;
        require_code("jewelry color", &self.color)?;
        require_code("jewelry quality", &self.quality)?;
        require_code("jewelry range", &self.range)?;
        require_positive("jewelry weight", self.weight)?;
        require_positive_if_present("jewelry expert value", self.expert_value)
    }

    pub fn appraise(&self, connector: &dyn ReferencePriceConnector) -> AppraisalResult<AppraisalTriple> {
        let metal = self.metal.code();
        let price_per_gram = if self.metal.is_gold() {
            connector.gold_price_per_gram(&self.color, &self.quality)?
        } else {
            connector.metal_price_per_gram(metal, &self.quality, &self.range)?
        };
        let factor = connector.quality_range_factor(metal, &self.quality, &self.range)?;

        let mut base = price_per_gram * self.weight * factor;
        if let Some(increment) = applicable(self.increment_factor) {
            base *= increment;
        }
        if let Some(displacement) = applicable(self.displacement_factor) {
            base *= displacement;
        }

        log::debug!(
            "jewelry {metal}/{}/{}: {}g x {price_per_gram} x {factor} -> {base}",
            self.quality, self.range, self.weight
        );
        Ok(AppraisalTriple::flat(base))
    }
}

// ── Diamond ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct DiamondPiece {
    pub cut:     String,
    pub color:   String,
    pub clarity: String,
    pub carats:  Money,
    pub carat_range: Option<CaratRange>,
    pub certificate_code: Option<String>,
    pub expert_value: Option<Money>,
}

impl DiamondPiece {
    pub fn validate(&self) -> AppraisalResult<()> {
        require_code("diamond cut", &self.cut)?;
        require_code("diamond color", &self.color)?;
        require_code("diamond clarity", &self.clarity)?;
        require_positive("diamond carats", self.carats)?;
        if let Some(range) = &self.carat_range {
            require_positive("diamond carat range low", range.low)?;
            if range.low > range.high {
                return Err(AppraisalError::invalid(format!(
                    "diamond carat range {}-{} is inverted",
                    range.low, range.high
                )));
            }
        }
        if let Some(code) = &self.certificate_code {
            require_code("diamond certificate code", code)?;
        }
        require_positive_if_present("diamond expert value", self.expert_value)
    }

    pub fn appraise(&self, connector: &dyn ReferencePriceConnector) -> AppraisalResult<AppraisalTriple> {
        let mut triple = match self.expert_value {
            Some(expert) => AppraisalTriple::flat(expert),
            None => connector.commercial_value(
                &self.cut,
                &self.color,
                &self.clarity,
                self.carats,
                self.carat_range,
            )?,
        };

        if let Some(code) = &self.certificate_code {
            let pct = connector.certificate_modifier(code)?;
            if pct > Money::ZERO {
                triple = triple.increase_by_percentage(pct);
            }
        }

        if !triple.is_ordered() {
            log::warn!(
                "diamond {}/{}/{} {}ct: appraisal bounds out of order ({triple})",
                self.cut, self.color, self.clarity, self.carats
            );
        }
        Ok(triple)
    }
}

// ── Complementary ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct ComplementaryPiece {
    pub expert_value: Money,
}

impl ComplementaryPiece {
    pub fn validate(&self) -> AppraisalResult<()> {
        require_positive("complementary expert value", self.expert_value)
    }

    pub fn appraise(&self) -> AppraisalTriple {
        AppraisalTriple::flat(self.expert_value)
    }
}

// ── Piece ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum PieceDetails {
    Jewelry(JewelryPiece),
    Diamond(DiamondPiece),
    Complementary(ComplementaryPiece),
}

impl PieceDetails {
    pub fn kind(&self) -> PieceKind {
        match self {
            PieceDetails::Jewelry(_)       => PieceKind::Jewelry,
            PieceDetails::Diamond(_)       => PieceKind::Diamond,
            PieceDetails::Complementary(_) => PieceKind::Complementary,
        }
    }

    fn validate(&self) -> AppraisalResult<()> {
        match self {
            PieceDetails::Jewelry(j)       => j.validate(),
            PieceDetails::Diamond(d)       => d.validate(),
            PieceDetails::Complementary(c) => c.validate(),
        }
    }
}

#[derive(Debug)]
pub struct Piece {
    piece_count: u32,
    details:     PieceDetails,
    appraisal:   Mutex<Option<AppraisalTriple>>,
}

impl Piece {
    /// Validate and wrap piece details. Fails fast, before any lookup.
    pub fn new(details: PieceDetails, piece_count: u32) -> AppraisalResult<Self> {
        if piece_count < 1 {
            return Err(AppraisalError::invalid("piece count must be at least 1"));
        }
        details.validate()?;
        Ok(Self {
            piece_count,
            details,
            appraisal: Mutex::new(None),
        })
    }

    pub fn jewelry(piece: JewelryPiece) -> AppraisalResult<Self> {
        Self::new(PieceDetails::Jewelry(piece), 1)
    }

    pub fn diamond(piece: DiamondPiece) -> AppraisalResult<Self> {
        Self::new(PieceDetails::Diamond(piece), 1)
    }

    pub fn complementary(expert_value: Money) -> AppraisalResult<Self> {
        Self::new(PieceDetails::Complementary(ComplementaryPiece { expert_value }), 1)
    }

    pub fn piece_count(&self) -> u32 {
        self.piece_count
    }

    pub fn details(&self) -> &PieceDetails {
        &self.details
    }

    /// The memoized appraisal, if `valuate()` has succeeded already.
    pub fn cached_appraisal(&self) -> Option<AppraisalTriple> {
        *self.lock()
    }

    fn lock(&self) -> MutexGuard<'_, Option<AppraisalTriple>> {
        // The slot is either empty or a complete value.
        self.appraisal.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Valuable for Piece {
    fn kind(&self) -> PieceKind {
        self.details.kind()
    }

    fn valuate(&self, connector: &dyn ReferencePriceConnector) -> AppraisalResult<AppraisalTriple> {
        let mut slot = self.lock();
        if let Some(cached) = *slot {
            return Ok(cached);
        }
        let triple = match &self.details {
            PieceDetails::Jewelry(j)       => j.appraise(connector)?,
            PieceDetails::Diamond(d)       => d.appraise(connector)?,
            PieceDetails::Complementary(c) => c.appraise(),
        };
        *slot = Some(triple);
        Ok(triple)
    }
}
