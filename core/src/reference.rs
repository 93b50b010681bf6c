//! Reference price connector — the engine's view of the external
//! gold/metal price service and the diamond commercial-value service.
//!
//! RULE: Piece valuation talks to reference data only through
//! `ReferencePriceConnector`. Timeouts and retries, if any, belong to the
//! implementation; the engine treats every `ConnectorError` as final.

use crate::{
    appraisal::AppraisalTriple,
    cache::KeyedCache,
    types::{CaratRange, Money},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectorError {
    #[error("no reference value for {what}")]
    PriceNotFound { what: String },

    #[error("reference service unavailable: {0}")]
    Unavailable(String),

    #[error("malformed reference data: {0}")]
    Malformed(String),
}

pub type ConnectorResult<T> = Result<T, ConnectorError>;

pub trait ReferencePriceConnector: Send + Sync {
    fn gold_price_per_gram(&self, color: &str, quality: &str) -> ConnectorResult<Money>;

    fn metal_price_per_gram(&self, metal: &str, quality: &str, range: &str)
        -> ConnectorResult<Money>;

    fn quality_range_factor(&self, metal: &str, quality: &str, range: &str)
        -> ConnectorResult<Money>;

    /// Commercial `{min, avg, max}` for a stone. `range` pins the carat band
    /// explicitly; otherwise the band containing `carats` is used.
    fn commercial_value(
        &self,
        cut:     &str,
        color:   &str,
        clarity: &str,
        carats:  Money,
        range:   Option<CaratRange>,
    ) -> ConnectorResult<AppraisalTriple>;

    /// Percentage increment granted by a grading certificate (0.10 = +10%).
    fn certificate_modifier(&self, certificate_code: &str) -> ConnectorResult<Money>;
}

impl<T: ReferencePriceConnector + ?Sized> ReferencePriceConnector for Arc<T> {
    fn gold_price_per_gram(&self, color: &str, quality: &str) -> ConnectorResult<Money> {
        (**self).gold_price_per_gram(color, quality)
    }

    fn metal_price_per_gram(&self, metal: &str, quality: &str, range: &str)
        -> ConnectorResult<Money> {
        (**self).metal_price_per_gram(metal, quality, range)
    }

    fn quality_range_factor(&self, metal: &str, quality: &str, range: &str)
        -> ConnectorResult<Money> {
        (**self).quality_range_factor(metal, quality, range)
    }

    fn commercial_value(
        &self,
        cut:     &str,
        color:   &str,
        clarity: &str,
        carats:  Money,
        range:   Option<CaratRange>,
    ) -> ConnectorResult<AppraisalTriple> {
        (**self).commercial_value(cut, color, clarity, carats, range)
    }

    fn certificate_modifier(&self, certificate_code: &str) -> ConnectorResult<Money> {
        (**self).certificate_modifier(certificate_code)
    }
}

// ── Table-backed connector ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoldPriceRow {
    pub color:          String,
    pub quality:        String,
    pub price_per_gram: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetalPriceRow {
    pub metal:          String,
    pub quality:        String,
    pub range:          String,
    pub price_per_gram: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityRangeFactorRow {
    pub metal:   String,
    pub quality: String,
    pub range:   String,
    pub factor:  Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommercialValueRow {
    pub cut:        String,
    pub color:      String,
    pub clarity:    String,
    pub carat_low:  Money,
    pub carat_high: Money,
    pub minimum:    Money,
    pub average:    Money,
    pub maximum:    Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateModifierRow {
    pub code:       String,
    pub percentage: Money,
}

/// Serialized reference data, loaded from `reference/reference_prices.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReferencePriceTable {
    #[serde(default)]
    pub gold_prices: Vec<GoldPriceRow>,
    #[serde(default)]
    pub metal_prices: Vec<MetalPriceRow>,
    #[serde(default)]
    pub quality_range_factors: Vec<QualityRangeFactorRow>,
    #[serde(default)]
    pub commercial_values: Vec<CommercialValueRow>,
    #[serde(default)]
    pub certificate_modifiers: Vec<CertificateModifierRow>,
}

type Band = (CaratRange, AppraisalTriple);

/// Reference connector answering from an in-memory price table.
pub struct StaticReferencePrices {
    gold:         HashMap<String, Money>,
    metal:        HashMap<String, Money>,
    factors:      HashMap<String, Money>,
    commercial:   HashMap<String, Vec<Band>>,
    certificates: HashMap<String, Money>,
}

fn lookup_key(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim().to_ascii_uppercase())
        .collect::<Vec<_>>()
        .join("|")
}

impl StaticReferencePrices {
    pub fn new(table: &ReferencePriceTable) -> ConnectorResult<Self> {
        let gold = table
            .gold_prices
            .iter()
            .map(|r| (lookup_key(&[&r.color, &r.quality]), r.price_per_gram))
            .collect();
        let metal = table
            .metal_prices
            .iter()
            .map(|r| (lookup_key(&[&r.metal, &r.quality, &r.range]), r.price_per_gram))
            .collect();
        let factors = table
            .quality_range_factors
            .iter()
            .map(|r| (lookup_key(&[&r.metal, &r.quality, &r.range]), r.factor))
            .collect();

        let mut commercial: HashMap<String, Vec<Band>> = HashMap::new();
        for row in &table.commercial_values {
            if row.carat_low > row.carat_high {
                return Err(ConnectorError::Malformed(format!(
                    "carat band {}-{} for {}/{}/{} is inverted",
                    row.carat_low, row.carat_high, row.cut, row.color, row.clarity
                )));
            }
            commercial
                .entry(lookup_key(&[&row.cut, &row.color, &row.clarity]))
                .or_default()
                .push((
                    CaratRange { low: row.carat_low, high: row.carat_high },
                    AppraisalTriple::new(row.minimum, row.average, row.maximum),
                ));
        }

        let certificates = table
            .certificate_modifiers
            .iter()
            .map(|r| (lookup_key(&[&r.code]), r.percentage))
            .collect();

        Ok(Self { gold, metal, factors, commercial, certificates })
    }

    fn find(map: &HashMap<String, Money>, parts: &[&str], what: &str) -> ConnectorResult<Money> {
        map.get(&lookup_key(parts))
            .copied()
            .ok_or_else(|| ConnectorError::PriceNotFound {
                what: format!("{what} [{}]", parts.join(", ")),
            })
    }
}

impl ReferencePriceConnector for StaticReferencePrices {
    fn gold_price_per_gram(&self, color: &str, quality: &str) -> ConnectorResult<Money> {
        Self::find(&self.gold, &[color, quality], "gold price")
    }

    fn metal_price_per_gram(&self, metal: &str, quality: &str, range: &str)
        -> ConnectorResult<Money> {
        Self::find(&self.metal, &[metal, quality, range], "metal price")
    }

    fn quality_range_factor(&self, metal: &str, quality: &str, range: &str)
        -> ConnectorResult<Money> {
        Self::find(&self.factors, &[metal, quality, range], "quality/range factor")
    }

    fn commercial_value(
        &self,
        cut:     &str,
        color:   &str,
        clarity: &str,
        carats:  Money,
        range:   Option<CaratRange>,
    ) -> ConnectorResult<AppraisalTriple> {
        let not_found = || ConnectorError::PriceNotFound {
            what: format!("commercial value [{cut}, {color}, {clarity}, {carats}ct]"),
        };
        let bands = self
            .commercial
            .get(&lookup_key(&[cut, color, clarity]))
            .ok_or_else(not_found)?;
        let band = match range {
            Some(r) => bands.iter().find(|(b, _)| *b == r),
            None => bands.iter().find(|(b, _)| b.contains(carats)),
        };
        band.map(|(_, triple)| *triple).ok_or_else(not_found)
    }

    fn certificate_modifier(&self, certificate_code: &str) -> ConnectorResult<Money> {
        Self::find(&self.certificates, &[certificate_code], "certificate modifier")
    }
}

// ── Caching decorator ──────────────────────────────────────────────

/// Cache key: one variant per connector query, carrying every
/// distinguishing parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReferenceQuery {
    GoldPrice { color: String, quality: String },
    MetalPrice { metal: String, quality: String, range: String },
    QualityRangeFactor { metal: String, quality: String, range: String },
    CommercialValue {
        cut:     String,
        color:   String,
        clarity: String,
        carats:  Money,
        range:   Option<CaratRange>,
    },
    CertificateModifier { code: String },
}

/// Memoizes successful lookups of an inner connector. Failures pass
/// through uncached.
pub struct CachingConnector<C> {
    inner:   C,
    scalars: KeyedCache<ReferenceQuery, Money>,
    triples: KeyedCache<ReferenceQuery, AppraisalTriple>,
}

impl<C: ReferencePriceConnector> CachingConnector<C> {
    pub fn new(inner: C, ttl: Option<Duration>) -> Self {
        Self {
            inner,
            scalars: KeyedCache::new(ttl),
            triples: KeyedCache::new(ttl),
        }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Drop every cached answer (e.g. after a reference-data reload).
    pub fn invalidate_all(&self) {
        self.scalars.invalidate_all();
        self.triples.invalidate_all();
    }

    fn scalar(
        &self,
        key: ReferenceQuery,
        fetch: impl FnOnce() -> ConnectorResult<Money>,
    ) -> ConnectorResult<Money> {
        if let Some(hit) = self.scalars.get(&key) {
            return Ok(hit);
        }
        let value = fetch()?;
        self.scalars.insert(key, value);
        Ok(value)
    }
}

impl<C: ReferencePriceConnector> ReferencePriceConnector for CachingConnector<C> {
    fn gold_price_per_gram(&self, color: &str, quality: &str) -> ConnectorResult<Money> {
        let key = ReferenceQuery::GoldPrice {
            color:   color.to_string(),
            quality: quality.to_string(),
        };
        self.scalar(key, || self.inner.gold_price_per_gram(color, quality))
    }

    fn metal_price_per_gram(&self, metal: &str, quality: &str, range: &str)
        -> ConnectorResult<Money> {
        let key = ReferenceQuery::MetalPrice {
            metal:   metal.to_string(),
            quality: quality.to_string(),
            range:   range.to_string(),
        };
        self.scalar(key, || self.inner.metal_price_per_gram(metal, quality, range))
    }

    fn quality_range_factor(&self, metal: &str, quality: &str, range: &str)
        -> ConnectorResult<Money> {
        let key = ReferenceQuery::QualityRangeFactor {
            metal:   metal.to_string(),
            quality: quality.to_string(),
            range:   range.to_string(),
        };
        self.scalar(key, || self.inner.quality_range_factor(metal, quality, range))
    }

    fn commercial_value(
        &self,
        cut:     &str,
        color:   &str,
        clarity: &str,
        carats:  Money,
        range:   Option<CaratRange>,
    ) -> ConnectorResult<AppraisalTriple> {
        let key = ReferenceQuery::CommercialValue {
            cut:     cut.to_string(),
            color:   color.to_string(),
            clarity: clarity.to_string(),
            carats,
            range,
        };
        if let Some(hit) = self.triples.get(&key) {
            return Ok(hit);
        }
        let value = self.inner.commercial_value(cut, color, clarity, carats, range)?;
        self.triples.insert(key, value);
        Ok(value)
    }

    fn certificate_modifier(&self, certificate_code: &str) -> ConnectorResult<Money> {
        let key = ReferenceQuery::CertificateModifier {
            code: certificate_code.to_string(),
        };
        self.scalar(key, || self.inner.certificate_modifier(certificate_code))
    }
}
