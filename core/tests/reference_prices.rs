//! Reference price connector tests.
//!
//! Tests cover: table lookups, carat band selection, malformed tables and
//! the caching decorator.

use appraisal_core::{
    appraisal::AppraisalTriple,
    config::AppraisalConfig,
    reference::{
        CachingConnector, CommercialValueRow, ConnectorError, ConnectorResult,
        ReferencePriceConnector, ReferencePriceTable, StaticReferencePrices,
    },
    types::{CaratRange, Money},
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn dec(s: &str) -> Money {
    s.parse().expect("decimal literal")
}

fn prices() -> StaticReferencePrices {
    StaticReferencePrices::new(&AppraisalConfig::default_test().reference_prices)
        .expect("test price table")
}

#[test]
fn lookups_ignore_case_and_padding() {
    let prices = prices();
    assert_eq!(prices.gold_price_per_gram(" yellow", "14k").unwrap(), dec("50"));
    assert_eq!(prices.metal_price_per_gram("ag", "925", "r1").unwrap(), dec("1.5"));
    assert_eq!(prices.quality_range_factor("AU", "18K", "R1").unwrap(), dec("0.9"));
    assert_eq!(prices.certificate_modifier("gia").unwrap(), dec("0.10"));
}

#[test]
fn missing_rows_are_price_not_found() {
    let prices = prices();
    assert!(matches!(
        prices.gold_price_per_gram("GREEN", "14K"),
        Err(ConnectorError::PriceNotFound { .. })
    ));
    assert!(matches!(
        prices.certificate_modifier("XYZ"),
        Err(ConnectorError::PriceNotFound { .. })
    ));
}

#[test]
fn carat_bands_are_inclusive() {
    let prices = prices();
    let low = prices.commercial_value("ROUND", "G", "VS1", dec("0.50"), None).unwrap();
    let high = prices.commercial_value("ROUND", "G", "VS1", dec("1.49"), None).unwrap();

    assert_eq!(low, AppraisalTriple::new(dec("400"), dec("500"), dec("600")));
    assert_eq!(high, AppraisalTriple::new(dec("900"), dec("1000"), dec("1100")));
    assert!(matches!(
        prices.commercial_value("ROUND", "G", "VS1", dec("2.00"), None),
        Err(ConnectorError::PriceNotFound { .. })
    ));
}

#[test]
fn explicit_range_must_match_a_band_exactly() {
    let prices = prices();
    let pinned = CaratRange { low: dec("1.00"), high: dec("1.49") };
    let odd = CaratRange { low: dec("1.00"), high: dec("1.25") };

    assert!(prices.commercial_value("ROUND", "G", "VS1", dec("0.7"), Some(pinned)).is_ok());
    assert!(prices.commercial_value("ROUND", "G", "VS1", dec("1.1"), Some(odd)).is_err());
}

#[test]
fn inverted_band_is_malformed() {
    let table = ReferencePriceTable {
        commercial_values: vec![CommercialValueRow {
            cut: "ROUND".into(), color: "G".into(), clarity: "VS1".into(),
            carat_low: dec("1.49"), carat_high: dec("1.00"),
            minimum: dec("900"), average: dec("1000"), maximum: dec("1100"),
        }],
        ..ReferencePriceTable::default()
    };
    assert!(matches!(
        StaticReferencePrices::new(&table),
        Err(ConnectorError::Malformed(_))
    ));
}

/// Counts gold lookups and fails the first `failures` of them.
struct FlakyGold {
    calls:    AtomicUsize,
    failures: usize,
}

impl ReferencePriceConnector for FlakyGold {
    fn gold_price_per_gram(&self, _color: &str, _quality: &str) -> ConnectorResult<Money> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            return Err(ConnectorError::Unavailable("timeout".into()));
        }
        Ok(dec("50"))
    }

    fn metal_price_per_gram(&self, _: &str, _: &str, _: &str) -> ConnectorResult<Money> {
        Err(ConnectorError::Unavailable("not wired".into()))
    }

    fn quality_range_factor(&self, _: &str, _: &str, _: &str) -> ConnectorResult<Money> {
        Err(ConnectorError::Unavailable("not wired".into()))
    }

    fn commercial_value(
        &self,
        _: &str,
        _: &str,
        _: &str,
        _: Money,
        _: Option<CaratRange>,
    ) -> ConnectorResult<AppraisalTriple> {
        Err(ConnectorError::Unavailable("not wired".into()))
    }

    fn certificate_modifier(&self, _: &str) -> ConnectorResult<Money> {
        Err(ConnectorError::Unavailable("not wired".into()))
    }
}

#[test]
fn caching_connector_memoizes_successes_only() {
    let cached = CachingConnector::new(
        FlakyGold { calls: AtomicUsize::new(0), failures: 1 },
        None,
    );

    assert!(cached.gold_price_per_gram("YELLOW", "14K").is_err());
    assert_eq!(cached.gold_price_per_gram("YELLOW", "14K").unwrap(), dec("50"));
    assert_eq!(cached.gold_price_per_gram("YELLOW", "14K").unwrap(), dec("50"));
    assert_eq!(cached.inner().calls.load(Ordering::SeqCst), 2);

    // A different key is a different query.
    cached.gold_price_per_gram("WHITE", "18K").unwrap();
    assert_eq!(cached.inner().calls.load(Ordering::SeqCst), 3);

    cached.invalidate_all();
    cached.gold_price_per_gram("YELLOW", "14K").unwrap();
    assert_eq!(cached.inner().calls.load(Ordering::SeqCst), 4);
}

#[test]
fn zero_ttl_disables_caching() {
    let cached = CachingConnector::new(
        FlakyGold { calls: AtomicUsize::new(0), failures: 0 },
        Some(Duration::ZERO),
    );

    cached.gold_price_per_gram("YELLOW", "14K").unwrap();
    cached.gold_price_per_gram("YELLOW", "14K").unwrap();
    assert_eq!(cached.inner().calls.load(Ordering::SeqCst), 2);
}
