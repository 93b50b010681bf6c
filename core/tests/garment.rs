//! Garment aggregation tests.
//!
//! Tests cover: per-kind bucketing, punishment factors, order independence,
//! failure propagation and memoization of the final triple.

use appraisal_core::{
    appraisal::AppraisalTriple,
    config::AppraisalConfig,
    error::{AppraisalError, AppraisalResult},
    garment::Garment,
    piece::{DiamondPiece, JewelryPiece, Piece},
    punishment::{KindFactors, PolicySource, PunishmentPolicy},
    reference::StaticReferencePrices,
    types::{Metal, Money},
};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};

fn dec(s: &str) -> Money {
    s.parse().expect("decimal literal")
}

fn prices() -> StaticReferencePrices {
    StaticReferencePrices::new(&AppraisalConfig::default_test().reference_prices)
        .expect("test price table")
}

fn epoch() -> DateTime<Utc> {
    DateTime::from_timestamp(0, 0).expect("epoch")
}

/// Always answers with the same policy and counts how often it was asked.
struct FixedPolicy {
    policy: Option<PunishmentPolicy>,
    asked:  AtomicUsize,
}

impl FixedPolicy {
    fn new(jewelry: &str, diamond: &str, complementary: &str) -> Self {
        let factors = KindFactors {
            jewelry:       dec(jewelry),
            diamond:       dec(diamond),
            complementary: dec(complementary),
        };
        let policy = PunishmentPolicy::new(factors, epoch()).expect("valid policy");
        Self { policy: Some(policy), asked: AtomicUsize::new(0) }
    }

    fn missing() -> Self {
        Self { policy: None, asked: AtomicUsize::new(0) }
    }
}

impl PolicySource for FixedPolicy {
    fn current(&self) -> AppraisalResult<PunishmentPolicy> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        self.policy.clone().ok_or(AppraisalError::NoCurrentPolicy)
    }
}

fn gold_ring(weight: &str) -> Piece {
    Piece::jewelry(JewelryPiece {
        metal:   Metal::Gold,
        color:   "YELLOW".into(),
        quality: "14K".into(),
        range:   "R1".into(),
        weight:  dec(weight),
        increment_factor:    None,
        displacement_factor: None,
        expert_value:        None,
    })
    .expect("valid ring")
}

fn stone(color: &str) -> Piece {
    Piece::diamond(DiamondPiece {
        cut:     "ROUND".into(),
        color:   color.into(),
        clarity: "VS1".into(),
        carats:  dec("0.75"),
        carat_range:      None,
        certificate_code: None,
        expert_value:     None,
    })
    .expect("valid stone")
}

/// A single 120 jewelry piece under a 1.2 jewelry factor is 144.
#[test]
fn jewelry_subtotal_takes_jewelry_factor() {
    let garment = Garment::new("G-1".into(), "GOOD".into(), vec![gold_ring("3")]).unwrap();
    let policy = FixedPolicy::new("1.2", "0.9", "0.5");

    let total = garment.valuate(&prices(), &policy).unwrap();
    assert_eq!(total, AppraisalTriple::flat(dec("144")));
}

#[test]
fn each_kind_is_bucketed_and_punished_separately() {
    let garment = Garment::new(
        "G-2".into(),
        "GOOD".into(),
        vec![
            gold_ring("3"),                           // 120
            stone("G"),                               // 400 / 500 / 600
            Piece::complementary(dec("80")).unwrap(), // 80
        ],
    )
    .unwrap();
    let policy = FixedPolicy::new("1.2", "0.9", "0.5");

    let valuation = garment.valuate_detailed(&prices(), &policy).unwrap();
    assert_eq!(valuation.subtotals.jewelry, AppraisalTriple::flat(dec("120")));
    assert_eq!(
        valuation.subtotals.diamond,
        AppraisalTriple::new(dec("400"), dec("500"), dec("600"))
    );
    assert_eq!(valuation.subtotals.complementary, AppraisalTriple::flat(dec("80")));

    // 144 + {360, 450, 540} + 40
    assert_eq!(
        valuation.total,
        AppraisalTriple::new(dec("544"), dec("634"), dec("724"))
    );
    assert_eq!(valuation.punished.total(), valuation.total);
}

#[test]
fn piece_order_does_not_change_total() {
    let policy = FixedPolicy::new("1.2", "0.9", "0.5");
    let forward = Garment::new(
        "G-3".into(),
        "GOOD".into(),
        vec![gold_ring("3"), stone("G"), Piece::complementary(dec("80")).unwrap()],
    )
    .unwrap();
    let reversed = Garment::new(
        "G-4".into(),
        "GOOD".into(),
        vec![Piece::complementary(dec("80")).unwrap(), stone("G"), gold_ring("3")],
    )
    .unwrap();

    assert_eq!(
        forward.valuate(&prices(), &policy).unwrap(),
        reversed.valuate(&prices(), &policy).unwrap()
    );
}

#[test]
fn empty_garment_is_rejected() {
    let result = Garment::new("G-5".into(), "GOOD".into(), Vec::new());
    assert!(matches!(result, Err(AppraisalError::InvalidArgument(_))));
}

#[test]
fn blank_condition_code_is_rejected() {
    let result = Garment::new("G-6".into(), " ".into(), vec![gold_ring("3")]);
    assert!(matches!(result, Err(AppraisalError::InvalidArgument(_))));
}

/// One unknown stone fails the whole garment; nothing is cached.
#[test]
fn piece_failure_aborts_the_garment() {
    let garment = Garment::new(
        "G-7".into(),
        "GOOD".into(),
        vec![gold_ring("3"), stone("Z")],
    )
    .unwrap();
    let policy = FixedPolicy::new("1.2", "0.9", "0.5");

    let err = garment.valuate(&prices(), &policy).unwrap_err();
    assert!(matches!(err, AppraisalError::ReferenceService(_)), "unexpected error: {err}");
    assert_eq!(garment.cached_total(), None);
}

#[test]
fn missing_policy_fails_valuation() {
    let garment = Garment::new("G-8".into(), "GOOD".into(), vec![gold_ring("3")]).unwrap();

    let err = garment.valuate(&prices(), &FixedPolicy::missing()).unwrap_err();
    assert!(matches!(err, AppraisalError::NoCurrentPolicy));
}

#[test]
fn garment_total_is_memoized() {
    let garment = Garment::new("G-9".into(), "GOOD".into(), vec![gold_ring("3")]).unwrap();
    let policy = FixedPolicy::new("1.2", "0.9", "0.5");

    let first = garment.valuate(&prices(), &policy).unwrap();
    let second = garment.valuate(&prices(), &policy).unwrap();

    assert_eq!(first, second);
    assert_eq!(policy.asked.load(Ordering::SeqCst), 1);
    assert_eq!(garment.cached_total(), Some(first));
}

/// Piece count is informational; the piece is valued once.
#[test]
fn piece_count_does_not_multiply_value() {
    let pair = Piece::new(
        appraisal_core::piece::PieceDetails::Jewelry(JewelryPiece {
            metal:   Metal::Gold,
            color:   "YELLOW".into(),
            quality: "14K".into(),
            range:   "R1".into(),
            weight:  dec("3"),
            increment_factor:    None,
            displacement_factor: None,
            expert_value:        None,
        }),
        2,
    )
    .unwrap();
    let garment = Garment::new("G-10".into(), "GOOD".into(), vec![pair]).unwrap();
    let policy = FixedPolicy::new("1", "1", "1");

    assert_eq!(
        garment.valuate(&prices(), &policy).unwrap(),
        AppraisalTriple::flat(dec("120"))
    );
}
