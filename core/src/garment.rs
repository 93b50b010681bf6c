//! Garment aggregation — sums piece appraisals per kind, applies the
//! punishment factors in force and caches the final triple.
//!
//! Order of pieces does not affect the total. Any piece failure aborts the
//! whole valuation; no piece is ever counted as zero.

use crate::{
    appraisal::AppraisalTriple,
    error::{AppraisalError, AppraisalResult},
    piece::{require_code, Piece, Valuable},
    punishment::{PolicySource, PunishmentPolicy},
    reference::ReferencePriceConnector,
    types::{GarmentId, PieceKind},
};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};

/// Running subtotal per piece kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindTotals {
    pub jewelry:       AppraisalTriple,
    pub diamond:       AppraisalTriple,
    pub complementary: AppraisalTriple,
}

impl KindTotals {
    pub fn get(&self, kind: PieceKind) -> AppraisalTriple {
        match kind {
            PieceKind::Jewelry       => self.jewelry,
            PieceKind::Diamond       => self.diamond,
            PieceKind::Complementary => self.complementary,
        }
    }

    /// Add `value` into the bucket for `kind`.
    #[must_use]
    pub fn accumulate(self, kind: PieceKind, value: &AppraisalTriple) -> Self {
        let mut next = self;
        match kind {
            PieceKind::Jewelry       => next.jewelry = next.jewelry.add(value),
            PieceKind::Diamond       => next.diamond = next.diamond.add(value),
            PieceKind::Complementary => next.complementary = next.complementary.add(value),
        }
        next
    }

    /// Each bucket multiplied by its kind's factor.
    #[must_use]
    pub fn punished(&self, policy: &PunishmentPolicy) -> Self {
        Self {
            jewelry:       self.jewelry.multiply(policy.factor(PieceKind::Jewelry)),
            diamond:       self.diamond.multiply(policy.factor(PieceKind::Diamond)),
            complementary: self.complementary.multiply(policy.factor(PieceKind::Complementary)),
        }
    }

    pub fn total(&self) -> AppraisalTriple {
        self.jewelry.add(&self.diamond).add(&self.complementary)
    }
}

/// Full result of a garment valuation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GarmentValuation {
    /// Per-kind sums before punishment factors.
    pub subtotals: KindTotals,
    /// Per-kind sums after punishment factors.
    pub punished:  KindTotals,
    pub total:     AppraisalTriple,
    pub policy:    PunishmentPolicy,
}

#[derive(Debug)]
pub struct Garment {
    id:             GarmentId,
    condition_code: String,
    pieces:         Vec<Piece>,
    valuation:      Mutex<Option<GarmentValuation>>,
}

impl Garment {
    /// Rejects an empty piece list or a blank condition code up front.
    pub fn new(id: GarmentId, condition_code: String, pieces: Vec<Piece>) -> AppraisalResult<Self> {
        require_code("garment id", &id)?;
        require_code("garment condition code", &condition_code)?;
        if pieces.is_empty() {
            return Err(AppraisalError::invalid(format!(
                "garment {id} must contain at least one piece"
            )));
        }
        Ok(Self {
            id,
            condition_code,
            pieces,
            valuation: Mutex::new(None),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn condition_code(&self) -> &str {
        &self.condition_code
    }

    pub fn pieces(&self) -> &[Piece] {
        &self.pieces
    }

    /// Value every piece and sum per kind (no factors applied).
    pub fn subtotals(&self, connector: &dyn ReferencePriceConnector) -> AppraisalResult<KindTotals> {
        let mut totals = KindTotals::default();
        for piece in &self.pieces {
            let value = piece.valuate(connector)?;
            totals = totals.accumulate(piece.kind(), &value);
        }
        Ok(totals)
    }

    /// Value the garment under the policy in force; memoized.
    pub fn valuate_detailed(
        &self,
        connector: &dyn ReferencePriceConnector,
        policies:  &dyn PolicySource,
    ) -> AppraisalResult<GarmentValuation> {
        let mut slot = self.lock();
        if let Some(cached) = slot.as_ref() {
            return Ok(cached.clone());
        }

        let subtotals = self.subtotals(connector)?;
        let policy = policies.current()?;
        let punished = subtotals.punished(&policy);
        let total = punished.total();

        log::info!(
            "garment {}: {} pieces, policy {:?}, total {total}",
            self.id,
            self.pieces.len(),
            policy.id
        );

        let valuation = GarmentValuation { subtotals, punished, total, policy };
        *slot = Some(valuation.clone());
        Ok(valuation)
    }

    pub fn valuate(
        &self,
        connector: &dyn ReferencePriceConnector,
        policies:  &dyn PolicySource,
    ) -> AppraisalResult<AppraisalTriple> {
        Ok(self.valuate_detailed(connector, policies)?.total)
    }

    pub fn cached_total(&self) -> Option<AppraisalTriple> {
        self.lock().as_ref().map(|v| v.total)
    }

    fn lock(&self) -> MutexGuard<'_, Option<GarmentValuation>> {
        self.valuation.lock().unwrap_or_else(|e| e.into_inner())
    }
}
