//! The appraisal engine — turns a garment request into a logged appraisal.
//!
//! FLOW (fixed):
//!   1. Validate the request into pieces and a `Garment` (no I/O on failure).
//!   2. Resolve optional jewelry factors:
//!        - increment from the current condition modifier list, when asked;
//!        - displacement from the parameter service, when configured.
//!   3. Value every piece against the reference connector.
//!   4. Bucket per kind, apply the current punishment policy, sum.
//!   5. Append the report to the appraisal log.
//!
//! RULES:
//!   - The engine owns no SQL; registries and the store do.
//!   - "Now" comes only from the injected clock.

use crate::{
    appraisal::AppraisalTriple,
    clock::{Clock, SystemClock},
    condition::ConditionModifierRegistry,
    config::AppraisalConfig,
    error::{AppraisalError, AppraisalResult},
    garment::{Garment, KindTotals},
    parameter::{ParameterService, StoreParameterService},
    piece::{ComplementaryPiece, DiamondPiece, JewelryPiece, Piece, PieceDetails},
    punishment::{PolicySource, PunishmentPolicyRegistry},
    reference::{CachingConnector, ReferencePriceConnector, StaticReferencePrices},
    request::{GarmentRequest, PieceDescriptor},
    store::AppraisalStore,
    types::{GarmentId, Metal, Money, RecordId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What the engine returns and logs for one appraisal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppraisalReport {
    pub garment_id:     GarmentId,
    pub condition_code: String,
    pub piece_count:    u64,
    /// Per-kind sums before punishment factors.
    pub subtotals:      KindTotals,
    pub total:          AppraisalTriple,
    pub policy_id:      Option<RecordId>,
    pub appraised_at:   DateTime<Utc>,
}

pub struct AppraisalEngine {
    config:     AppraisalConfig,
    store:      Arc<AppraisalStore>,
    clock:      Arc<dyn Clock>,
    connector:  Box<dyn ReferencePriceConnector>,
    policies:   PunishmentPolicyRegistry,
    conditions: ConditionModifierRegistry,
    parameters: StoreParameterService,
}

impl AppraisalEngine {
    /// Wire an engine around an explicit connector.
    pub fn new(
        config:    AppraisalConfig,
        store:     Arc<AppraisalStore>,
        clock:     Arc<dyn Clock>,
        connector: Box<dyn ReferencePriceConnector>,
    ) -> Self {
        let policies = PunishmentPolicyRegistry::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            config.settings.policy_cache_ttl(),
        );
        let conditions = ConditionModifierRegistry::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            config.settings.condition_cache_ttl(),
        );
        let parameters = StoreParameterService::new(Arc::clone(&store), Arc::clone(&clock));
        Self {
            config,
            store,
            clock,
            connector,
            policies,
            conditions,
            parameters,
        }
    }

    /// Build a fully wired engine: table-backed reference prices behind a
    /// caching decorator. Call this instead of new() in production.
    pub fn build(
        config: AppraisalConfig,
        store:  Arc<AppraisalStore>,
        clock:  Arc<dyn Clock>,
    ) -> AppraisalResult<Self> {
        let prices = StaticReferencePrices::new(&config.reference_prices)?;
        let connector = CachingConnector::new(prices, Some(config.settings.reference_cache_ttl()));
        Ok(Self::new(config, store, clock, Box::new(connector)))
    }

    /// In-memory, migrated, seeded engine on the test configuration.
    pub fn build_test() -> AppraisalResult<Self> {
        let store = AppraisalStore::in_memory()?;
        store.migrate()?;
        let engine = Self::build(
            AppraisalConfig::default_test(),
            Arc::new(store),
            Arc::new(SystemClock),
        )?;
        engine.seed_defaults()?;
        Ok(engine)
    }

    /// Install configured seed data into whichever stores are still empty.
    /// Idempotent.
    pub fn seed_defaults(&self) -> AppraisalResult<()> {
        if self.policies.is_empty()? {
            let policy = self.config.punishment_policy.to_policy(self.clock.now())?;
            self.policies.update(&policy)?;
        }

        match self.conditions.current_list() {
            Ok(_) => {}
            Err(AppraisalError::NoCurrentConditionList) => {
                let list = self.config.condition_modifiers.to_list()?;
                self.conditions.update(&list)?;
            }
            Err(e) => return Err(e),
        }

        if self.parameters.is_empty()? {
            for entry in &self.config.parameters {
                self.parameters.set_parameter(entry)?;
            }
            log::info!("engine: seeded {} parameters", self.config.parameters.len());
        }
        Ok(())
    }

    // ── Appraisal ──────────────────────────────────────────────────

    /// Validate the request into a garment. Fails before any valuation.
    pub fn build_garment(&self, request: &GarmentRequest) -> AppraisalResult<Garment> {
        let garment_id = request
            .garment_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let pieces = request
            .pieces
            .iter()
            .map(|descriptor| self.build_piece(request, descriptor))
            .collect::<AppraisalResult<Vec<_>>>()?;

        Garment::new(garment_id, request.condition_code.clone(), pieces)
    }

    pub fn appraise(&self, request: &GarmentRequest) -> AppraisalResult<AppraisalReport> {
        let garment = self.build_garment(request)?;
        let valuation = garment.valuate_detailed(self.connector.as_ref(), &self.policies)?;

        let report = AppraisalReport {
            garment_id:     garment.id().to_string(),
            condition_code: garment.condition_code().to_string(),
            piece_count:    garment.pieces().iter().map(|p| u64::from(p.piece_count())).sum(),
            subtotals:      valuation.subtotals,
            total:          valuation.total,
            policy_id:      valuation.policy.id,
            appraised_at:   self.clock.now(),
        };
        let log_id = self.store.insert_appraisal(&report)?;
        log::info!(
            "engine: appraisal {log_id} for garment {} -> {}",
            report.garment_id, report.total
        );
        Ok(report)
    }

    pub fn appraisals_for_garment(&self, garment_id: &str) -> AppraisalResult<Vec<AppraisalReport>> {
        self.store.appraisals_for_garment(garment_id)
    }

    fn build_piece(&self, request: &GarmentRequest, descriptor: &PieceDescriptor) -> AppraisalResult<Piece> {
        match descriptor {
            PieceDescriptor::Jewelry {
                metal, color, quality, range, weight, piece_count,
                increment_factor, displacement_factor, expert_value,
            } => {
                let jewelry = JewelryPiece {
                    metal:   metal.clone(),
                    color:   color.clone(),
                    quality: quality.clone(),
                    range:   range.clone(),
                    weight:  *weight,
                    increment_factor:    self.resolve_increment(request, *increment_factor)?,
                    displacement_factor: self.resolve_displacement(metal, *displacement_factor)?,
                    expert_value:        *expert_value,
                };
                Piece::new(PieceDetails::Jewelry(jewelry), *piece_count)
            }
            PieceDescriptor::Diamond {
                cut, color, clarity, carats, piece_count,
                carat_range, certificate_code, expert_value,
            } => {
                let diamond = DiamondPiece {
                    cut:     cut.clone(),
                    color:   color.clone(),
                    clarity: clarity.clone(),
                    carats:  *carats,
                    carat_range:      *carat_range,
                    certificate_code: certificate_code.clone(),
                    expert_value:     *expert_value,
                };
                Piece::new(PieceDetails::Diamond(diamond), *piece_count)
            }
            PieceDescriptor::Complementary { expert_value, piece_count } => Piece::new(
                PieceDetails::Complementary(ComplementaryPiece { expert_value: *expert_value }),
                *piece_count,
            ),
        }
    }

    fn resolve_increment(
        &self,
        request:  &GarmentRequest,
        explicit: Option<Money>,
    ) -> AppraisalResult<Option<Money>> {
        if explicit.is_some() || !request.apply_condition_increment {
            return Ok(explicit);
        }
        let modifier = self.conditions.lookup_modifier(&request.condition_code)?;
        log::debug!(
            "engine: condition {} increment {}",
            modifier.condition_code, modifier.factor
        );
        Ok(Some(modifier.factor))
    }

    fn resolve_displacement(&self, metal: &Metal, explicit: Option<Money>) -> AppraisalResult<Option<Money>> {
        if explicit.is_some() {
            return Ok(explicit);
        }
        let settings = &self.config.settings;
        match self.parameters.fetch_parameter(
            &settings.displacement_parameter_scope,
            &settings.displacement_parameter_key,
            &[("metal", metal.code())],
        ) {
            Ok(value) => Ok(Some(value)),
            Err(AppraisalError::ParameterNotFound { .. }) => {
                log::debug!("engine: no displacement configured for metal {metal}");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    // ── Accessors ──────────────────────────────────────────────────

    pub fn policies(&self) -> &PunishmentPolicyRegistry {
        &self.policies
    }

    pub fn conditions(&self) -> &ConditionModifierRegistry {
        &self.conditions
    }

    pub fn parameters(&self) -> &StoreParameterService {
        &self.parameters
    }

    pub fn connector(&self) -> &dyn ReferencePriceConnector {
        self.connector.as_ref()
    }

    pub fn store(&self) -> &AppraisalStore {
        &self.store
    }

    pub fn config(&self) -> &AppraisalConfig {
        &self.config
    }

    /// The engine's source of "now"; callers stamping new records use it.
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn current_policy(&self) -> AppraisalResult<crate::punishment::PunishmentPolicy> {
        self.policies.current()
    }
}
