//! Punishment-factor store — append-only, time-versioned factors applied
//! to each piece-kind subtotal of a garment.
//!
//! "Current" is the record with the greatest `effective_at` not after now.
//! Updating inserts a new record; nothing is ever rewritten. The current
//! read path is cached and `update` invalidates it before returning. A
//! cached entry also lapses once the clock reaches the next pending
//! `effective_at`, or moves back before the cached one.

use crate::{
    cache::KeyedCache,
    clock::{day_window_millis, Clock},
    error::{AppraisalError, AppraisalResult},
    piece::require_positive,
    store::AppraisalStore,
    types::{Money, PieceKind, RecordId},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindFactors {
    pub jewelry:       Money,
    pub diamond:       Money,
    pub complementary: Money,
}

impl KindFactors {
    pub fn get(&self, kind: PieceKind) -> Money {
        match kind {
            PieceKind::Jewelry       => self.jewelry,
            PieceKind::Diamond       => self.diamond,
            PieceKind::Complementary => self.complementary,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PunishmentPolicy {
    pub id:           Option<RecordId>,
    factors:          KindFactors,
    pub effective_at: DateTime<Utc>,
}

impl PunishmentPolicy {
    /// Build an unsaved policy. Every factor must be positive.
    pub fn new(factors: KindFactors, effective_at: DateTime<Utc>) -> AppraisalResult<Self> {
        for kind in PieceKind::ALL {
            require_positive(&format!("{kind} punishment factor"), factors.get(kind))?;
        }
        Ok(Self { id: None, factors, effective_at })
    }

    /// Build from a kind → factor map; the map must cover all three kinds.
    pub fn from_factor_map(
        factors: &BTreeMap<PieceKind, Money>,
        effective_at: DateTime<Utc>,
    ) -> AppraisalResult<Self> {
        let factor = |kind: PieceKind| {
            factors.get(&kind).copied().ok_or_else(|| {
                AppraisalError::invalid(format!("punishment factor for {kind} is missing"))
            })
        };
        Self::new(
            KindFactors {
                jewelry:       factor(PieceKind::Jewelry)?,
                diamond:       factor(PieceKind::Diamond)?,
                complementary: factor(PieceKind::Complementary)?,
            },
            effective_at,
        )
    }

    pub(crate) fn stored(
        id: RecordId,
        factors: KindFactors,
        effective_at: DateTime<Utc>,
    ) -> AppraisalResult<Self> {
        let mut policy = Self::new(factors, effective_at)?;
        policy.id = Some(id);
        Ok(policy)
    }

    pub fn factor(&self, kind: PieceKind) -> Money {
        self.factors.get(kind)
    }

    pub fn factors(&self) -> &KindFactors {
        &self.factors
    }

    pub fn factor_map(&self) -> BTreeMap<PieceKind, Money> {
        PieceKind::ALL.iter().map(|k| (*k, self.factor(*k))).collect()
    }
}

/// Read access to the policy in force. Garment valuation depends on this
/// narrow capability rather than on the whole registry.
pub trait PolicySource {
    fn current(&self) -> AppraisalResult<PunishmentPolicy>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum PolicyCacheKey {
    Current,
}

/// The resolved current policy and the instant its successor takes over.
#[derive(Debug, Clone)]
struct CurrentPolicy {
    policy:     PunishmentPolicy,
    superseded: Option<DateTime<Utc>>,
}

impl CurrentPolicy {
    fn holds_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.policy.effective_at && self.superseded.map_or(true, |next| now < next)
    }
}

pub struct PunishmentPolicyRegistry {
    store: Arc<AppraisalStore>,
    clock: Arc<dyn Clock>,
    cache: KeyedCache<PolicyCacheKey, CurrentPolicy>,
}

impl PunishmentPolicyRegistry {
    pub fn new(store: Arc<AppraisalStore>, clock: Arc<dyn Clock>, cache_ttl: Option<Duration>) -> Self {
        Self {
            store,
            clock,
            cache: KeyedCache::new(cache_ttl),
        }
    }

    /// Every policy whose `effective_at` falls on `date` (UTC), newest first.
    pub fn as_of(&self, date: NaiveDate) -> AppraisalResult<Vec<PunishmentPolicy>> {
        let today = self.clock.today();
        if date > today {
            return Err(AppraisalError::FutureDate { requested: date, today });
        }
        let (start, end) = day_window_millis(date);
        let policies = self.store.punishment_policies_between(start, end)?;
        if policies.is_empty() {
            return Err(AppraisalError::NoPolicyForDate { date });
        }
        Ok(policies)
    }

    /// Append a new policy version. Returns it with its assigned id.
    pub fn update(&self, policy: &PunishmentPolicy) -> AppraisalResult<PunishmentPolicy> {
        let validated = PunishmentPolicy::new(*policy.factors(), policy.effective_at)?;
        let id = self.store.insert_punishment_policy(&validated, self.clock.now())?;
        self.cache.invalidate(&PolicyCacheKey::Current);

        let f = validated.factors();
        log::info!(
            "punishment policy {id} effective {}: jewelry={} diamond={} complementary={}",
            validated.effective_at, f.jewelry, f.diamond, f.complementary
        );
        PunishmentPolicy::stored(id, *f, validated.effective_at)
    }

    /// Every stored version, newest first.
    pub fn history(&self) -> AppraisalResult<Vec<PunishmentPolicy>> {
        self.store.all_punishment_policies()
    }

    pub fn is_empty(&self) -> AppraisalResult<bool> {
        Ok(self.store.punishment_policy_count()? == 0)
    }
}

impl PolicySource for PunishmentPolicyRegistry {
    fn current(&self) -> AppraisalResult<PunishmentPolicy> {
        let now = self.clock.now();
        if let Some(hit) = self.cache.get(&PolicyCacheKey::Current) {
            if hit.holds_at(now) {
                return Ok(hit.policy);
            }
            log::debug!("punishment policy cache: entry lapsed at {now}");
        }
        let millis = now.timestamp_millis();
        let policy = self
            .store
            .latest_punishment_policy(millis)?
            .ok_or(AppraisalError::NoCurrentPolicy)?;
        let superseded = self.store.next_punishment_policy_after(millis)?;
        self.cache.insert(
            PolicyCacheKey::Current,
            CurrentPolicy { policy: policy.clone(), superseded },
        );
        Ok(policy)
    }
}
