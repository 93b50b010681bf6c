use crate::{
    condition::{ConditionModifier, ConditionModifierList},
    error::AppraisalResult,
    parameter::ParameterEntry,
    punishment::{KindFactors, PunishmentPolicy},
    reference::{
        CertificateModifierRow, CommercialValueRow, GoldPriceRow, MetalPriceRow,
        QualityRangeFactorRow, ReferencePriceTable,
    },
    types::Money,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

// ── Engine settings ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// TTL of the cached current punishment policy. `None` = until update.
    #[serde(default)]
    pub policy_cache_ttl_secs: Option<u64>,
    #[serde(default)]
    pub condition_cache_ttl_secs: Option<u64>,
    /// TTL of cached reference-price answers. `0` disables the cache.
    #[serde(default = "default_reference_ttl")]
    pub reference_cache_ttl_secs: u64,
    #[serde(default = "default_displacement_scope")]
    pub displacement_parameter_scope: String,
    #[serde(default = "default_displacement_key")]
    pub displacement_parameter_key: String,
}

fn default_reference_ttl() -> u64 {
    300
}

fn default_displacement_scope() -> String {
    "jewelry".into()
}

fn default_displacement_key() -> String {
    "commercial_displacement".into()
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            policy_cache_ttl_secs:        None,
            condition_cache_ttl_secs:     None,
            reference_cache_ttl_secs:     default_reference_ttl(),
            displacement_parameter_scope: default_displacement_scope(),
            displacement_parameter_key:   default_displacement_key(),
        }
    }
}

impl EngineSettings {
    pub fn policy_cache_ttl(&self) -> Option<Duration> {
        self.policy_cache_ttl_secs.map(Duration::from_secs)
    }

    pub fn condition_cache_ttl(&self) -> Option<Duration> {
        self.condition_cache_ttl_secs.map(Duration::from_secs)
    }

    pub fn reference_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.reference_cache_ttl_secs)
    }
}

// ── Seed data ──────────────────────────────────────────────────────

/// Initial punishment policy, installed when the store has none.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PunishmentPolicySeed {
    pub jewelry_factor:       Money,
    pub diamond_factor:       Money,
    pub complementary_factor: Money,
    /// Defaults to the moment of seeding.
    #[serde(default)]
    pub effective_at: Option<DateTime<Utc>>,
}

impl PunishmentPolicySeed {
    pub fn to_policy(&self, now: DateTime<Utc>) -> AppraisalResult<PunishmentPolicy> {
        PunishmentPolicy::new(
            KindFactors {
                jewelry:       self.jewelry_factor,
                diamond:       self.diamond_factor,
                complementary: self.complementary_factor,
            },
            self.effective_at.unwrap_or(now),
        )
    }
}

/// Initial condition modifier list, installed when no list is current.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionModifierSeed {
    pub source_date: NaiveDate,
    pub modifiers:   Vec<ConditionModifier>,
}

impl ConditionModifierSeed {
    pub fn to_list(&self) -> AppraisalResult<ConditionModifierList> {
        ConditionModifierList::new(self.source_date, self.modifiers.iter().cloned())
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ParametersFile {
    parameters: Vec<ParameterEntry>,
}

#[derive(Debug, Clone)]
pub struct AppraisalConfig {
    pub settings:            EngineSettings,
    pub reference_prices:    ReferencePriceTable,
    pub punishment_policy:   PunishmentPolicySeed,
    pub condition_modifiers: ConditionModifierSeed,
    pub parameters:          Vec<ParameterEntry>,
}

fn read_json<T: DeserializeOwned>(path: &str) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
    serde_json::from_str(&content).map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))
}

impl AppraisalConfig {
    /// Load from the data/ directory.
    /// In tests, use AppraisalConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let settings_path = format!("{data_dir}/engine.json");
        let settings = if std::path::Path::new(&settings_path).exists() {
            read_json(&settings_path)?
        } else {
            log::info!("config: {settings_path} not found, using default engine settings");
            EngineSettings::default()
        };

        let reference_prices: ReferencePriceTable =
            read_json(&format!("{data_dir}/reference/reference_prices.json"))?;
        let punishment_policy: PunishmentPolicySeed =
            read_json(&format!("{data_dir}/policy/punishment_policy.json"))?;
        let condition_modifiers: ConditionModifierSeed =
            read_json(&format!("{data_dir}/condition/condition_modifiers.json"))?;
        let parameters_file: ParametersFile =
            read_json(&format!("{data_dir}/parameters/parameters.json"))?;

        let config = Self {
            settings,
            reference_prices,
            punishment_policy,
            condition_modifiers,
            parameters: parameters_file.parameters,
        };
        config.validate()?;

        log::info!(
            "config: loaded {} gold, {} metal, {} commercial reference rows; {} parameters",
            config.reference_prices.gold_prices.len(),
            config.reference_prices.metal_prices.len(),
            config.reference_prices.commercial_values.len(),
            config.parameters.len()
        );
        Ok(config)
    }

    /// Reject seed data that could never be installed.
    pub fn validate(&self) -> anyhow::Result<()> {
        // Only the factors are checked; the instant is a placeholder.
        self.punishment_policy
            .to_policy(DateTime::<Utc>::default())
            .map_err(|e| anyhow::anyhow!("policy seed: {e}"))?;
        self.condition_modifiers
            .to_list()
            .map_err(|e| anyhow::anyhow!("condition modifier seed: {e}"))?;
        Ok(())
    }

    /// Small, self-contained configuration used by tests.
    pub fn default_test() -> Self {
        let d = |s: &str| s.parse::<Money>().unwrap_or_default();

        let reference_prices = ReferencePriceTable {
            gold_prices: vec![
                GoldPriceRow { color: "YELLOW".into(), quality: "14K".into(), price_per_gram: d("50") },
                GoldPriceRow { color: "WHITE".into(),  quality: "18K".into(), price_per_gram: d("62.5") },
            ],
            metal_prices: vec![
                MetalPriceRow { metal: "AG".into(), quality: "925".into(), range: "R1".into(), price_per_gram: d("1.5") },
                MetalPriceRow { metal: "PT".into(), quality: "950".into(), range: "R1".into(), price_per_gram: d("30") },
            ],
            quality_range_factors: vec![
                QualityRangeFactorRow { metal: "AU".into(), quality: "14K".into(), range: "R1".into(), factor: d("0.8") },
                QualityRangeFactorRow { metal: "AU".into(), quality: "18K".into(), range: "R1".into(), factor: d("0.9") },
                QualityRangeFactorRow { metal: "AG".into(), quality: "925".into(), range: "R1".into(), factor: d("0.9") },
                QualityRangeFactorRow { metal: "PT".into(), quality: "950".into(), range: "R1".into(), factor: d("1") },
            ],
            commercial_values: vec![
                CommercialValueRow {
                    cut: "ROUND".into(), color: "G".into(), clarity: "VS1".into(),
                    carat_low: d("0.50"), carat_high: d("0.99"),
                    minimum: d("400"), average: d("500"), maximum: d("600"),
                },
                CommercialValueRow {
                    cut: "ROUND".into(), color: "G".into(), clarity: "VS1".into(),
                    carat_low: d("1.00"), carat_high: d("1.49"),
                    minimum: d("900"), average: d("1000"), maximum: d("1100"),
                },
            ],
            certificate_modifiers: vec![
                CertificateModifierRow { code: "GIA".into(),  percentage: d("0.10") },
                CertificateModifierRow { code: "IGI".into(),  percentage: d("0.05") },
                CertificateModifierRow { code: "NONE".into(), percentage: d("0") },
            ],
        };

        let punishment_policy = PunishmentPolicySeed {
            jewelry_factor:       d("1.2"),
            diamond_factor:       d("0.9"),
            complementary_factor: d("0.5"),
            effective_at:         DateTime::from_timestamp(0, 0),
        };

        let condition_modifiers = ConditionModifierSeed {
            source_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default(),
            modifiers: vec![
                ConditionModifier::new("EXCELLENT", d("1.10")),
                ConditionModifier::new("GOOD",      d("1.00")),
                ConditionModifier::new("FAIR",      d("0.85")),
                ConditionModifier::new("POOR",      d("0.70")),
            ],
        };

        let parameters = vec![ParameterEntry {
            scope:   "jewelry".into(),
            key:     "commercial_displacement".into(),
            filters: BTreeMap::from([("metal".to_string(), "AG".to_string())]),
            value:   d("0.95"),
        }];

        Self {
            settings: EngineSettings::default(),
            reference_prices,
            punishment_policy,
            condition_modifiers,
            parameters,
        }
    }
}
