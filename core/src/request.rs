use serde::{Deserialize, Serialize};

use crate::types::{CaratRange, Metal, Money};

/// A garment as submitted for appraisal (runner input, IPC payload).
/// Validation happens when the engine turns it into a `Garment`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GarmentRequest {
    /// Generated when absent.
    #[serde(default)]
    pub garment_id: Option<String>,
    pub condition_code: String,
    /// Jewelry pieces without an explicit increment take the factor of
    /// `condition_code` from the current condition modifier list.
    #[serde(default)]
    pub apply_condition_increment: bool,
    pub pieces: Vec<PieceDescriptor>,
}

fn one() -> u32 {
    1
}

/// Variants added per piece kind — never removed or reordered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PieceDescriptor {
    Jewelry {
        metal:   Metal,
        color:   String,
        quality: String,
        range:   String,
        weight:  Money,
        #[serde(default = "one")]
        piece_count: u32,
        #[serde(default)]
        increment_factor: Option<Money>,
        #[serde(default)]
        displacement_factor: Option<Money>,
        #[serde(default)]
        expert_value: Option<Money>,
    },
    Diamond {
        cut:     String,
        color:   String,
        clarity: String,
        carats:  Money,
        #[serde(default = "one")]
        piece_count: u32,
        #[serde(default)]
        carat_range: Option<CaratRange>,
        #[serde(default)]
        certificate_code: Option<String>,
        #[serde(default)]
        expert_value: Option<Money>,
    },
    Complementary {
        expert_value: Money,
        #[serde(default = "one")]
        piece_count: u32,
    },
}
