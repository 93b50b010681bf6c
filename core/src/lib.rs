//! Pawn garment appraisal engine.
//!
//! Pieces (jewelry, diamonds, complementary items) are valued against an
//! external reference price connector, bucketed per kind, and adjusted by
//! time-versioned punishment factors. Condition modifiers live in a sibling
//! versioned store.

pub mod appraisal;
pub mod cache;
pub mod clock;
pub mod condition;
pub mod config;
pub mod engine;
pub mod error;
pub mod garment;
pub mod parameter;
pub mod piece;
pub mod punishment;
pub mod reference;
pub mod request;
pub mod store;
pub mod types;

pub use appraisal::AppraisalTriple;
pub use error::{AppraisalError, AppraisalResult};
pub use types::{Money, PieceKind};
