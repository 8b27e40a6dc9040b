pub mod ai;
pub mod banner;
pub mod cleaner;
pub mod config;
pub mod engine;
pub mod fixes;
pub mod normalizer;
pub mod repair;
pub mod sandbox;
pub mod store;
pub mod structure;
pub mod vocab;

pub use engine::{repair_raw, validate_static, RepairOutcome, StaticValidation};
