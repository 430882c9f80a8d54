pub mod conditions;
pub mod db;
pub mod eligibility;
pub mod error;
pub mod features;
pub mod models;
pub mod prediction;
pub mod report;
pub mod store;
pub mod training;

#[cfg(test)]
pub mod testutil;

pub use eligibility::check_eligibility;
pub use error::EngineError;
pub use features::extract_features;
pub use prediction::PredictionService;
pub use store::{ActiveModelCache, InMemoryModelStore, ModelStore};
pub use training::{TrainingConfig, TrainingEngine};
