pub mod config;
pub mod image;
pub mod inference;
pub mod models;
pub mod taxonomy;
pub mod utils;
pub mod web;

// 重新导出主要类型
pub use config::Config;
pub use inference::{InferenceEngine, LevelPrediction, PredictionResult};
pub use taxonomy::{RankLevel, TaxonomyIndex};
pub use utils::error::InsectError;

pub type Result<T> = std::result::Result<T, InsectError>;
