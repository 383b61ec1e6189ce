pub mod engine;
pub mod executor;
pub mod postprocess;
pub mod types;

pub use engine::{EngineState, EngineStats, InferenceEngine};
pub use executor::InferenceExecutor;
pub use postprocess::PostProcessor;
pub use types::{LevelPrediction, PredictionResult, RawScores};
