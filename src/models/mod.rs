pub mod session;

pub use session::{ModelBackend, ModelOutputs, ModelSession, OutputLayout};
