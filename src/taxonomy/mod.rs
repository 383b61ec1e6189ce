pub mod index;
pub mod rank;

pub use index::{TaxonomyIndex, SCHEMA_KEYS};
pub use rank::RankLevel;
