pub mod error;

pub use error::InsectError;
