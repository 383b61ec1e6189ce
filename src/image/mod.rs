pub mod loader;
pub mod preprocessing;
pub mod transforms;

pub use loader::ImageLoader;
pub use preprocessing::{ImagePreprocessor, InputTensor, INPUT_SHAPE, INPUT_SIZE};
pub use transforms::ImageTransforms;
