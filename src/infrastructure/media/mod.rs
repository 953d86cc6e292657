pub mod compressor;

pub use compressor::{CompressedImage, ImageCompressor};
