use crate::shared::error::AppError;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum CompressorError {
    #[error("image decode/encode failed: {0}")]
    Image(#[from] image::error::ImageError),
    #[error("compression task panicked: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<CompressorError> for AppError {
    fn from(err: CompressorError) -> Self {
        AppError::Media(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedImage {
    pub data: Vec<u8>,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
}

/// 現場写真をアップロード前に縮小・再圧縮する。長辺を `max_dimension`
/// 以下に収め、JPEG として再エンコードする。署名画像のような小さな
/// バイナリは呼び出し側の判断で素通しになる。
#[derive(Debug, Clone, Copy)]
pub struct ImageCompressor {
    max_dimension: u32,
    jpeg_quality: u8,
}

impl ImageCompressor {
    pub fn new(max_dimension: u32, jpeg_quality: u8) -> Self {
        Self {
            max_dimension,
            jpeg_quality,
        }
    }

    /// CPU バウンドなのでブロッキングプールへ逃がす。
    pub async fn compress(&self, data: Vec<u8>) -> Result<CompressedImage, AppError> {
        let compressor = *self;
        let compressed =
            tokio::task::spawn_blocking(move || compressor.compress_blocking(&data))
                .await
                .map_err(CompressorError::from)??;
        Ok(compressed)
    }

    fn compress_blocking(&self, data: &[u8]) -> Result<CompressedImage, CompressorError> {
        let img = image::load_from_memory(data)?;
        let (src_w, src_h) = (img.width(), img.height());

        let img = if src_w.max(src_h) > self.max_dimension {
            img.resize(self.max_dimension, self.max_dimension, FilterType::Triangle)
        } else {
            img
        };

        // JPEG はアルファを持てないので RGB へ落とす
        let rgb = img.to_rgb8();
        let (width, height) = (rgb.width(), rgb.height());

        let mut out = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut out, self.jpeg_quality);
        encoder.encode_image(&rgb)?;

        debug!(
            src_w,
            src_h,
            width,
            height,
            bytes = out.len(),
            "compressed image"
        );

        Ok(CompressedImage {
            data: out,
            mime_type: "image/jpeg".to_string(),
            width,
            height,
        })
    }
}
