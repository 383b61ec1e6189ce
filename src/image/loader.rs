use crate::utils::error::InsectError;
use crate::Result;
use base64::Engine;
use image::{DynamicImage, ImageFormat};
use std::path::Path;

/// 单张图像的最大字节数（50MB）
pub const MAX_IMAGE_BYTES: usize = 50 * 1024 * 1024;

pub struct ImageLoader;

impl ImageLoader {
    /// 从base64字符串加载图像，兼容 data URL 前缀
    pub fn from_base64(base64_data: &str) -> Result<DynamicImage> {
        let bytes = Self::decode_base64(base64_data)?;
        Self::from_bytes(&bytes)
    }

    /// 仅做 base64 解码，不解析图像
    pub fn decode_base64(base64_data: &str) -> Result<Vec<u8>> {
        // data:image/xxx;base64,
        let base64_clean = match base64_data.strip_prefix("data:") {
            Some(rest) => rest.split_once(',').map(|(_, data)| data).unwrap_or(rest),
            None => base64_data,
        };

        let bytes = base64::engine::general_purpose::STANDARD.decode(base64_clean.trim())?;
        Self::check_size(bytes.len())?;
        Ok(bytes)
    }

    /// 从内存字节解码图像
    pub fn from_bytes(bytes: &[u8]) -> Result<DynamicImage> {
        Self::check_size(bytes.len())?;
        let image = image::load_from_memory(bytes)?;
        Ok(image)
    }

    /// 从文件路径加载图像
    pub fn from_path(path: impl AsRef<Path>) -> Result<DynamicImage> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::from_bytes(&bytes)
    }

    /// 检测图像格式
    pub fn detect_format(bytes: &[u8]) -> Option<ImageFormat> {
        image::guess_format(bytes).ok()
    }

    /// 验证图像格式是否支持
    pub fn is_supported_format(format: ImageFormat) -> bool {
        matches!(
            format,
            ImageFormat::Png
                | ImageFormat::Jpeg
                | ImageFormat::Bmp
                | ImageFormat::Tiff
                | ImageFormat::WebP
                | ImageFormat::Gif
        )
    }

    fn check_size(len: usize) -> Result<()> {
        if len > MAX_IMAGE_BYTES {
            return Err(InsectError::FileTooLarge(len, MAX_IMAGE_BYTES));
        }
        Ok(())
    }
}
