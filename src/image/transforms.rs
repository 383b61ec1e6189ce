use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};

/// 缩放所用的插值方式（双线性），保证结果可复现
pub const RESIZE_FILTER: FilterType = FilterType::Triangle;

/// 图像变换工具集
pub struct ImageTransforms;

impl ImageTransforms {
    /// 直接拉伸到目标尺寸：不保持宽高比，不裁剪，不填充
    pub fn resize_exact(image: &DynamicImage, target_width: u32, target_height: u32) -> RgbImage {
        let rgb = image.to_rgb8();

        if rgb.dimensions() == (target_width, target_height) {
            return rgb;
        }

        imageops::resize(&rgb, target_width, target_height, RESIZE_FILTER)
    }
}
