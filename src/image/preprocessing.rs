use crate::image::{ImageLoader, ImageTransforms};
use crate::utils::error::InsectError;
use crate::Result;
use image::DynamicImage;
use ndarray::Array4;

/// 模型输入边长
pub const INPUT_SIZE: u32 = 224;

/// 输入张量形状 (N, C, H, W)
pub const INPUT_SHAPE: [usize; 4] = [1, 3, INPUT_SIZE as usize, INPUT_SIZE as usize];

/// ImageNet 均值 (R, G, B)，必须与训练时一致
pub const MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// ImageNet 标准差 (R, G, B)
pub const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// 一次推理所用的输入张量，形状恒为 `1×3×224×224`，CHW 排布
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor {
    data: Array4<f32>,
}

impl InputTensor {
    /// 包装已有数组，形状不符时返回 `ShapeMismatch`
    pub fn from_array(data: Array4<f32>) -> Result<Self> {
        if data.shape() != INPUT_SHAPE {
            return Err(InsectError::ShapeMismatch(format!(
                "Input tensor must be {:?}, got {:?}",
                INPUT_SHAPE,
                data.shape()
            )));
        }
        Ok(Self { data })
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn as_array(&self) -> &Array4<f32> {
        &self.data
    }

    pub fn into_array(self) -> Array4<f32> {
        self.data
    }

    /// 按 R 全部、G 全部、B 全部的顺序展开的连续缓冲区
    pub fn as_slice(&self) -> Option<&[f32]> {
        self.data.as_slice()
    }
}

pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// 解码任意编码的图像字节并生成输入张量
    pub fn prepare(image_bytes: &[u8]) -> Result<InputTensor> {
        let image = ImageLoader::from_bytes(image_bytes)?;
        Self::prepare_image(&image)
    }

    /// 拉伸到 224×224，逐通道 `(v / 255 - mean) / std`，写成 CHW
    pub fn prepare_image(image: &DynamicImage) -> Result<InputTensor> {
        let resized = ImageTransforms::resize_exact(image, INPUT_SIZE, INPUT_SIZE);

        let mut data = Array4::<f32>::zeros(INPUT_SHAPE);
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                let scaled = pixel[c] as f32 / 255.0;
                data[[0, c, y as usize, x as usize]] = (scaled - MEAN[c]) / STD[c];
            }
        }

        InputTensor::from_array(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn encode(img: RgbImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_single_black_pixel() {
        let tensor = ImagePreprocessor::prepare(&encode(RgbImage::new(1, 1))).unwrap();
        assert_eq!(tensor.shape(), INPUT_SHAPE);

        let data = tensor.as_array();
        for c in 0..3 {
            let expected = (0.0 - MEAN[c]) / STD[c];
            assert!((data[[0, c, 0, 0]] - expected).abs() < 1e-6);
            assert!((data[[0, c, 223, 223]] - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn test_channel_first_layout() {
        let img = RgbImage::from_pixel(224, 224, Rgb([255, 0, 128]));
        let tensor = ImagePreprocessor::prepare_image(&DynamicImage::ImageRgb8(img)).unwrap();
        let flat = tensor.as_slice().unwrap();
        let plane = 224 * 224;
        assert_eq!(flat.len(), 3 * plane);

        let red = (1.0 - MEAN[0]) / STD[0];
        let green = (0.0 - MEAN[1]) / STD[1];
        let blue = (128.0 / 255.0 - MEAN[2]) / STD[2];
        assert!((flat[0] - red).abs() < 1e-6);
        assert!((flat[plane - 1] - red).abs() < 1e-6);
        assert!((flat[plane] - green).abs() < 1e-6);
        assert!((flat[2 * plane] - blue).abs() < 1e-6);
        assert!((flat[3 * plane - 1] - blue).abs() < 1e-6);
    }

    #[test]
    fn test_row_major_within_channel() {
        // 第一行第二个像素为白，其余为黑；224×224 输入不经缩放
        let mut img = RgbImage::new(224, 224);
        img.put_pixel(1, 0, Rgb([255, 255, 255]));
        let tensor = ImagePreprocessor::prepare_image(&DynamicImage::ImageRgb8(img)).unwrap();
        let flat = tensor.as_slice().unwrap();

        let white = (1.0 - MEAN[0]) / STD[0];
        let black = (0.0 - MEAN[0]) / STD[0];
        assert!((flat[1] - white).abs() < 1e-6);
        assert!((flat[224] - black).abs() < 1e-6);
    }

    #[test]
    fn test_wrong_shape_rejected() {
        let err = InputTensor::from_array(Array4::zeros((1, 3, 32, 32))).unwrap_err();
        assert!(matches!(err, InsectError::ShapeMismatch(_)));
    }

    #[test]
    fn test_undecodable_bytes() {
        let err = ImagePreprocessor::prepare(b"GIF89a but truncated").unwrap_err();
        assert!(matches!(err, InsectError::Decode(_)));
    }
}
