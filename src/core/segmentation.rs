use crate::config::toml_config::ChromaConfig;
use crate::core::imaging;
use crate::domain::ports::Segmenter;
use crate::utils::error::{ReconError, Result};
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, RgbImage};
use std::path::Path;
use tract_onnx::prelude::*;

const U2NET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const U2NET_STD: [f32; 3] = [0.229, 0.224, 0.225];

type U2NetPlan = TypedRunnableModel<TypedModel>;

fn segmentation_error(context: &str, e: impl std::fmt::Display) -> ReconError {
    ReconError::SegmentationError {
        message: format!("{}: {}", context, e),
    }
}

/// U-2-Net 顯著物體分割（ONNX）
pub struct U2NetSegmenter {
    plan: U2NetPlan,
    input_size: u32,
}

impl U2NetSegmenter {
    pub fn load(model_path: &Path, input_size: u32) -> Result<Self> {
        tracing::info!("🧠 Loading segmentation model: {}", model_path.display());
        let size = input_size as usize;

        let plan = tract_onnx::onnx()
            .model_for_path(model_path)
            .map_err(|e| segmentation_error("failed to read model", e))?
            .with_input_fact(0, f32::fact([1, 3, size, size]).into())
            .map_err(|e| segmentation_error("invalid model input", e))?
            .into_optimized()
            .map_err(|e| segmentation_error("failed to optimize model", e))?
            .into_runnable()
            .map_err(|e| segmentation_error("failed to prepare model", e))?;

        Ok(Self { plan, input_size })
    }
}

/// 縮放到模型尺寸、除以最大值後以 ImageNet 平均/標準差正規化，NCHW 排列
pub fn u2net_input(image: &RgbImage, size: u32) -> tract_ndarray::Array4<f32> {
    let resized = imageops::resize(image, size, size, FilterType::Lanczos3);
    let max = resized
        .as_raw()
        .iter()
        .copied()
        .max()
        .filter(|&m| m > 0)
        .unwrap_or(1) as f32;

    tract_ndarray::Array4::from_shape_fn((1, 3, size as usize, size as usize), |(_, c, y, x)| {
        let v = resized.get_pixel(x as u32, y as u32)[c] as f32 / max;
        (v - U2NET_MEAN[c]) / U2NET_STD[c]
    })
}

/// 取第一個輸出的 batch 0、channel 0，min-max 正規化後縮放回原圖尺寸
pub fn prediction_to_mask(
    prediction: tract_ndarray::ArrayViewD<f32>,
    width: u32,
    height: u32,
) -> Result<GrayImage> {
    let shape = prediction.shape();
    if shape.len() != 4 || shape[0] == 0 || shape[1] == 0 {
        return Err(segmentation_error(
            "unexpected output shape",
            format!("{:?}", shape),
        ));
    }
    let channel = prediction
        .index_axis(tract_ndarray::Axis(0), 0)
        .index_axis_move(tract_ndarray::Axis(0), 0)
        .into_dimensionality::<tract_ndarray::Ix2>()
        .map_err(|e| segmentation_error("unexpected output shape", e))?;
    let (h, w) = channel.dim();

    let (min, max) = channel
        .iter()
        .fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let range = if max > min { max - min } else { 1.0 };

    let mask = GrayImage::from_fn(w as u32, h as u32, |x, y| {
        let v = (channel[[y as usize, x as usize]] - min) / range;
        Luma([(v * 255.0).clamp(0.0, 255.0) as u8])
    });

    Ok(imageops::resize(&mask, width, height, FilterType::Lanczos3))
}

impl Segmenter for U2NetSegmenter {
    fn name(&self) -> &str {
        "u2net"
    }

    fn segment(&self, image: &RgbImage) -> Result<GrayImage> {
        let input: Tensor = u2net_input(image, self.input_size).into();
        let outputs = self
            .plan
            .run(tvec!(input.into()))
            .map_err(|e| segmentation_error("inference failed", e))?;
        let output = outputs
            .first()
            .ok_or_else(|| segmentation_error("inference failed", "model produced no output"))?;
        let prediction = output
            .to_array_view::<f32>()
            .map_err(|e| segmentation_error("unexpected output type", e))?;

        prediction_to_mask(prediction, image.width(), image.height())
    }
}

/// 綠幕色鍵分割：HSV 範圍、圓形 ROI、最大連通區塊與開運算
#[derive(Debug, Clone)]
pub struct ChromaKeySegmenter {
    config: ChromaConfig,
}

impl ChromaKeySegmenter {
    pub fn new(config: ChromaConfig) -> Self {
        Self { config }
    }

    /// 背景遮罩（落在色鍵範圍內的像素）
    pub fn background_mask(&self, image: &RgbImage) -> GrayImage {
        imaging::hsv_in_range(image, self.config.lower, self.config.upper)
    }
}

impl Segmenter for ChromaKeySegmenter {
    fn name(&self) -> &str {
        "chroma"
    }

    fn segment(&self, image: &RgbImage) -> Result<GrayImage> {
        let (w, h) = image.dimensions();
        let foreground = imaging::invert(&self.background_mask(image));
        let roi = imaging::circular_mask(w, h, self.config.roi_ratio);
        let mask = imaging::intersect(&foreground, &roi);
        let mask = imaging::keep_largest_component(&mask);
        Ok(imaging::morphological_open(&mask, self.config.open_kernel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn green_screen_with_subject(w: u32, h: u32) -> RgbImage {
        let mut image = RgbImage::from_pixel(w, h, Rgb([20, 200, 90]));
        for y in h / 2 - 8..h / 2 + 8 {
            for x in w / 2 - 8..w / 2 + 8 {
                image.put_pixel(x, y, Rgb([120, 110, 100]));
            }
        }
        // ROI 外的雜訊
        image.put_pixel(0, 0, Rgb([255, 255, 255]));
        image
    }

    #[test]
    fn test_chroma_segmenter_isolates_subject() {
        let segmenter = ChromaKeySegmenter::new(ChromaConfig {
            lower: [35, 50, 50],
            upper: [85, 255, 255],
            ..ChromaConfig::default()
        });
        let image = green_screen_with_subject(64, 64);

        let mask = segmenter.segment(&image).unwrap();

        assert_eq!(mask.dimensions(), (64, 64));
        assert_eq!(mask.get_pixel(32, 32)[0], 255);
        assert_eq!(mask.get_pixel(0, 0)[0], 0);
        assert_eq!(mask.get_pixel(5, 32)[0], 0);
        assert!((imaging::coverage(&mask) - 256.0 / 4096.0).abs() < 1e-6);
    }

    #[test]
    fn test_chroma_segmenter_on_empty_foreground() {
        let segmenter = ChromaKeySegmenter::new(ChromaConfig {
            lower: [35, 50, 50],
            upper: [85, 255, 255],
            ..ChromaConfig::default()
        });
        let image = RgbImage::from_pixel(16, 16, Rgb([20, 200, 90]));

        let mask = segmenter.segment(&image).unwrap();
        assert_eq!(imaging::coverage(&mask), 0.0);
    }

    #[test]
    fn test_u2net_input_divides_by_max_then_standardizes() {
        let image = RgbImage::from_pixel(8, 8, Rgb([100, 50, 0]));

        let input = u2net_input(&image, 8);

        assert_eq!(input.shape(), &[1, 3, 8, 8]);
        let expected = [
            (1.0 - 0.485) / 0.229,
            (0.5 - 0.456) / 0.224,
            (0.0 - 0.406) / 0.225,
        ];
        for (c, want) in expected.iter().enumerate() {
            let got = input[[0, c, 3, 5]];
            assert!((got - want).abs() < 1e-3, "channel {}: {} vs {}", c, got, want);
        }
    }

    #[test]
    fn test_u2net_input_on_black_image() {
        let image = RgbImage::new(4, 4);
        let input = u2net_input(&image, 4);
        assert!(input.iter().all(|v| v.is_finite()));
        assert!((input[[0, 0, 0, 0]] + 0.485 / 0.229).abs() < 1e-4);
    }

    #[test]
    fn test_prediction_uses_first_channel_only() {
        let mut values: Vec<f32> = vec![0.0, 1.0, 2.0, 3.0];
        values.extend([100.0, 200.0, 300.0, 400.0]);
        let prediction = tract_ndarray::ArrayD::from_shape_vec(vec![1, 2, 2, 2], values).unwrap();

        let mask = prediction_to_mask(prediction.view(), 2, 2).unwrap();

        assert_eq!(mask.get_pixel(0, 0)[0], 0);
        assert_eq!(mask.get_pixel(1, 1)[0], 255);
    }

    #[test]
    fn test_constant_prediction_is_empty_mask() {
        let prediction = tract_ndarray::ArrayD::from_elem(vec![1, 1, 4, 4], 0.7f32);

        let mask = prediction_to_mask(prediction.view(), 4, 4).unwrap();

        assert!(mask.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn test_prediction_is_resized_to_source() {
        let prediction =
            tract_ndarray::ArrayD::from_shape_fn(vec![1, 1, 4, 4], |idx| (idx[2] * 4 + idx[3]) as f32);

        let mask = prediction_to_mask(prediction.view(), 12, 9).unwrap();

        assert_eq!(mask.dimensions(), (12, 9));
    }

    #[test]
    fn test_prediction_with_wrong_rank_is_rejected() {
        let prediction = tract_ndarray::ArrayD::from_elem(vec![4, 4], 0.5f32);
        let result = prediction_to_mask(prediction.view(), 4, 4);
        assert!(matches!(result, Err(ReconError::SegmentationError { .. })));
    }

    #[test]
    fn test_missing_model_is_segmentation_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = U2NetSegmenter::load(&dir.path().join("missing.onnx"), 320);
        assert!(matches!(result, Err(ReconError::SegmentationError { .. })));
    }
}
