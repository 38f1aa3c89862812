use image::{GrayImage, Luma, Rgb, RgbImage};
use photo_recon::adapters::TokioProcessRunner;
use photo_recon::config::toml_config::SegmentationBackend;
use photo_recon::core::preprocess::{build_segmenter, preprocess, PreprocessOptions, Preprocessor};
use photo_recon::domain::ports::Segmenter;
use photo_recon::{ReconConfig, ReconError, Result};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// 左半邊為前景
struct LeftHalfSegmenter;

impl Segmenter for LeftHalfSegmenter {
    fn name(&self) -> &str {
        "left-half"
    }

    fn segment(&self, image: &RgbImage) -> Result<GrayImage> {
        let half = image.width() / 2;
        Ok(GrayImage::from_fn(image.width(), image.height(), |x, _| {
            if x < half {
                Luma([255])
            } else {
                Luma([0])
            }
        }))
    }
}

fn write_solid(path: &Path, color: [u8; 3]) {
    RgbImage::from_pixel(64, 48, Rgb(color)).save(path).unwrap();
}

fn quiet_options() -> PreprocessOptions {
    PreprocessOptions {
        show_progress: false,
        ..PreprocessOptions::default()
    }
}

#[test]
fn test_outputs_are_numbered_from_1000_with_black_background() {
    let temp_dir = TempDir::new().unwrap();
    let raw = temp_dir.path().join("raw");
    let out = temp_dir.path().join("sanitized");
    std::fs::create_dir_all(&raw).unwrap();
    write_solid(&raw.join("a.png"), [200, 40, 40]);
    write_solid(&raw.join("b.png"), [40, 40, 200]);

    let preprocessor = Preprocessor::new(Arc::new(LeftHalfSegmenter), quiet_options());
    let report = preprocessor.run(&raw, &out).unwrap();

    assert_eq!(report.images.len(), 2);
    assert!(report.skipped.is_empty());
    assert_eq!(report.images[0].output, out.join("1000.jpg"));
    assert_eq!(report.images[1].output, out.join("1001.jpg"));
    assert_eq!(report.images[1].source, raw.join("b.png"));

    let first = image::open(out.join("1000.jpg")).unwrap().into_rgb8();
    assert_eq!(first.dimensions(), (64, 48));

    let kept = first.get_pixel(8, 24);
    assert!(kept[0] > 150, "foreground should keep its colour: {:?}", kept);
    let removed = first.get_pixel(56, 24);
    assert!(removed.0.iter().all(|&c| c < 16), "background should be black: {:?}", removed);
}

#[test]
fn test_undecodable_file_is_skipped_and_index_gap_kept() {
    let temp_dir = TempDir::new().unwrap();
    let raw = temp_dir.path().join("raw");
    let out = temp_dir.path().join("sanitized");
    std::fs::create_dir_all(&raw).unwrap();
    write_solid(&raw.join("a.png"), [90, 90, 90]);
    std::fs::write(raw.join("b_broken.jpg"), b"not a jpeg").unwrap();
    write_solid(&raw.join("c.png"), [90, 90, 90]);

    let preprocessor = Preprocessor::new(Arc::new(LeftHalfSegmenter), quiet_options());
    let report = preprocessor.run(&raw, &out).unwrap();

    assert_eq!(report.skipped, vec![raw.join("b_broken.jpg")]);
    let indices: Vec<u32> = report.images.iter().map(|i| i.index).collect();
    assert_eq!(indices, vec![1000, 1002]);
    assert!(!out.join("1001.jpg").exists());
}

#[test]
fn test_output_dir_is_cleared_and_empty_input_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let raw = temp_dir.path().join("raw");
    let out = temp_dir.path().join("sanitized");
    std::fs::create_dir_all(&raw).unwrap();
    std::fs::create_dir_all(&out).unwrap();
    std::fs::write(out.join("stale.jpg"), b"old").unwrap();

    let preprocessor = Preprocessor::new(Arc::new(LeftHalfSegmenter), quiet_options());
    let err = preprocessor.run(&raw, &out).unwrap_err();
    assert!(matches!(err, ReconError::NoInputImages { .. }));
    // 沒有輸入時不動既有輸出
    assert!(out.join("stale.jpg").exists());

    write_solid(&raw.join("a.png"), [10, 10, 10]);
    preprocessor.run(&raw, &out).unwrap();
    assert!(!out.join("stale.jpg").exists());
    assert!(out.join("1000.jpg").exists());
}

#[test]
fn test_intermediate_cutouts_are_written() {
    let temp_dir = TempDir::new().unwrap();
    let raw = temp_dir.path().join("raw");
    let out = temp_dir.path().join("sanitized");
    let cutouts = temp_dir.path().join("cutouts");
    std::fs::create_dir_all(&raw).unwrap();
    write_solid(&raw.join("shot_01.png"), [120, 60, 30]);

    let options = PreprocessOptions {
        intermediate_dir: Some(cutouts.clone()),
        ..quiet_options()
    };
    Preprocessor::new(Arc::new(LeftHalfSegmenter), options)
        .run(&raw, &out)
        .unwrap();

    let cutout = image::open(cutouts.join("1000_shot_01.png")).unwrap().into_rgba8();
    assert_eq!(cutout.get_pixel(0, 0)[3], 255);
    assert_eq!(cutout.get_pixel(63, 0)[3], 0);
}

#[test]
fn test_cutouts_with_same_stem_do_not_collide() {
    let temp_dir = TempDir::new().unwrap();
    let raw = temp_dir.path().join("raw");
    let out = temp_dir.path().join("sanitized");
    let cutouts = temp_dir.path().join("cutouts");
    std::fs::create_dir_all(&raw).unwrap();
    write_solid(&raw.join("a.jpg"), [200, 40, 40]);
    write_solid(&raw.join("a.png"), [40, 40, 200]);

    let options = PreprocessOptions {
        intermediate_dir: Some(cutouts.clone()),
        ..quiet_options()
    };
    let report = Preprocessor::new(Arc::new(LeftHalfSegmenter), options)
        .run(&raw, &out)
        .unwrap();
    assert_eq!(report.images.len(), 2);

    let first = image::open(cutouts.join("1000_a.png")).unwrap().into_rgba8();
    let second = image::open(cutouts.join("1001_a.png")).unwrap().into_rgba8();
    assert!(first.get_pixel(0, 0)[0] > first.get_pixel(0, 0)[2]);
    assert!(second.get_pixel(0, 0)[2] > second.get_pixel(0, 0)[0]);
}

#[tokio::test]
async fn test_chroma_pipeline_without_exiftool() {
    let temp_dir = TempDir::new().unwrap();
    let raw = temp_dir.path().join("raw");
    std::fs::create_dir_all(&raw).unwrap();

    // 綠幕背景中央放一個紅色方塊
    let image = RgbImage::from_fn(80, 80, |x, y| {
        if (30..50).contains(&x) && (30..50).contains(&y) {
            Rgb([200, 30, 30])
        } else {
            Rgb([20, 200, 110])
        }
    });
    image.save(raw.join("green.png")).unwrap();

    let mut config = ReconConfig::default();
    config.project.raw_dir = raw.clone();
    config.project.sanitized_dir = temp_dir.path().join("sanitized");
    config.segmentation.backend = SegmentationBackend::Chroma;
    config.metadata.exiftool = temp_dir
        .path()
        .join("no-exiftool")
        .to_string_lossy()
        .into_owned();

    let segmenter = build_segmenter(&config).await.unwrap();
    assert_eq!(segmenter.name(), "chroma");

    let report = preprocess(&config, segmenter, Arc::new(TokioProcessRunner::new()))
        .await
        .unwrap();

    assert_eq!(report.images.len(), 1);
    assert!(report.metadata.as_ref().unwrap().skipped);

    let output = image::open(&report.images[0].output).unwrap().into_rgb8();
    let corner = output.get_pixel(2, 2);
    assert!(corner.0.iter().all(|&c| c < 16), "green screen should be removed: {:?}", corner);
    let centre = output.get_pixel(40, 40);
    assert!(centre[0] > 100, "subject should remain: {:?}", centre);
}
