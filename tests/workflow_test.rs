use image::{GrayImage, Luma, Rgb, RgbImage};
use photo_recon::app::{build_workflow, PreprocessStage};
use photo_recon::config::toml_config::SegmentationBackend;
use photo_recon::core::workflow::{StageSequence, WorkflowContext};
use photo_recon::domain::ports::Segmenter;
use photo_recon::{ReconConfig, ReconError, Result, TokioProcessRunner};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const NODES: [&str; 10] = [
    "cameraInit",
    "featureExtraction",
    "imageMatching",
    "featureMatching",
    "incrementalSfM",
    "prepareDenseScene",
    "depthMapEstimation",
    "depthMapFiltering",
    "meshing",
    "texturing",
];

/// 上半部為前景
struct TopHalfSegmenter;

impl Segmenter for TopHalfSegmenter {
    fn name(&self) -> &str {
        "top-half"
    }

    fn segment(&self, image: &RgbImage) -> Result<GrayImage> {
        let half = image.height() / 2;
        Ok(GrayImage::from_fn(image.width(), image.height(), |_, y| {
            Luma([if y < half { 255 } else { 0 }])
        }))
    }
}

fn framework_install(root: &Path) {
    fs::create_dir_all(root.join("aliceVision/bin")).unwrap();
    fs::create_dir_all(root.join("aliceVision/share/aliceVision")).unwrap();
    fs::write(root.join("aliceVision/share/aliceVision/cameraSensors.db"), "").unwrap();
}

fn green_screen_shots(dir: &Path, count: usize) {
    fs::create_dir_all(dir).unwrap();
    for i in 0..count {
        let image = RgbImage::from_fn(64, 64, |x, y| {
            if (24..40).contains(&x) && (24..40).contains(&y) {
                Rgb([180, 40 + i as u8, 40])
            } else {
                Rgb([20, 200, 110])
            }
        });
        image.save(dir.join(format!("IMG_{:04}.png", i))).unwrap();
    }
}

fn config_in(temp: &Path) -> ReconConfig {
    let mut config = ReconConfig::default();
    config.project.raw_dir = temp.join("raw");
    config.project.sanitized_dir = temp.join("sanitized");
    config.project.recon_dir = temp.join("recon");
    config.framework.root = temp.join("av");
    config.framework.env_script = temp.join("vars.sh");
    config.segmentation.backend = SegmentationBackend::Chroma;
    config.metadata.exiftool = temp.join("no-exiftool").to_string_lossy().into_owned();
    config
}

#[tokio::test]
async fn test_dry_run_detects_install_and_lists_commands() {
    let temp_dir = TempDir::new().unwrap();
    framework_install(&temp_dir.path().join("av"));
    let config = config_in(temp_dir.path());

    let sequence = build_workflow(Arc::new(config), Arc::new(TokioProcessRunner::new()), true);
    let results = sequence.execute_all().await.unwrap();

    let names: Vec<&str> = results.iter().map(|r| r.stage_name.as_str()).collect();
    assert_eq!(names, vec!["setup", "reconstruct"]);

    let commands = results[1].metadata.get("commands").unwrap().as_array().unwrap();
    assert_eq!(commands.len(), 10);
    assert!(!temp_dir.path().join("vars.sh").exists());
    assert!(!temp_dir.path().join("recon").exists());
}

#[tokio::test]
async fn test_preprocess_stage_uses_injected_segmenter() {
    let temp_dir = TempDir::new().unwrap();
    green_screen_shots(&temp_dir.path().join("raw"), 2);
    let config = Arc::new(config_in(temp_dir.path()));

    let stage = PreprocessStage::new(config, Arc::new(TokioProcessRunner::new()))
        .with_segmenter(Arc::new(TopHalfSegmenter));
    let mut sequence = StageSequence::new("preprocess-only".to_string());
    sequence.add_stage(Box::new(stage));

    let mut context = WorkflowContext::new("preprocess-only".to_string());
    let results = sequence.execute_with_context(&mut context).await.unwrap();

    assert_eq!(results[0].metadata.get("images"), Some(&serde_json::json!(2)));
    let sanitized = temp_dir.path().join("sanitized");
    assert_eq!(
        context.get_shared_data("sanitized_dir"),
        Some(&serde_json::json!(sanitized.display().to_string()))
    );

    // 上半部保留、下半部變黑
    let first = image::open(sanitized.join("1000.jpg")).unwrap().into_rgb8();
    assert!(first.get_pixel(2, 2).0.iter().any(|&c| c > 40));
    assert!(first.get_pixel(2, 60).0.iter().all(|&c| c < 10));
}

#[tokio::test]
async fn test_missing_install_stops_before_preprocessing() {
    let temp_dir = TempDir::new().unwrap();
    green_screen_shots(&temp_dir.path().join("raw"), 3);
    let config = config_in(temp_dir.path());

    let sequence = build_workflow(Arc::new(config), Arc::new(TokioProcessRunner::new()), false);
    let err = sequence.execute_all().await.unwrap_err();

    assert!(matches!(err, ReconError::StageError { ref stage, .. } if stage == "setup"));
    assert_eq!(err.exit_code(), 3);
    assert!(!temp_dir.path().join("sanitized").exists());
}

#[cfg(unix)]
#[tokio::test]
async fn test_full_run_with_stub_framework() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("av");
    framework_install(&root);
    green_screen_shots(&temp_dir.path().join("raw"), 3);

    let log = temp_dir.path().join("nodes.log");
    let mesh = temp_dir.path().join("recon").join("texturedMesh.obj");
    for node in NODES {
        let mut script = format!("#!/bin/sh\necho {} >> '{}'\n", node, log.display());
        if node == "texturing" {
            script.push_str(&format!("touch '{}'\n", mesh.display()));
        }
        let path = root.join("aliceVision/bin").join(format!("aliceVision_{}", node));
        fs::write(&path, script).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    let config = config_in(temp_dir.path());
    let sequence = build_workflow(Arc::new(config), Arc::new(TokioProcessRunner::new()), false);
    let results = sequence.execute_all().await.unwrap();

    let summary = StageSequence::get_execution_summary(&results);
    assert_eq!(summary.get("total_stages").unwrap(), &serde_json::json!(3));

    for name in ["1000.jpg", "1001.jpg", "1002.jpg"] {
        assert!(temp_dir.path().join("sanitized").join(name).is_file(), "{}", name);
    }
    assert!(mesh.is_file());
    assert_eq!(fs::read_to_string(&log).unwrap().lines().count(), 10);

    let db = fs::read_to_string(root.join("aliceVision/share/aliceVision/cameraSensors.db")).unwrap();
    assert!(db.contains("Samsung S22 Ultra;9.6"));
    assert!(fs::read_to_string(temp_dir.path().join("vars.sh"))
        .unwrap()
        .contains("ALICEVISION_SENSOR_DB"));
}
