//! AliceVision 節點圖：從 CameraInit 到 Texturing 的命令組裝

use crate::config::toml_config::ReconstructionConfig;
use crate::core::environment::FrameworkEnv;
use crate::domain::model::ProcessInvocation;
use std::path::{Path, PathBuf};

pub const VERBOSE_FLAG: &str = "--verboseLevel";
pub const TEXTURED_MESH: &str = "texturedMesh.obj";

fn bool_flag(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

/// 重建輸出目錄內的檔案配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconLayout {
    pub root: PathBuf,
}

impl ReconLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn camera_init(&self) -> PathBuf {
        self.root.join("cameraInit.sfm")
    }

    pub fn features_dir(&self) -> PathBuf {
        self.root.join("features")
    }

    pub fn image_matches(&self) -> PathBuf {
        self.root.join("imageMatches.txt")
    }

    pub fn matches_dir(&self) -> PathBuf {
        self.root.join("matches")
    }

    pub fn sfm(&self) -> PathBuf {
        self.root.join("sfm.abc")
    }

    pub fn cameras(&self) -> PathBuf {
        self.root.join("cameras.sfm")
    }

    pub fn dense_point_cloud(&self) -> PathBuf {
        self.root.join("densePointCloud.sfm")
    }

    pub fn mesh(&self) -> PathBuf {
        self.root.join("mesh.obj")
    }

    pub fn textured_mesh(&self) -> PathBuf {
        self.root.join(TEXTURED_MESH)
    }

    /// 節點執行前需要存在的目錄
    pub fn working_dirs(&self) -> Vec<PathBuf> {
        vec![self.features_dir(), self.matches_dir()]
    }
}

#[derive(Debug, Clone)]
pub struct ReconstructionPlan {
    pub layout: ReconLayout,
    pub nodes: Vec<ProcessInvocation>,
}

impl ReconstructionPlan {
    pub fn build(
        env: &FrameworkEnv,
        input_dir: &Path,
        output_root: &Path,
        params: &ReconstructionConfig,
    ) -> Self {
        let layout = ReconLayout::new(output_root);
        let node = |step: &str, binary: &str| {
            let invocation = ProcessInvocation::new(step, env.binary(binary));
            match env.library_path() {
                Some(path) => invocation.env("LD_LIBRARY_PATH", path),
                None => invocation,
            }
        };

        let nodes = vec![
            node("CameraInit", "cameraInit")
                .path_flag("--imageFolder", input_dir)
                .path_flag("--sensorDatabase", &env.sensor_db)
                .path_flag("--output", &layout.camera_init())
                .flag("--allowSingleView", bool_flag(params.allow_single_view))
                .flag("--viewIdMethod", params.view_id_method.clone()),
            node("FeatureExtraction", "featureExtraction")
                .path_flag("--input", &layout.camera_init())
                .path_flag("--output", &layout.features_dir())
                .flag("--describerTypes", params.describer_types.clone())
                .flag("--forceCpuExtraction", bool_flag(params.force_cpu_extraction)),
            node("ImageMatching", "imageMatching")
                .path_flag("--input", &layout.camera_init())
                .path_flag("--features", &layout.features_dir())
                .path_flag("--output", &layout.image_matches())
                .flag("--minNbImages", params.min_nb_images.to_string())
                .flag("--method", params.matching_method.clone())
                .flag("--nbNeighbors", params.nb_neighbors.to_string()),
            node("FeatureMatching", "featureMatching")
                .path_flag("--input", &layout.camera_init())
                .path_flag("--features", &layout.features_dir())
                .path_flag("--imagePairsList", &layout.image_matches())
                .path_flag("--output", &layout.matches_dir())
                .flag("--describerTypes", params.describer_types.clone())
                .flag("--distanceRatio", params.distance_ratio.to_string()),
            node("StructureFromMotion", "incrementalSfM")
                .path_flag("--input", &layout.camera_init())
                .path_flag("--features", &layout.features_dir())
                .path_flag("--matches", &layout.matches_dir())
                .path_flag("--output", &layout.sfm())
                .path_flag("--outputViewsAndPoses", &layout.cameras()),
            node("PrepareDenseScene", "prepareDenseScene")
                .path_flag("--input", &layout.sfm())
                .path_flag("--output", output_root)
                .path_flag("--imagesFolders", input_dir),
            node("DepthMapEstimation", "depthMapEstimation")
                .path_flag("--input", &layout.sfm())
                .path_flag("--output", output_root)
                .path_flag("--imagesFolder", input_dir)
                .flag("--downscale", params.downscale.to_string()),
            node("DepthMapFiltering", "depthMapFiltering")
                .path_flag("--input", &layout.sfm())
                .path_flag("--output", output_root)
                .path_flag("--depthMapsFolder", output_root),
            node("Meshing", "meshing")
                .path_flag("--input", &layout.sfm())
                .path_flag("--output", &layout.dense_point_cloud())
                .path_flag("--outputMesh", &layout.mesh())
                .path_flag("--depthMapsFolder", output_root)
                .flag("--minVis", params.min_vis.to_string()),
            node("Texturing", "texturing")
                .path_flag("--input", &layout.dense_point_cloud())
                .path_flag("--inputMesh", &layout.mesh())
                .path_flag("--output", output_root)
                .path_flag("--imagesFolder", input_dir)
                .flag("--textureSide", params.texture_side.to_string())
                .flag("--colorMappingFileType", params.color_mapping_file_type.clone()),
        ];

        let nodes = nodes
            .into_iter()
            .map(|invocation| with_verbose_level(invocation, &params.verbose_level))
            .collect();

        Self { layout, nodes }
    }

    pub fn steps(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.label.as_str()).collect()
    }
}

/// 未指定時補上 --verboseLevel
pub fn with_verbose_level(invocation: ProcessInvocation, level: &str) -> ProcessInvocation {
    if invocation.has_arg(VERBOSE_FLAG) {
        invocation
    } else {
        invocation.flag(VERBOSE_FLAG, level)
    }
}
