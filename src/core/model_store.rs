//! 分割模型的本地快取與下載

use crate::utils::error::{ReconError, Result};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

pub const MODEL_HOME_ENV: &str = "U2NET_HOME";

/// 模型目錄：配置 > $U2NET_HOME > ~/.u2net
pub fn model_dir(configured: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = configured {
        return Ok(dir.to_path_buf());
    }
    if let Ok(dir) = std::env::var(MODEL_HOME_ENV) {
        if !dir.trim().is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    dirs::home_dir()
        .map(|home| home.join(".u2net"))
        .ok_or_else(|| ReconError::MissingConfigError {
            field: "segmentation.model_dir".to_string(),
        })
}

pub fn model_path(dir: &Path, model_name: &str) -> PathBuf {
    dir.join(format!("{}.onnx", model_name))
}

/// 模型不存在時下載，回傳本地路徑
pub async fn ensure_model(model_name: &str, url: &str, dir: &Path) -> Result<PathBuf> {
    let path = model_path(dir, model_name);
    if path.is_file() {
        tracing::debug!("Model already cached at {}", path.display());
        return Ok(path);
    }

    tokio::fs::create_dir_all(dir).await?;
    tracing::info!("⬇️ Downloading segmentation model '{}' from {}", model_name, url);

    let response = reqwest::get(url).await?.error_for_status()?;

    // 先寫入暫存檔再改名，避免中斷時留下不完整的模型
    let partial = path.with_extension("onnx.part");
    let written = match stream_to_file(response, &partial).await {
        Ok(written) => written,
        Err(e) => {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e);
        }
    };
    if let Err(e) = tokio::fs::rename(&partial, &path).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(e.into());
    }

    tracing::info!(
        "✅ Model saved to {} ({:.1} MB)",
        path.display(),
        written as f64 / 1024.0 / 1024.0
    );
    Ok(path)
}

/// 逐塊寫入，不把整個模型留在記憶體
async fn stream_to_file(mut response: reqwest::Response, path: &Path) -> Result<u64> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut written = 0u64;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}
