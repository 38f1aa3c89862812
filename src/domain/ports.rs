use crate::domain::model::{ProcessInvocation, ProcessOutcome};
use crate::utils::error::Result;
use async_trait::async_trait;
use image::{GrayImage, RgbImage};

/// 前景分割：回傳與輸入同尺寸的 alpha 遮罩（255 為前景）
pub trait Segmenter: Send + Sync {
    fn name(&self) -> &str;
    fn segment(&self, image: &RgbImage) -> Result<GrayImage>;
}

/// 外部程式執行器
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, invocation: &ProcessInvocation) -> Result<ProcessOutcome>;
}
