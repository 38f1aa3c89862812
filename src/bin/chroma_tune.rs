use anyhow::{ensure, Context, Result};
use clap::Parser;
use image::imageops::{self, FilterType};
use image::RgbImage;
use photo_recon::config::toml_config::{ChromaConfig, ReconConfig};
use photo_recon::core::imaging;
use photo_recon::core::preprocess::discover_images;
use photo_recon::core::segmentation::ChromaKeySegmenter;
use photo_recon::domain::ports::Segmenter;
use photo_recon::utils::logger;
use std::path::PathBuf;

/// HSV 門檻調整工具：輸出原圖與去背結果並排的預覽
#[derive(Parser)]
#[command(name = "chroma-tune")]
#[command(about = "Preview chroma-key thresholds and print the matching recon.toml snippet")]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "recon.toml")]
    config: PathBuf,

    /// Image to preview; defaults to the middle image of the raw directory
    #[arg(short, long)]
    image: Option<PathBuf>,

    /// Lower HSV bound, e.g. 69,173,62 (OpenCV ranges: H 0..179)
    #[arg(long, value_delimiter = ',')]
    lower: Option<Vec<u8>>,

    /// Upper HSV bound, e.g. 92,255,255
    #[arg(long, value_delimiter = ',')]
    upper: Option<Vec<u8>>,

    /// Radius of the circular region of interest relative to the shorter side
    #[arg(long)]
    roi_ratio: Option<f32>,

    /// Height of each half of the preview
    #[arg(long, default_value_t = 600)]
    height: u32,

    /// Output preview file
    #[arg(short, long, default_value = "chroma_preview.png")]
    output: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn hsv_bound(values: Option<Vec<u8>>, fallback: [u8; 3]) -> Result<[u8; 3]> {
    let Some(values) = values else {
        return Ok(fallback);
    };
    ensure!(values.len() == 3, "expected three comma-separated values");
    ensure!(values[0] <= 179, "hue must be within 0..=179, got {}", values[0]);
    Ok([values[0], values[1], values[2]])
}

fn pick_image(args_image: Option<PathBuf>, config: &ReconConfig) -> Result<PathBuf> {
    if let Some(image) = args_image {
        return Ok(image);
    }

    let files = discover_images(&config.project.raw_dir, &config.preprocess.extensions)
        .with_context(|| format!("listing {}", config.project.raw_dir.display()))?;
    ensure!(
        !files.is_empty(),
        "no images found in {}",
        config.project.raw_dir.display()
    );
    Ok(files[files.len() / 2].clone())
}

fn side_by_side(left: &RgbImage, right: &RgbImage, height: u32) -> RgbImage {
    let scale = height as f32 / left.height().max(1) as f32;
    let width = ((left.width() as f32 * scale).round() as u32).max(1);

    let left = imageops::resize(left, width, height, FilterType::Triangle);
    let right = imageops::resize(right, width, height, FilterType::Triangle);

    let mut canvas = RgbImage::new(width * 2, height);
    imageops::replace(&mut canvas, &left, 0, 0);
    imageops::replace(&mut canvas, &right, width as i64, 0);
    canvas
}

fn main() -> Result<()> {
    let args = Args::parse();
    logger::init_cli_logger(args.verbose);

    ensure!(args.height > 0, "preview height must be positive");

    let config = ReconConfig::load_or_default(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let defaults = &config.segmentation.chroma;

    let chroma = ChromaConfig {
        lower: hsv_bound(args.lower, defaults.lower)?,
        upper: hsv_bound(args.upper, defaults.upper)?,
        roi_ratio: args.roi_ratio.unwrap_or(defaults.roi_ratio),
        open_kernel: defaults.open_kernel,
    };
    ensure!(
        (0.0..=1.0).contains(&chroma.roi_ratio),
        "roi ratio must be within 0..=1"
    );

    let path = pick_image(args.image, &config)?;
    tracing::info!("🖼️ Previewing {}", path.display());

    let original = image::open(&path)
        .with_context(|| format!("opening {}", path.display()))?
        .into_rgb8();

    let segmenter = ChromaKeySegmenter::new(chroma.clone());
    let alpha = segmenter.segment(&original)?;
    let cutout = imaging::composite_on_black(&original, &alpha);

    side_by_side(&original, &cutout, args.height)
        .save(&args.output)
        .with_context(|| format!("writing {}", args.output.display()))?;

    println!("✅ Preview written to {}", args.output.display());
    println!(
        "📊 Foreground coverage: {:.1}%",
        imaging::coverage(&alpha) * 100.0
    );
    println!();
    println!("[segmentation]");
    println!("backend = \"chroma\"");
    println!();
    println!("[segmentation.chroma]");
    println!(
        "lower = [{}, {}, {}]",
        chroma.lower[0], chroma.lower[1], chroma.lower[2]
    );
    println!(
        "upper = [{}, {}, {}]",
        chroma.upper[0], chroma.upper[1], chroma.upper[2]
    );
    println!("roi_ratio = {}", chroma.roi_ratio);

    Ok(())
}
