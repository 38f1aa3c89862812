//! 遮罩後處理與色彩工具。HSV 與 Lab 依 OpenCV 8 位元慣例（H: 0..179，L: 0..255）。

use image::{GrayImage, Luma, Rgb, RgbImage, RgbaImage};
use imageproc::distance_transform::Norm;
use imageproc::drawing::draw_filled_circle_mut;
use imageproc::morphology;
use imageproc::region_labelling::{connected_components, Connectivity};

/// 綠幕溢色抑制：遮罩內綠色高於紅藍平均的像素往平均值拉回
pub fn reduce_green_spill(image: &mut RgbImage, mask: &GrayImage, factor: f32) {
    for (pixel, alpha) in image.pixels_mut().zip(mask.pixels()) {
        if alpha[0] == 0 {
            continue;
        }
        let [r, g, b] = pixel.0;
        let rb_avg = (r as f32 + b as f32) / 2.0;
        let g = g as f32;
        if g > rb_avg {
            pixel.0[1] = (g * (1.0 - factor) + rb_avg * factor) as u8;
        }
    }
}

/// 以 alpha 將前景合成到黑色背景
pub fn composite_on_black(image: &RgbImage, alpha: &GrayImage) -> RgbImage {
    let mut out = RgbImage::new(image.width(), image.height());
    for ((dst, src), a) in out.pixels_mut().zip(image.pixels()).zip(alpha.pixels()) {
        let weight = a[0] as f32 / 255.0;
        *dst = Rgb(src.0.map(|c| (c as f32 * weight) as u8));
    }
    out
}

pub fn rgba_cutout(image: &RgbImage, alpha: &GrayImage) -> RgbaImage {
    let mut out = RgbaImage::new(image.width(), image.height());
    for ((dst, src), a) in out.pixels_mut().zip(image.pixels()).zip(alpha.pixels()) {
        let [r, g, b] = src.0;
        dst.0 = [r, g, b, a[0]];
    }
    out
}

pub fn rgb_to_hsv(pixel: [u8; 3]) -> [u8; 3] {
    let [r, g, b] = pixel.map(|c| c as f32);
    let v = r.max(g).max(b);
    let min = r.min(g).min(b);
    let diff = v - min;

    let s = if v > 0.0 { 255.0 * diff / v } else { 0.0 };
    let mut h = if diff == 0.0 {
        0.0
    } else if v == r {
        60.0 * (g - b) / diff
    } else if v == g {
        120.0 + 60.0 * (b - r) / diff
    } else {
        240.0 + 60.0 * (r - g) / diff
    };
    if h < 0.0 {
        h += 360.0;
    }

    [
        ((h / 2.0).round() as u32 % 180) as u8,
        s.round() as u8,
        v as u8,
    ]
}

/// HSV 三個分量都落在 [lower, upper] 內的像素為 255
pub fn hsv_in_range(image: &RgbImage, lower: [u8; 3], upper: [u8; 3]) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let hsv = rgb_to_hsv(image.get_pixel(x, y).0);
        let inside = (0..3).all(|i| hsv[i] >= lower[i] && hsv[i] <= upper[i]);
        Luma([if inside { 255 } else { 0 }])
    })
}

pub fn invert(mask: &GrayImage) -> GrayImage {
    let mut out = mask.clone();
    out.pixels_mut().for_each(|p| p.0[0] = 255 - p.0[0]);
    out
}

pub fn intersect(a: &GrayImage, b: &GrayImage) -> GrayImage {
    let mut out = a.clone();
    for (dst, other) in out.pixels_mut().zip(b.pixels()) {
        dst.0[0] &= other.0[0];
    }
    out
}

/// 置中的圓形 ROI，半徑為 floor(min(h, w) * ratio / 2)
pub fn circular_mask(width: u32, height: u32, ratio: f32) -> GrayImage {
    let mut mask = GrayImage::new(width, height);
    let radius = (width.min(height) as f32 * ratio / 2.0) as i32;
    let center = ((width / 2) as i32, (height / 2) as i32);
    draw_filled_circle_mut(&mut mask, center, radius, Luma([255]));
    mask
}

/// 只保留最大的 8 連通前景區塊；面積相同時取掃描順序較前者
pub fn keep_largest_component(mask: &GrayImage) -> GrayImage {
    let labels = connected_components(mask, Connectivity::Eight, Luma([0u8]));

    let label_count = labels.pixels().map(|l| l[0]).max().unwrap_or(0) as usize;
    let mut areas = vec![0usize; label_count + 1];
    for label in labels.pixels() {
        areas[label[0] as usize] += 1;
    }

    let largest = areas
        .iter()
        .enumerate()
        .skip(1)
        .fold(None, |best: Option<(usize, usize)>, (label, &area)| match best {
            Some((_, best_area)) if best_area >= area => best,
            _ => Some((label, area)),
        });
    let Some((largest, _)) = largest else {
        return mask.clone();
    };

    GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        let keep = labels.get_pixel(x, y)[0] as usize == largest;
        Luma([if keep { 255 } else { 0 }])
    })
}

/// 正方形結構元素的形態學開運算；偶數邊長向上取奇數
pub fn morphological_open(mask: &GrayImage, kernel: u32) -> GrayImage {
    if kernel <= 1 {
        return mask.clone();
    }
    let radius = (kernel / 2).min(u8::MAX as u32) as u8;
    morphology::open(mask, Norm::LInf, radius)
}

const D65_X: f32 = 0.950456;
const D65_Z: f32 = 1.088754;
const LAB_EPS: f32 = 0.008856;

fn srgb_to_linear(c: u8) -> f32 {
    let c = c as f32 / 255.0;
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn linear_to_srgb(c: f32) -> u8 {
    let c = if c <= 0.003_130_8 {
        12.92 * c
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    };
    (c.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn lab_f(t: f32) -> f32 {
    if t > LAB_EPS {
        t.cbrt()
    } else {
        7.787 * t + 16.0 / 116.0
    }
}

fn lab_f_inv(f: f32) -> f32 {
    let t = f * f * f;
    if t > LAB_EPS {
        t
    } else {
        (f - 16.0 / 116.0) / 7.787
    }
}

/// 回傳 (L 0..255, a, b) ；a、b 為未位移的浮點值
pub fn rgb_to_lab(pixel: [u8; 3]) -> (u8, f32, f32) {
    let [r, g, b] = pixel.map(srgb_to_linear);
    let x = (0.412453 * r + 0.357580 * g + 0.180423 * b) / D65_X;
    let y = 0.212671 * r + 0.715160 * g + 0.072169 * b;
    let z = (0.019334 * r + 0.119193 * g + 0.950227 * b) / D65_Z;

    let (fx, fy, fz) = (lab_f(x), lab_f(y), lab_f(z));
    let l = if y > LAB_EPS {
        116.0 * fy - 16.0
    } else {
        903.3 * y
    };

    (
        (l * 255.0 / 100.0).round().clamp(0.0, 255.0) as u8,
        500.0 * (fx - fy),
        200.0 * (fy - fz),
    )
}

pub fn lab_to_rgb(l: u8, a: f32, b: f32) -> [u8; 3] {
    let l = l as f32 * 100.0 / 255.0;
    let fy = (l + 16.0) / 116.0;
    let fx = fy + a / 500.0;
    let fz = fy - b / 200.0;

    let y = if l > 903.3 * LAB_EPS {
        fy * fy * fy
    } else {
        l / 903.3
    };
    let x = lab_f_inv(fx) * D65_X;
    let z = lab_f_inv(fz) * D65_Z;

    let r = 3.240479 * x - 1.537150 * y - 0.498535 * z;
    let g = -0.969256 * x + 1.875991 * y + 0.041556 * z;
    let bl = 0.055648 * x - 0.204043 * y + 1.057311 * z;

    [linear_to_srgb(r), linear_to_srgb(g), linear_to_srgb(bl)]
}

fn tile_bounds(index: u32, tiles: u32, len: u32) -> (u32, u32) {
    let start = (index as u64 * len as u64 / tiles as u64) as u32;
    let end = ((index as u64 + 1) * len as u64 / tiles as u64) as u32;
    (start, end)
}

fn clipped_lut(hist: &mut [u32; 256], area: u32, clip_limit: f32) -> [u8; 256] {
    if clip_limit > 0.0 {
        let clip = ((clip_limit * area as f32 / 256.0) as u32).max(1);
        let mut excess = 0u32;
        for bin in hist.iter_mut() {
            if *bin > clip {
                excess += *bin - clip;
                *bin = clip;
            }
        }

        let batch = excess / 256;
        let residual = excess % 256;
        for bin in hist.iter_mut() {
            *bin += batch;
        }
        if residual > 0 {
            let step = (256 / residual).max(1) as usize;
            for bin in hist.iter_mut().step_by(step).take(residual as usize) {
                *bin += 1;
            }
        }
    }

    let scale = 255.0 / area.max(1) as f32;
    let mut lut = [0u8; 256];
    let mut cdf = 0u32;
    for (i, bin) in hist.iter().enumerate() {
        cdf += bin;
        lut[i] = (cdf as f32 * scale).round().min(255.0) as u8;
    }
    lut
}

/// 對比受限的自適應直方圖均衡化
pub fn clahe(gray: &GrayImage, clip_limit: f32, grid: u32) -> GrayImage {
    let (w, h) = gray.dimensions();
    if w == 0 || h == 0 {
        return gray.clone();
    }
    let tiles_x = grid.clamp(1, w);
    let tiles_y = grid.clamp(1, h);

    let mut luts = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        let (y0, y1) = tile_bounds(ty, tiles_y, h);
        for tx in 0..tiles_x {
            let (x0, x1) = tile_bounds(tx, tiles_x, w);
            let mut hist = [0u32; 256];
            for y in y0..y1 {
                for x in x0..x1 {
                    hist[gray.get_pixel(x, y)[0] as usize] += 1;
                }
            }
            let area = (x1 - x0) * (y1 - y0);
            luts.push(clipped_lut(&mut hist, area, clip_limit));
        }
    }

    let tile_w = w as f32 / tiles_x as f32;
    let tile_h = h as f32 / tiles_y as f32;
    let neighbours = |pos: f32, tile: f32, tiles: u32| -> (usize, usize, f32) {
        let g = (pos + 0.5) / tile - 0.5;
        let i0 = g.floor().clamp(0.0, (tiles - 1) as f32) as usize;
        let i1 = (i0 + 1).min(tiles as usize - 1);
        let frac = (g - i0 as f32).clamp(0.0, 1.0);
        (i0, i1, frac)
    };

    GrayImage::from_fn(w, h, |x, y| {
        let v = gray.get_pixel(x, y)[0] as usize;
        let (x0, x1, ax) = neighbours(x as f32, tile_w, tiles_x);
        let (y0, y1, ay) = neighbours(y as f32, tile_h, tiles_y);
        let lut = |tx: usize, ty: usize| luts[ty * tiles_x as usize + tx][v] as f32;

        let top = lut(x0, y0) * (1.0 - ax) + lut(x1, y0) * ax;
        let bottom = lut(x0, y1) * (1.0 - ax) + lut(x1, y1) * ax;
        Luma([(top * (1.0 - ay) + bottom * ay).round().clamp(0.0, 255.0) as u8])
    })
}

/// 在 Lab 的 L 通道上套用 CLAHE，a、b 不變
pub fn clahe_luminance(image: &RgbImage, clip_limit: f32, grid: u32) -> RgbImage {
    let (w, h) = image.dimensions();
    let lab: Vec<(u8, f32, f32)> = image.pixels().map(|p| rgb_to_lab(p.0)).collect();

    let luminance = GrayImage::from_raw(w, h, lab.iter().map(|(l, _, _)| *l).collect());
    let Some(luminance) = luminance else {
        return image.clone();
    };
    let equalized = clahe(&luminance, clip_limit, grid);

    let mut out = RgbImage::new(w, h);
    for ((dst, l), (_, a, b)) in out.pixels_mut().zip(equalized.pixels()).zip(lab.iter()) {
        *dst = Rgb(lab_to_rgb(l[0], *a, *b));
    }
    out
}

/// 前景遮罩像素比例
pub fn coverage(mask: &GrayImage) -> f32 {
    let total = mask.as_raw().len();
    if total == 0 {
        return 0.0;
    }
    mask.as_raw().iter().filter(|&&v| v > 0).count() as f32 / total as f32
}
