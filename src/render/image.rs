use crate::error::{Result, VideoForgeError};
use image::imageops::FilterType;
use image::{Rgb, RgbImage};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Options for image-mode preprocessing.
#[derive(Debug, Clone, Copy)]
pub struct ImagePrepOptions {
    pub target_width: u32,
    pub target_height: u32,
    /// Pick the pad color from averaged edge pixels instead of black.
    pub smart_pad_color: bool,
    /// Apply the brightness/contrast/saturation enhancement chain.
    pub auto_enhance: bool,
}

/// Average color of the image's border pixels, used as letterbox padding so
/// the bars blend into the picture.
fn edge_average_color(img: &RgbImage) -> Rgb<u8> {
    let (w, h) = img.dimensions();
    let mut sums = [0u64; 3];
    let mut count = 0u64;

    let mut add = |pixel: &Rgb<u8>| {
        for (sum, channel) in sums.iter_mut().zip(pixel.0.iter()) {
            *sum += u64::from(*channel);
        }
        count += 1;
    };

    for x in 0..w {
        add(img.get_pixel(x, 0));
        add(img.get_pixel(x, h - 1));
    }
    for y in 0..h {
        add(img.get_pixel(0, y));
        add(img.get_pixel(w - 1, y));
    }

    if count == 0 {
        return Rgb([0, 0, 0]);
    }
    Rgb([
        (sums[0] / count) as u8,
        (sums[1] / count) as u8,
        (sums[2] / count) as u8,
    ])
}

fn mean_luma(img: &RgbImage) -> f64 {
    let mut total = 0u64;
    for pixel in img.pixels() {
        let [r, g, b] = pixel.0;
        total += (u64::from(r) * 299 + u64::from(g) * 587 + u64::from(b) * 114) / 1000;
    }
    total as f64 / (img.width() as u64 * img.height() as u64).max(1) as f64
}

fn mean_saturation(img: &RgbImage) -> f64 {
    let mut total = 0u64;
    for pixel in img.pixels() {
        let [r, g, b] = pixel.0;
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        // HSV saturation scaled to 0..255, matching the qualification
        // threshold below.
        let s = if max == 0 {
            0
        } else {
            255 * u32::from(max - min) / u32::from(max)
        };
        total += u64::from(s);
    }
    total as f64 / (img.width() as u64 * img.height() as u64).max(1) as f64
}

/// Nudge brightness toward mid-gray, stretch contrast slightly, and boost
/// saturation on dull images.
fn auto_enhance(mut img: RgbImage) -> RgbImage {
    let brightness_shift = ((128.0 - mean_luma(&img)) * 0.3) as i32;
    if brightness_shift != 0 {
        img = image::imageops::brighten(&img, brightness_shift);
    }

    img = image::imageops::contrast(&img, 8.0);

    if mean_saturation(&img) < 100.0 {
        for pixel in img.pixels_mut() {
            let [r, g, b] = pixel.0.map(f64::from);
            let gray = (r + g + b) / 3.0;
            let boost = |c: f64| (gray + (c - gray) * 1.2).clamp(0.0, 255.0) as u8;
            pixel.0 = [boost(r), boost(g), boost(b)];
        }
    }

    img
}

/// Rescale with an aspect-preserving letterbox to the target resolution and
/// write the result next to the other temp artifacts. All dimensions are
/// forced even for H.264.
pub fn preprocess_image(
    input: &Path,
    output_dir: &Path,
    options: ImagePrepOptions,
) -> Result<PathBuf> {
    let img = image::open(input)
        .map_err(|e| {
            VideoForgeError::processing(
                "image_prep",
                format!("unreadable image {}: {}", input.display(), e),
            )
        })?
        .to_rgb8();

    let img = if options.auto_enhance {
        auto_enhance(img)
    } else {
        img
    };

    let target_w = options.target_width & !1;
    let target_h = options.target_height & !1;
    let (w, h) = img.dimensions();

    let scale = f64::min(
        f64::from(target_w) / f64::from(w),
        f64::from(target_h) / f64::from(h),
    );
    let new_w = ((f64::from(w) * scale) as u32).max(2) & !1;
    let new_h = ((f64::from(h) * scale) as u32).max(2) & !1;

    let resized = image::imageops::resize(&img, new_w, new_h, FilterType::Triangle);

    let pad_color = if options.smart_pad_color {
        edge_average_color(&img)
    } else {
        Rgb([0, 0, 0])
    };

    let mut canvas = RgbImage::from_pixel(target_w, target_h, pad_color);
    let offset_x = i64::from((target_w - new_w) / 2);
    let offset_y = i64::from((target_h - new_h) / 2);
    image::imageops::overlay(&mut canvas, &resized, offset_x, offset_y);

    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    let dest = output_dir.join(format!("processed_{}.jpg", stem));
    canvas.save(&dest).map_err(|e| {
        VideoForgeError::processing(
            "image_prep",
            format!("failed to save {}: {}", dest.display(), e),
        )
    })?;

    debug!(
        "preprocessed {} -> {} ({}x{})",
        input.display(),
        dest.display(),
        target_w,
        target_h
    );
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_image(w: u32, h: u32, color: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb(color))
    }

    #[test]
    fn test_edge_average_of_solid_image() {
        let img = solid_image(10, 10, [40, 80, 120]);
        assert_eq!(edge_average_color(&img), Rgb([40, 80, 120]));
    }

    #[test]
    fn test_mean_luma_bounds() {
        assert_eq!(mean_luma(&solid_image(4, 4, [0, 0, 0])), 0.0);
        let white = mean_luma(&solid_image(4, 4, [255, 255, 255]));
        assert!(white > 250.0);
    }

    #[test]
    fn test_preprocess_letterboxes_to_target() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("input.png");
        solid_image(320, 240, [200, 10, 10]).save(&src).unwrap();

        let dest = preprocess_image(
            &src,
            dir.path(),
            ImagePrepOptions {
                target_width: 640,
                target_height: 360,
                smart_pad_color: true,
                auto_enhance: false,
            },
        )
        .unwrap();

        let out = image::open(&dest).unwrap().to_rgb8();
        assert_eq!(out.dimensions(), (640, 360));
    }

    #[test]
    fn test_preprocess_rejects_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = preprocess_image(
            Path::new("/nonexistent/img.jpg"),
            dir.path(),
            ImagePrepOptions {
                target_width: 640,
                target_height: 360,
                smart_pad_color: false,
                auto_enhance: false,
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_enhance_brightens_dark_image() {
        let dark = solid_image(8, 8, [10, 10, 10]);
        let enhanced = auto_enhance(dark);
        assert!(mean_luma(&enhanced) > 10.0);
    }
}
