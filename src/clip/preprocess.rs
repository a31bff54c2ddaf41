//! Image decoding and vision-encoder input preprocessing.

use anyhow::{anyhow, Result};
use image::DynamicImage;
use std::path::Path;

use super::engine::ImageTensor;

/// CLIP input resolution (ViT-B/32).
pub const CLIP_IMAGE_SIZE: u32 = 224;

// CLIP normalization constants (ImageNet stats)
const MEAN: [f32; 3] = [0.48145466, 0.4578275, 0.40821073];
const STD: [f32; 3] = [0.26862954, 0.26130258, 0.27577711];

/// Decode an image from disk.
pub fn load_image(path: &Path) -> Result<DynamicImage> {
    image::open(path).map_err(|e| anyhow!("failed to load image from '{}': {}", path.display(), e))
}

/// Resize and normalize a decoded image into NCHW encoder input.
pub fn to_input_tensor(image: &DynamicImage) -> ImageTensor {
    let resized = image.resize_exact(
        CLIP_IMAGE_SIZE,
        CLIP_IMAGE_SIZE,
        image::imageops::FilterType::Triangle,
    );
    let rgb = resized.to_rgb8();

    let size = CLIP_IMAGE_SIZE as usize;
    let mut data = Vec::with_capacity(3 * size * size);

    // Channel-first layout, normalized: (pixel/255 - mean) / std
    for c in 0..3 {
        for y in 0..CLIP_IMAGE_SIZE {
            for x in 0..CLIP_IMAGE_SIZE {
                let pixel = rgb.get_pixel(x, y);
                data.push((pixel[c] as f32 / 255.0 - MEAN[c]) / STD[c]);
            }
        }
    }

    ImageTensor { data }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_tensor_has_full_input_size() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(32, 64));
        let tensor = to_input_tensor(&img);
        assert_eq!(tensor.data.len(), 3 * 224 * 224);
    }

    #[test]
    fn test_constant_image_normalizes_per_channel() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([255, 0, 128])));
        let tensor = to_input_tensor(&img);

        let plane = 224 * 224;
        let expected_r = (1.0 - MEAN[0]) / STD[0];
        let expected_g = (0.0 - MEAN[1]) / STD[1];
        let expected_b = (128.0 / 255.0 - MEAN[2]) / STD[2];

        assert!((tensor.data[0] - expected_r).abs() < 1e-4);
        assert!((tensor.data[plane] - expected_g).abs() < 1e-4);
        assert!((tensor.data[2 * plane] - expected_b).abs() < 1e-4);
    }

    #[test]
    fn test_load_image_missing_file() {
        let err = load_image(Path::new("/no/such/image.png")).unwrap_err();
        assert!(err.to_string().contains("/no/such/image.png"));
    }
}
