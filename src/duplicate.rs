//! End-of-document detection using perceptual hashing.
//!
//! Two consecutive frames depicting the same page mean the page-turn had no
//! visible effect, which signals end-of-document (or a stalled reader).
//! Comparison is perceptual, not byte-exact, so anti-aliasing jitter, cursor
//! blink and clock widgets do not defeat it.

use image::DynamicImage;

/// Hash size (8x8 = 64 bits)
const HASH_SIZE: u32 = 8;

/// Perceptual hash value (64-bit)
pub type PerceptualHash = u64;

/// Decides whether two consecutively captured frames depict the same page.
///
/// A single-method contract so tests can substitute deterministic fakes
/// without any screen I/O.
pub trait DuplicateDetector {
    fn is_duplicate(&self, a: &DynamicImage, b: &DynamicImage) -> bool;
}

/// Hash algorithm used for frame comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    /// Average hash: bit per pixel vs. mean brightness
    Mean,
    /// Difference hash: bit per horizontally adjacent pixel pair
    Gradient,
}

impl HashAlgorithm {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "mean" => Some(HashAlgorithm::Mean),
            "gradient" => Some(HashAlgorithm::Gradient),
            _ => None,
        }
    }
}

/// Perceptual frame comparator with a Hamming distance threshold.
///
/// Distances below the threshold count as the same page. A borderline
/// distance (exactly at the threshold) classifies as NOT duplicate: a
/// truncated book is worse than a few trailing duplicate pages.
pub struct PerceptualDetector {
    algorithm: HashAlgorithm,
    threshold: u32,
}

impl PerceptualDetector {
    pub fn new(algorithm: HashAlgorithm, threshold: u32) -> Self {
        Self { algorithm, threshold }
    }

    fn hash(&self, image: &DynamicImage) -> PerceptualHash {
        match self.algorithm {
            HashAlgorithm::Mean => mean_hash(image),
            HashAlgorithm::Gradient => gradient_hash(image),
        }
    }

    /// Hamming distance between the two frames' hashes
    pub fn distance(&self, a: &DynamicImage, b: &DynamicImage) -> u32 {
        hamming_distance(self.hash(a), self.hash(b))
    }
}

impl Default for PerceptualDetector {
    fn default() -> Self {
        Self::new(HashAlgorithm::Mean, 8)
    }
}

impl DuplicateDetector for PerceptualDetector {
    fn is_duplicate(&self, a: &DynamicImage, b: &DynamicImage) -> bool {
        self.distance(a, b) < self.threshold
    }
}

/// Compute average hash (aHash) for an image
///
/// Algorithm:
/// 1. Resize to 8x8
/// 2. Convert to grayscale
/// 3. Calculate average brightness
/// 4. Generate 64-bit hash: bit=1 if pixel > average, else 0
pub fn mean_hash(image: &DynamicImage) -> PerceptualHash {
    let resized = image.resize_exact(HASH_SIZE, HASH_SIZE, image::imageops::FilterType::Nearest);
    let gray = resized.to_luma8();

    let sum: u32 = gray.pixels().map(|p| p.0[0] as u32).sum();
    let avg = (sum / (HASH_SIZE * HASH_SIZE)) as u8;

    let mut hash: PerceptualHash = 0;
    for (i, pixel) in gray.pixels().enumerate() {
        if pixel.0[0] > avg {
            hash |= 1 << i;
        }
    }

    hash
}

/// Compute difference hash (dHash) for an image
///
/// Algorithm:
/// 1. Resize to 9x8 (one extra column)
/// 2. Convert to grayscale
/// 3. Compare adjacent pixels horizontally
/// 4. Generate 64-bit hash: bit=1 if left > right
pub fn gradient_hash(image: &DynamicImage) -> PerceptualHash {
    let resized =
        image.resize_exact(HASH_SIZE + 1, HASH_SIZE, image::imageops::FilterType::Nearest);
    let gray = resized.to_luma8();

    let mut hash: PerceptualHash = 0;
    let mut bit = 0;

    for y in 0..HASH_SIZE {
        for x in 0..HASH_SIZE {
            let left = gray.get_pixel(x, y).0[0];
            let right = gray.get_pixel(x + 1, y).0[0];

            if left > right {
                hash |= 1 << bit;
            }
            bit += 1;
        }
    }

    hash
}

/// Calculate Hamming distance between two hashes
///
/// Returns the number of bits that differ (0-64)
pub fn hamming_distance(a: PerceptualHash, b: PerceptualHash) -> u32 {
    (a ^ b).count_ones()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn flat_image(brightness: u8) -> DynamicImage {
        let mut img = RgbImage::new(100, 100);
        for pixel in img.pixels_mut() {
            *pixel = Rgb([brightness, brightness, brightness]);
        }
        DynamicImage::ImageRgb8(img)
    }

    fn half_image() -> DynamicImage {
        let mut img = RgbImage::new(100, 100);
        for (x, _, pixel) in img.enumerate_pixels_mut() {
            let brightness = if x < 50 { 0 } else { 255 };
            *pixel = Rgb([brightness, brightness, brightness]);
        }
        DynamicImage::ImageRgb8(img)
    }

    /// Half image with a handful of flipped pixels, standing in for cursor
    /// blink or clock-widget noise
    fn half_image_with_noise() -> DynamicImage {
        let mut img = RgbImage::new(100, 100);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            let brightness = if x < 50 { 0 } else { 255 };
            let brightness = if x == 97 && y < 3 { 128 } else { brightness };
            *pixel = Rgb([brightness, brightness, brightness]);
        }
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_hamming_distance() {
        assert_eq!(hamming_distance(0, 0), 0);
        assert_eq!(hamming_distance(0, 1), 1);
        assert_eq!(hamming_distance(0, 0xFF), 8);
        assert_eq!(hamming_distance(0, u64::MAX), 64);
    }

    #[test]
    fn test_identical_images_same_hash() {
        assert_eq!(mean_hash(&half_image()), mean_hash(&half_image()));
        assert_eq!(gradient_hash(&half_image()), gradient_hash(&half_image()));
    }

    #[test]
    fn test_different_images_far_apart() {
        let distance = hamming_distance(mean_hash(&flat_image(0)), mean_hash(&half_image()));
        assert!(distance > 20, "distance was {}", distance);
    }

    #[test]
    fn test_identical_frames_are_duplicates() {
        let detector = PerceptualDetector::default();
        assert!(detector.is_duplicate(&half_image(), &half_image()));
    }

    #[test]
    fn test_noise_tolerated() {
        // A blinking cursor or clock widget must not keep the session alive
        let detector = PerceptualDetector::default();
        assert!(detector.is_duplicate(&half_image(), &half_image_with_noise()));
    }

    #[test]
    fn test_distinct_frames_not_duplicates() {
        let detector = PerceptualDetector::default();
        assert!(!detector.is_duplicate(&flat_image(0), &half_image()));
    }

    #[test]
    fn test_borderline_distance_is_not_duplicate() {
        // Distance exactly at the threshold must classify as distinct
        let detector = PerceptualDetector::new(HashAlgorithm::Mean, 0);
        assert!(!detector.is_duplicate(&half_image(), &half_image()));
    }

    #[test]
    fn test_gradient_detector() {
        let detector = PerceptualDetector::new(HashAlgorithm::Gradient, 8);
        assert!(detector.is_duplicate(&half_image(), &half_image()));
        assert!(!detector.is_duplicate(&flat_image(0), &half_image()));
    }

    #[test]
    fn test_algorithm_parse() {
        assert_eq!(HashAlgorithm::parse("mean"), Some(HashAlgorithm::Mean));
        assert_eq!(HashAlgorithm::parse("gradient"), Some(HashAlgorithm::Gradient));
        assert_eq!(HashAlgorithm::parse("dct"), None);
    }
}
