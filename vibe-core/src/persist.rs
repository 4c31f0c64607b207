use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::{ImageError, RgbImage};

const ARTIFACT_PREFIX: &str = "VIBE_";
const JPEG_QUALITY: u8 = 100;

/// Writes the edited image as a quality-100 JPEG named
/// `VIBE_<YYYYMMDD-HHMMSS>_seed<seed>.jpg` and returns the path used.
///
/// Uniqueness rests on the (second, seed) pair; at single-user request rates
/// that is collision-free in practice and accepted as best-effort.
/// The output directory is expected to exist (created at session startup).
pub fn persist_result(
    image: &RgbImage,
    seed: u32,
    output_dir: &Path,
) -> Result<PathBuf, ImageError> {
    let path = output_dir.join(artifact_filename(seed));
    let file = File::create(&path)?;
    let mut encoder = JpegEncoder::new_with_quality(BufWriter::new(file), JPEG_QUALITY);
    encoder.encode_image(image)?;
    Ok(path)
}

fn artifact_filename(seed: u32) -> String {
    let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    format!("{ARTIFACT_PREFIX}{timestamp}_seed{seed}.jpg")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_embeds_timestamp_and_seed() {
        let name = artifact_filename(42);
        // VIBE_20260807-153012_seed42.jpg
        assert!(name.starts_with("VIBE_"));
        assert!(name.ends_with("_seed42.jpg"));
        let stamp = &name["VIBE_".len().."VIBE_".len() + 15];
        assert_eq!(stamp.as_bytes()[8], b'-');
        assert!(stamp
            .chars()
            .enumerate()
            .all(|(i, c)| if i == 8 { c == '-' } else { c.is_ascii_digit() }));
    }

    #[test]
    fn distinct_seeds_in_the_same_second_get_distinct_names() {
        assert_ne!(artifact_filename(1), artifact_filename(2));
    }

    #[test]
    fn persists_a_decodable_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let image = RgbImage::from_pixel(8, 8, image::Rgb([200, 100, 50]));

        let path = persist_result(&image, 7, dir.path()).unwrap();
        assert!(path.exists());
        assert_eq!(path.extension().unwrap(), "jpg");

        let reloaded = image::open(&path).unwrap().to_rgb8();
        assert_eq!(reloaded.dimensions(), (8, 8));
    }

    #[test]
    fn missing_output_directory_fails_with_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("does-not-exist");
        let image = RgbImage::from_pixel(2, 2, image::Rgb([0, 0, 0]));

        let err = persist_result(&image, 1, &gone).unwrap_err();
        assert!(matches!(err, ImageError::IoError(_)));
    }
}
