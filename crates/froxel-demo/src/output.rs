//! PNG output for composited frames.

use std::path::Path;

use froxel_render::ColorImage;
use glam::Vec4;

#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("failed to encode PNG: {0}")]
    Encode(#[from] png::EncodingError),
    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
}

/// Clamp linear radiance to [0, 1], apply display gamma, and quantize.
pub fn to_srgb8(color: Vec4) -> [u8; 4] {
    let encode = |c: f32| (c.clamp(0.0, 1.0).powf(1.0 / 2.2) * 255.0).round() as u8;
    let alpha = (color.w.clamp(0.0, 1.0) * 255.0).round() as u8;
    [encode(color.x), encode(color.y), encode(color.z), alpha]
}

pub fn encode_png(image: &ColorImage) -> Result<Vec<u8>, OutputError> {
    let pixels: Vec<u8> = image.pixels().iter().flat_map(|&p| to_srgb8(p)).collect();

    let mut png_buf = Vec::new();
    {
        let mut encoder = png::Encoder::new(
            std::io::Cursor::new(&mut png_buf),
            image.width(),
            image.height(),
        );
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&pixels)?;
        writer.finish()?;
    }
    Ok(png_buf)
}

pub fn write_png(path: &Path, image: &ColorImage) -> Result<(), OutputError> {
    let bytes = encode_png(image)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| OutputError::Write {
            path: parent.display().to_string(),
            source,
        })?;
    }
    std::fs::write(path, bytes).map_err(|source| OutputError::Write {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_srgb8_clamps() {
        assert_eq!(to_srgb8(Vec4::new(2.0, -1.0, 1.0, 1.0)), [255, 0, 255, 255]);
        assert_eq!(to_srgb8(Vec4::ZERO), [0, 0, 0, 0]);
    }

    #[test]
    fn test_encode_png_signature() {
        let image = ColorImage::filled(3, 2, Vec4::new(0.5, 0.5, 0.5, 1.0));
        let bytes = encode_png(&image).unwrap();
        assert_eq!(&bytes[..8], &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);
    }

    #[test]
    fn test_write_png_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frames").join("fog.png");
        write_png(&path, &ColorImage::new(2, 2)).unwrap();
        assert!(path.exists());
    }
}
