//! Image decoding for textures
//!
//! Decoding is a collaborator behind [`ImageDecoder`]; the renderer only ever
//! sees RGBA8 pixels. A failed decode falls back to the placeholder asset,
//! and if that is missing too, to a generated checkerboard.

use std::path::Path;
use thiserror::Error;

/// Image decoding errors
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The file could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The bytes are not a supported image
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// The image decoded to zero pixels
    #[error("Image has zero size")]
    Empty,
}

/// Tightly packed RGBA8 pixels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// `width * height * 4` bytes, row-major
    pub pixels: Vec<u8>,
}

impl DecodedImage {
    /// Side length of the generated fallback image
    pub const CHECKERBOARD_SIZE: u32 = 16;

    /// Magenta and black 2x2-pixel checkerboard
    pub fn checkerboard() -> Self {
        let size = Self::CHECKERBOARD_SIZE;
        let pixels = (0..size * size)
            .flat_map(|i| {
                let (x, y) = (i % size, i / size);
                if (x / 2 + y / 2) % 2 == 0 {
                    [255, 0, 255, 255]
                } else {
                    [0, 0, 0, 255]
                }
            })
            .collect();

        Self {
            width: size,
            height: size,
            pixels,
        }
    }

    /// Size of the pixel data in bytes
    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }
}

/// Turns a file into RGBA8 pixels
pub trait ImageDecoder {
    /// Decode the image at `path`
    fn decode(&self, path: &Path) -> Result<DecodedImage, DecodeError>;
}

/// Decoder for any format the `image` crate was built with
#[derive(Debug, Default, Clone, Copy)]
pub struct FileImageDecoder;

impl ImageDecoder for FileImageDecoder {
    fn decode(&self, path: &Path) -> Result<DecodedImage, DecodeError> {
        let bytes = std::fs::read(path)?;
        let rgba = image::load_from_memory(&bytes)?.to_rgba8();
        let (width, height) = rgba.dimensions();
        if width == 0 || height == 0 {
            return Err(DecodeError::Empty);
        }

        Ok(DecodedImage {
            width,
            height,
            pixels: rgba.into_raw(),
        })
    }
}

/// Decode `path`, substituting the placeholder asset on failure
pub fn decode_with_fallback(decoder: &dyn ImageDecoder, path: &Path, placeholder: &Path) -> DecodedImage {
    match decoder.decode(path) {
        Ok(image) => image,
        Err(e) => {
            log::warn!("Failed to decode texture {:?} ({}), using placeholder {:?}", path, e, placeholder);
            decoder.decode(placeholder).unwrap_or_else(|e| {
                log::warn!("Placeholder {:?} unavailable ({}), using built-in checkerboard", placeholder, e);
                DecodedImage::checkerboard()
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_png(name: &str, width: u32, height: u32, color: [u8; 4]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("sprite_engine_{}_{}.png", name, std::process::id()));
        image::RgbaImage::from_pixel(width, height, image::Rgba(color))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn test_decode_png() {
        let path = temp_png("decode", 3, 2, [10, 20, 30, 255]);
        let decoded = FileImageDecoder.decode(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!((decoded.width, decoded.height), (3, 2));
        assert_eq!(decoded.byte_len(), 3 * 2 * 4);
        assert_eq!(&decoded.pixels[..4], &[10, 20, 30, 255]);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = FileImageDecoder.decode(Path::new("no/such/texture.png"));
        assert!(matches!(result, Err(DecodeError::Io(_))));
    }

    #[test]
    fn test_garbage_is_image_error() {
        let path = std::env::temp_dir().join(format!("sprite_engine_garbage_{}.png", std::process::id()));
        std::fs::write(&path, b"definitely not a png").unwrap();
        let result = FileImageDecoder.decode(&path);
        std::fs::remove_file(&path).ok();
        assert!(matches!(result, Err(DecodeError::Image(_))));
    }

    #[test]
    fn test_fallback_to_placeholder() {
        let placeholder = temp_png("placeholder", 8, 8, [255, 0, 255, 255]);
        let decoded = decode_with_fallback(&FileImageDecoder, Path::new("missing.png"), &placeholder);
        std::fs::remove_file(&placeholder).ok();

        assert_eq!((decoded.width, decoded.height), (8, 8));
    }

    #[test]
    fn test_bundled_resources_decode() {
        let resources = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../resources");

        let placeholder = FileImageDecoder.decode(&resources.join("TextureNotFound.png")).unwrap();
        assert_eq!((placeholder.width, placeholder.height), (16, 16));

        let demo = FileImageDecoder.decode(&resources.join("demo_sprite.png")).unwrap();
        assert_eq!((demo.width, demo.height), (128, 128));
        // quadrants differ so a cropped corner is distinguishable from the whole image
        let pixel = |x: usize, y: usize| &demo.pixels[(y * 128 + x) * 4..(y * 128 + x) * 4 + 4];
        assert_ne!(pixel(16, 16), pixel(112, 112));
    }

    #[test]
    fn test_fallback_to_checkerboard() {
        let decoded = decode_with_fallback(&FileImageDecoder, Path::new("missing.png"), Path::new("also-missing.png"));
        assert_eq!(decoded, DecodedImage::checkerboard());
    }

    #[test]
    fn test_checkerboard_layout() {
        let board = DecodedImage::checkerboard();
        let size = DecodedImage::CHECKERBOARD_SIZE as usize;
        assert_eq!(board.byte_len(), size * size * 4);
        assert_eq!(&board.pixels[..4], &[255, 0, 255, 255]);
        // pixel (2, 0) starts the next cell
        assert_eq!(&board.pixels[8..12], &[0, 0, 0, 255]);
    }
}
