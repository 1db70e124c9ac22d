//! Uploaded board photos: extension filter (jpg/jpeg/png) and decode check.

use image::ImageFormat;
use std::path::Path;

/// Extensions the upload form accepts.
pub const ACCEPTED_EXTENSIONS: &[&str] = &["jpg", "png", "jpeg"];

/// An uploaded image that decoded successfully. Bytes are kept as uploaded.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("no image uploaded")]
    Empty,
    #[error("unsupported file type: {0} (expected jpg, jpeg or png)")]
    Extension(String),
    #[error("file is not a PNG or JPEG image")]
    Format,
    #[error("image could not be decoded: {0}")]
    Decode(#[from] image::ImageError),
}

impl UploadedImage {
    /// Validate an upload. `filename` is the client-side name, if the browser sent one.
    pub fn decode(bytes: Vec<u8>, filename: Option<&str>) -> Result<Self, ImageError> {
        if bytes.is_empty() {
            return Err(ImageError::Empty);
        }
        if let Some(ext) = filename
            .and_then(|f| Path::new(f).extension())
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
        {
            if !ACCEPTED_EXTENSIONS.contains(&ext.as_str()) {
                return Err(ImageError::Extension(ext));
            }
        }
        let format = image::guess_format(&bytes).map_err(|_| ImageError::Format)?;
        if !matches!(format, ImageFormat::Png | ImageFormat::Jpeg) {
            return Err(ImageError::Format);
        }
        let decoded = image::load_from_memory_with_format(&bytes, format)?;
        Ok(Self {
            mime_type: format.to_mime_type().to_string(),
            width: decoded.width(),
            height: decoded.height(),
            bytes,
        })
    }
}

#[cfg(test)]
pub(crate) fn png_fixture() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(4, 3, image::Rgb([20, 140, 60]));
    let mut out = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn png_is_accepted() {
        let img = UploadedImage::decode(png_fixture(), Some("board.PNG")).unwrap();
        assert_eq!(img.mime_type, "image/png");
        assert_eq!((img.width, img.height), (4, 3));
    }

    #[test]
    fn missing_filename_skips_extension_check() {
        assert!(UploadedImage::decode(png_fixture(), None).is_ok());
    }

    #[test]
    fn wrong_extension_is_rejected() {
        let err = UploadedImage::decode(png_fixture(), Some("board.gif")).unwrap_err();
        assert!(matches!(err, ImageError::Extension(ref e) if e == "gif"));
    }

    #[test]
    fn non_image_bytes_are_rejected() {
        let err = UploadedImage::decode(b"not an image at all".to_vec(), Some("x.jpg")).unwrap_err();
        assert!(matches!(err, ImageError::Format));
    }

    #[test]
    fn truncated_png_fails_to_decode() {
        let mut bytes = png_fixture();
        bytes.truncate(20);
        let err = UploadedImage::decode(bytes, Some("x.png")).unwrap_err();
        assert!(matches!(err, ImageError::Decode(_)));
    }

    #[test]
    fn empty_upload_is_rejected() {
        assert!(matches!(
            UploadedImage::decode(Vec::new(), Some("x.png")),
            Err(ImageError::Empty)
        ));
    }
}
