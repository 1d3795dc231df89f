//! Checks applied to uploaded images before anything is written.

use crate::error::{ApiError, ApiResult};

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";
const JPEG_SIGNATURE: &[u8] = &[0xFF, 0xD8, 0xFF];

/// Accepted image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    pub fn media_type(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
        }
    }

    fn codec(self) -> image::ImageFormat {
        match self {
            ImageFormat::Jpeg => image::ImageFormat::Jpeg,
            ImageFormat::Png => image::ImageFormat::Png,
        }
    }

    fn from_extension(extension: &str) -> Option<Self> {
        match extension {
            ".jpg" | ".jpeg" => Some(ImageFormat::Jpeg),
            ".png" => Some(ImageFormat::Png),
            _ => None,
        }
    }

    fn from_media_type(media_type: &str) -> Option<Self> {
        match media_type {
            "image/jpeg" | "image/jpg" => Some(ImageFormat::Jpeg),
            "image/png" => Some(ImageFormat::Png),
            _ => None,
        }
    }

    /// Format of a stored file, judged by its extension.
    pub fn of_path(path: &str) -> Option<Self> {
        let extension = extension(path)?;
        Self::from_extension(&extension)
    }
}

/// A validated upload name: the lowercased extension and its format.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct UploadName {
    pub extension: String,
    pub format: ImageFormat,
}

/// The last path segment of a client supplied file name.
pub(crate) fn sanitize_filename(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or_default()
}

fn extension(name: &str) -> Option<String> {
    let name = sanitize_filename(name);
    let dot = name.rfind('.').filter(|&i| i > 0)?;

    Some(name[dot..].to_ascii_lowercase())
}

/// Checks that the declared media type and the file extension name the same
/// supported format.
pub(crate) fn validate_name(content_type: Option<&str>, file_name: &str) -> ApiResult<UploadName> {
    let content_type = content_type.unwrap_or_default().to_ascii_lowercase();

    let Some(declared) = ImageFormat::from_media_type(&content_type) else {
        return Err(ApiError::UnsupportedMediaType("Only JPEG/PNG supported"));
    };

    let Some((extension, format)) =
        extension(file_name).and_then(|ext| ImageFormat::from_extension(&ext).map(|format| (ext, format)))
    else {
        return Err(ApiError::UnsupportedMediaType("Only .jpg/.jpeg/.png files allowed"));
    };

    if declared != format {
        return Err(ApiError::UnsupportedMediaType("MIME type does not match file extension"));
    }

    Ok(UploadName { extension, format })
}

/// Checks the leading bytes for a JPEG or PNG signature.
pub(crate) fn sniff(bytes: &[u8]) -> ApiResult<ImageFormat> {
    if bytes.starts_with(PNG_SIGNATURE) {
        Ok(ImageFormat::Png)
    } else if bytes.starts_with(JPEG_SIGNATURE) {
        Ok(ImageFormat::Jpeg)
    } else {
        Err(ApiError::UnsupportedMediaType("Invalid or corrupted image"))
    }
}

/// Decodes the whole image, rejecting truncated or corrupted data behind a valid signature.
pub(crate) fn verify(bytes: &[u8], format: ImageFormat) -> ApiResult<()> {
    image::load_from_memory_with_format(bytes, format.codec())
        .map(drop)
        .map_err(|e| {
            log::debug!("Rejected undecodable {} upload: {e}", format.media_type());
            ApiError::UnsupportedMediaType("Invalid or corrupted image")
        })
}
