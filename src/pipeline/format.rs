use serde::Serialize;

use super::AcquisitionError;

/// Document formats the acquirer accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    Pdf,
    Jpeg,
    Png,
    Tiff,
}

impl DocumentFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Tiff => "image/tiff",
        }
    }
}

/// Validate document bytes against the declared mime type.
///
/// The declared type restricts the accepted family (`image/*` or
/// `application/pdf`); the concrete format comes from magic bytes, never
/// from the declaration alone. Magic bytes don't lie — upload metadata can.
pub fn detect_format(bytes: &[u8], declared_mime: &str) -> Result<DocumentFormat, AcquisitionError> {
    if bytes.is_empty() {
        return Err(AcquisitionError::EmptyDocument);
    }

    let declared = declared_mime.trim().to_ascii_lowercase();
    if !(declared.starts_with("image/") || declared == "application/pdf") {
        return Err(AcquisitionError::UnsupportedFormat(declared));
    }

    let format = match bytes {
        [0x25, 0x50, 0x44, 0x46, ..] => DocumentFormat::Pdf,
        [0xFF, 0xD8, 0xFF, ..] => DocumentFormat::Jpeg,
        [0x89, 0x50, 0x4E, 0x47, ..] => DocumentFormat::Png,
        [0x49, 0x49, 0x2A, 0x00, ..] | [0x4D, 0x4D, 0x00, 0x2A, ..] => DocumentFormat::Tiff,
        _ => return Err(AcquisitionError::UnsupportedFormat(declared)),
    };

    // A PDF declared as an image (or vice versa) is a mislabeled upload.
    let family_ok = match format {
        DocumentFormat::Pdf => declared == "application/pdf",
        _ => declared.starts_with("image/"),
    };
    if !family_ok {
        return Err(AcquisitionError::UnsupportedFormat(declared));
    }

    Ok(format)
}
