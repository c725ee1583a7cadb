use std::path::Path;

use anyhow::Context;

use crate::errors::{ContractError, ContractResult};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum QueryModality {
    TextSearch,
    PhotoUpload,
}

impl QueryModality {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TextSearch => "text",
            Self::PhotoUpload => "photo",
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub enum Query {
    Text(String),
    Image { bytes: Vec<u8>, mime_type: String },
}

impl Query {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn image(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self::Image {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    pub fn image_from_path(path: &Path) -> anyhow::Result<Self> {
        let mime_type = image_mime_for_path(path).ok_or_else(|| {
            anyhow::anyhow!("unsupported image type for {}", path.display())
        })?;
        let bytes =
            std::fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
        Ok(Self::image(bytes, mime_type))
    }

    pub fn modality(&self) -> QueryModality {
        match self {
            Self::Text(_) => QueryModality::TextSearch,
            Self::Image { .. } => QueryModality::PhotoUpload,
        }
    }

    pub fn display_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.trim()),
            Self::Image { .. } => None,
        }
    }

    pub fn validate(&self) -> ContractResult<()> {
        match self {
            Self::Text(value) if value.trim().is_empty() => {
                Err(ContractError::validation("search text is empty"))
            }
            Self::Text(_) => Ok(()),
            Self::Image { bytes, .. } if bytes.is_empty() => {
                Err(ContractError::validation("image payload is empty"))
            }
            Self::Image { mime_type, .. } if !mime_type.trim().starts_with("image/") => Err(
                ContractError::validation(format!("unsupported media type '{mime_type}'")),
            ),
            Self::Image { .. } => Ok(()),
        }
    }
}

impl std::fmt::Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(value) => f.debug_tuple("Text").field(value).finish(),
            Self::Image { bytes, mime_type } => f
                .debug_struct("Image")
                .field("bytes", &bytes.len())
                .field("mime_type", mime_type)
                .finish(),
        }
    }
}

pub fn image_mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "heic" => Some("image/heic"),
        "heif" => Some("image/heif"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::ContractErrorKind;

    use super::*;

    #[test]
    fn blank_text_is_rejected() {
        let err = Query::text("   \n").validate().err();
        assert_eq!(
            err.map(|err| err.kind()),
            Some(ContractErrorKind::ValidationError)
        );
        assert!(Query::text(" Rose ").validate().is_ok());
    }

    #[test]
    fn image_requires_bytes_and_image_media_type() {
        assert!(Query::image(vec![1, 2, 3], "image/jpeg").validate().is_ok());
        assert!(Query::image(Vec::new(), "image/jpeg").validate().is_err());
        assert!(Query::image(vec![1], "application/pdf").validate().is_err());
    }

    #[test]
    fn modality_and_display_text() {
        let text = Query::text("  Cactus ");
        assert_eq!(text.modality(), QueryModality::TextSearch);
        assert_eq!(text.display_text(), Some("Cactus"));

        let photo = Query::image(vec![0xff], "image/png");
        assert_eq!(photo.modality(), QueryModality::PhotoUpload);
        assert_eq!(photo.display_text(), None);
        assert_eq!(
            format!("{photo:?}"),
            "Image { bytes: 1, mime_type: \"image/png\" }"
        );
    }

    #[test]
    fn image_from_path_infers_media_type() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("leaf.JPG");
        std::fs::write(&path, [0xff, 0xd8, 0xff])?;
        let query = Query::image_from_path(&path)?;
        assert_eq!(query, Query::image(vec![0xff, 0xd8, 0xff], "image/jpeg"));

        let unknown = temp.path().join("notes.txt");
        std::fs::write(&unknown, "hello")?;
        assert!(Query::image_from_path(&unknown).is_err());
        Ok(())
    }
}
