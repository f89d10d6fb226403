use anyhow::Result;

use crate::error::MigrateError;

/// A wiki attachment and the mime type it is uploaded with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaAsset {
    pub id: String,
    pub mime_type: &'static str,
}

impl MediaAsset {
    pub fn from_id(id: &str) -> Result<Self> {
        Ok(Self {
            id: id.to_string(),
            mime_type: mime_type_for(id)?,
        })
    }

    /// File name used on Drive: the wiki id with namespaces flattened.
    pub fn upload_name(&self) -> String {
        self.id.trim_start_matches(':').replace(':', "_")
    }
}

/// Mime type for the attachment kinds the wiki is known to hold. Anything
/// else is refused rather than guessed.
pub fn mime_type_for(file_name: &str) -> Result<&'static str> {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, extension)| extension)
        .unwrap_or("");
    let mime = match extension.to_ascii_lowercase().as_str() {
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "ppt" => "application/vnd.ms-powerpoint",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "svg" => "image/svg+xml",
        "mp4" => "video/mp4",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        _ => {
            return Err(MigrateError::UnknownMediaType {
                file: file_name.to_string(),
                extension: extension.to_string(),
            }
            .into());
        }
    };
    Ok(mime)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_extensions_map_to_mime_types() {
        assert_eq!(mime_type_for("wiki:logo.png").expect("png"), "image/png");
        assert_eq!(mime_type_for("a:photo.JPG").expect("jpg"), "image/jpeg");
        assert_eq!(mime_type_for("b.jpeg").expect("jpeg"), "image/jpeg");
        assert_eq!(
            mime_type_for("team:report.xlsx").expect("xlsx"),
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
        );
        assert_eq!(mime_type_for("manual.pdf").expect("pdf"), "application/pdf");
    }

    #[test]
    fn unknown_extension_is_fatal() {
        let error = mime_type_for("wiki:notes.txt").expect_err("must fail");
        match error.downcast_ref::<MigrateError>() {
            Some(MigrateError::UnknownMediaType { file, extension }) => {
                assert_eq!(file, "wiki:notes.txt");
                assert_eq!(extension, "txt");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(mime_type_for("wiki:no_extension").is_err());
    }

    #[test]
    fn upload_name_flattens_namespaces() {
        let asset = MediaAsset::from_id("team:docs:guide.pdf").expect("asset");
        assert_eq!(asset.upload_name(), "team_docs_guide.pdf");
        assert_eq!(asset.mime_type, "application/pdf");
    }
}
