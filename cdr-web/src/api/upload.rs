//! Multipart upload handling
//!
//! Each request gets its own directory under the upload root. File fields
//! are written there under their sanitized client file name; every other
//! field is kept as text.

use axum::extract::Multipart;
use cdr_common::config::ensure_directory;
use cdr_refine::source::{is_boundary_file, is_data_file, BOUNDARY_EXTENSIONS, DATA_EXTENSIONS};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{ApiError, ApiResult};

pub const DATA_FIELD: &str = "data_file";
pub const BOUNDARY_FIELD: &str = "boundary_file";

/// Files and fields received in one request
#[derive(Debug)]
pub struct Upload {
    pub dir: PathBuf,
    pub data_file: Option<PathBuf>,
    pub boundary_file: Option<PathBuf>,
    pub fields: HashMap<String, String>,
}

impl Upload {
    /// Non-blank text field
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn require_data(&self) -> ApiResult<&Path> {
        self.data_file
            .as_deref()
            .ok_or_else(|| ApiError::BadRequest("Missing crash data file".to_string()))
    }

    pub fn require_boundary(&self) -> ApiResult<&Path> {
        self.boundary_file
            .as_deref()
            .ok_or_else(|| ApiError::BadRequest("Missing boundary file".to_string()))
    }

    /// Remove the upload directory
    pub fn discard(&self) {
        discard_dir(&self.dir);
    }
}

pub fn discard_dir(dir: &Path) {
    if let Err(e) = std::fs::remove_dir_all(dir) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %dir.display(), error = %e, "Failed to remove upload directory");
        }
    }
}

/// Final path component of a client-supplied file name
fn sanitize_file_name(raw: &str) -> Option<String> {
    let name = raw.rsplit(['/', '\\']).next()?.trim();
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    Some(name.to_string())
}

fn check_extension(field: &str, name: &str) -> ApiResult<()> {
    let path = Path::new(name);
    let (ok, allowed) = match field {
        DATA_FIELD => (is_data_file(path), DATA_EXTENSIONS),
        _ => (is_boundary_file(path), BOUNDARY_EXTENSIONS),
    };
    if ok {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!(
            "Unsupported file '{}'; expected one of: {}",
            name,
            allowed
                .iter()
                .map(|e| format!(".{e}"))
                .collect::<Vec<_>>()
                .join(", ")
        )))
    }
}

/// Store a multipart body under a fresh upload directory
pub async fn receive(upload_root: &Path, multipart: Multipart) -> ApiResult<Upload> {
    let dir = ensure_directory(&upload_root.join(Uuid::new_v4().to_string()))?;
    let mut upload = Upload {
        dir,
        data_file: None,
        boundary_file: None,
        fields: HashMap::new(),
    };

    match read_fields(&mut upload, multipart).await {
        Ok(()) => Ok(upload),
        Err(e) => {
            upload.discard();
            Err(e)
        }
    }
}

async fn read_fields(upload: &mut Upload, mut multipart: Multipart) -> ApiResult<()> {
    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if name == DATA_FIELD || name == BOUNDARY_FIELD {
            let file_name = field
                .file_name()
                .and_then(sanitize_file_name)
                .ok_or_else(|| ApiError::BadRequest(format!("Field '{name}' has no file name")))?;
            check_extension(&name, &file_name)?;

            let bytes = field.bytes().await?;
            if bytes.is_empty() {
                return Err(ApiError::BadRequest(format!("Uploaded file '{file_name}' is empty")));
            }

            let path = upload.dir.join(&file_name);
            tokio::fs::write(&path, &bytes).await?;
            debug!(field = %name, file = %file_name, bytes = bytes.len(), "Stored upload");

            if name == DATA_FIELD {
                upload.data_file = Some(path);
            } else {
                upload.boundary_file = Some(path);
            }
        } else {
            let text = field.text().await?;
            upload.fields.insert(name, text);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("crashes.csv").as_deref(), Some("crashes.csv"));
        assert_eq!(sanitize_file_name("../../etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(sanitize_file_name(r"C:\Users\me\area.kmz").as_deref(), Some("area.kmz"));
        assert_eq!(sanitize_file_name(".."), None);
        assert_eq!(sanitize_file_name("dir/"), None);
    }

    #[test]
    fn test_extension_check() {
        assert!(check_extension(DATA_FIELD, "crashes.XLSX").is_ok());
        assert!(check_extension(DATA_FIELD, "area.kmz").is_err());
        assert!(check_extension(BOUNDARY_FIELD, "area.kml").is_ok());
        assert!(check_extension(BOUNDARY_FIELD, "crashes.csv").is_err());
    }

    #[test]
    fn test_data_and_boundary_extensions_are_disjoint() {
        // Stored uploads share a directory; distinct extensions keep their names apart
        for ext in DATA_EXTENSIONS {
            assert!(!BOUNDARY_EXTENSIONS.contains(ext), "{ext}");
        }
    }
}
