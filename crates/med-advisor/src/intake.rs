//! Upload Intake
//!
//! Validates uploaded images and documents against the extension
//! allow-list, stages them on disk and turns them into message attachments.

use std::path::{Path, PathBuf};

use agent_core::{Attachment, AttachmentKind};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::{AdvisorError, Result};

/// Accepted extensions (lowercase)
pub const ALLOWED_EXTENSIONS: [&str; 6] = ["txt", "pdf", "png", "jpg", "jpeg", "gif"];

/// Largest accepted file
pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// A file written to the staging directory
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StagedFile {
    pub filename: String,
    pub path: PathBuf,
    pub kind: AttachmentKind,
    pub media_type: String,
    pub size: usize,
}

/// Local staging directory for uploads
#[derive(Clone, Debug)]
pub struct UploadArea {
    dir: PathBuf,
}

impl UploadArea {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    /// Validate and write one upload, returning where it landed
    pub async fn save(&self, original_name: &str, bytes: &[u8]) -> Result<StagedFile> {
        let filename = secure_filename(original_name)
            .ok_or_else(|| AdvisorError::InvalidUpload(format!("unusable file name {:?}", original_name)))?;
        let (kind, media_type) = classify(&filename)?;
        check_size(&filename, bytes.len())?;

        self.ensure_dir().await?;
        let path = self.dir.join(&filename);
        tokio::fs::write(&path, bytes).await?;
        tracing::info!(file = %filename, size = bytes.len(), "Upload staged");

        Ok(StagedFile {
            filename,
            path,
            kind,
            media_type: media_type.to_string(),
            size: bytes.len(),
        })
    }

    /// Names of staged files, sorted; empty when nothing was uploaded yet
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Attachment for in-memory file content
pub fn attachment_from_bytes(filename: &str, bytes: &[u8]) -> Result<Attachment> {
    let name = secure_filename(filename)
        .ok_or_else(|| AdvisorError::InvalidUpload(format!("unusable file name {:?}", filename)))?;
    let (kind, media_type) = classify(&name)?;
    check_size(&name, bytes.len())?;
    Ok(Attachment::new(kind, name, media_type, STANDARD.encode(bytes)))
}

/// Attachment for a local file (CLI directives)
pub async fn attachment_from_path(path: impl AsRef<Path>) -> Result<Attachment> {
    let path = path.as_ref();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    // reject by extension before touching the disk
    classify(&name)?;

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| AdvisorError::InvalidUpload(format!("{}: {}", path.display(), e)))?;
    attachment_from_bytes(&name, &bytes)
}

/// Whether the name has an allowed extension (case-insensitive)
pub fn is_allowed(filename: &str) -> bool {
    extension(filename).is_some_and(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
}

/// Reduce a client-supplied name to a safe basename
///
/// Directory components are dropped and characters outside
/// `[A-Za-z0-9._-]` become `_`. `None` if nothing usable remains.
pub fn secure_filename(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_start_matches(['.', '_']).to_string();

    (!cleaned.is_empty()).then_some(cleaned)
}

fn extension(filename: &str) -> Option<String> {
    let (stem, ext) = filename.rsplit_once('.')?;
    (!stem.is_empty() && !ext.is_empty()).then(|| ext.to_ascii_lowercase())
}

fn classify(filename: &str) -> Result<(AttachmentKind, &'static str)> {
    let ext = extension(filename).unwrap_or_default();
    let classified = match ext.as_str() {
        "png" => (AttachmentKind::Image, "image/png"),
        "jpg" | "jpeg" => (AttachmentKind::Image, "image/jpeg"),
        "gif" => (AttachmentKind::Image, "image/gif"),
        "pdf" => (AttachmentKind::Document, "application/pdf"),
        "txt" => (AttachmentKind::Document, "text/plain"),
        _ => {
            return Err(AdvisorError::InvalidUpload(format!(
                "{:?} is not one of {}",
                filename,
                ALLOWED_EXTENSIONS.join(", ")
            )));
        }
    };
    Ok(classified)
}

fn check_size(filename: &str, size: usize) -> Result<()> {
    if size > MAX_UPLOAD_BYTES {
        return Err(AdvisorError::InvalidUpload(format!(
            "{} is larger than {} bytes",
            filename, MAX_UPLOAD_BYTES
        )));
    }
    Ok(())
}
