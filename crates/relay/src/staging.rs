//! Local staging of decoded attachments.

use std::path::{Path, PathBuf};

use {
    courier_config::{StagingConfig, StagingNaming},
    tracing::{debug, warn},
};

use crate::error::{RelayError, Result};

/// Writes attachments into the staging directory.
#[derive(Debug, Clone)]
pub struct Stager {
    dir: PathBuf,
    naming: StagingNaming,
    fixed_name: String,
}

impl Stager {
    pub fn new(dir: impl Into<PathBuf>, naming: StagingNaming, fixed_name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            naming,
            fixed_name: fixed_name.into(),
        }
    }

    pub fn from_config(config: &StagingConfig) -> Self {
        Self::new(config.resolved_dir(), config.naming, config.fixed_name.clone())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path the attachment of `message_id` is staged at.
    ///
    /// With [`StagingNaming::Fixed`] every message maps to the same file, so
    /// callers must not run two operations at once.
    pub fn path_for(&self, message_id: &str, mimetype: &str) -> PathBuf {
        match self.naming {
            StagingNaming::Fixed => self.dir.join(&self.fixed_name),
            StagingNaming::PerMessage => self.dir.join(format!(
                "{}.{}",
                sanitize_file_stem(message_id),
                extension_for(mimetype)
            )),
        }
    }

    /// Write `bytes` to the staging path for `message_id`.
    pub async fn stage(
        &self,
        message_id: &str,
        mimetype: &str,
        upload_name: Option<&str>,
        bytes: &[u8],
    ) -> Result<StagedAttachment> {
        let path = self.path_for(message_id, mimetype);

        if let Err(source) = tokio::fs::create_dir_all(&self.dir).await {
            return Err(RelayError::Stage {
                path: self.dir.clone(),
                source,
            });
        }

        if let Err(source) = tokio::fs::write(&path, bytes).await {
            // Don't leave a truncated file behind.
            let _ = tokio::fs::remove_file(&path).await;
            return Err(RelayError::Stage { path, source });
        }

        let file_name = upload_name
            .map(sanitize_file_stem)
            .or_else(|| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| format!("attachment.{}", extension_for(mimetype)));

        debug!(path = %path.display(), bytes = bytes.len(), "staged attachment");

        Ok(StagedAttachment {
            path,
            len: bytes.len() as u64,
            mimetype: mimetype.to_string(),
            file_name,
        })
    }
}

/// An attachment written to disk for the duration of one relay operation.
///
/// Never modified after staging; [`remove`](StagedAttachment::remove)
/// consumes it.
#[derive(Debug)]
pub struct StagedAttachment {
    path: PathBuf,
    len: u64,
    mimetype: String,
    file_name: String,
}

impl StagedAttachment {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn mimetype(&self) -> &str {
        &self.mimetype
    }

    /// File name announced in the multipart part.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Delete the staged file. A file that is already gone counts as removed.
    pub async fn remove(self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!(path = %self.path.display(), "removed staged attachment");
                Ok(())
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %self.path.display(), "staged attachment already gone");
                Ok(())
            },
            Err(source) => Err(RelayError::Cleanup {
                path: self.path,
                source,
            }),
        }
    }
}

/// Map an identifier to a safe file name: anything outside
/// `[A-Za-z0-9._-]` becomes `_`, and leading/trailing dots are stripped.
pub(crate) fn sanitize_file_stem(raw: &str) -> String {
    let mapped: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = mapped.trim_matches('.');
    if trimmed.is_empty() {
        "attachment".into()
    } else {
        trimmed.to_string()
    }
}

fn extension_for(mimetype: &str) -> &'static str {
    match mimetype {
        "application/pdf" => "pdf",
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        "text/plain" => "txt",
        _ => "bin",
    }
}
