//! Handoff of signed permits to a packaging collaborator.
//!
//! Building a downloadable archive belongs to the caller. This crate only
//! defines the seam and ships a directory writer used by the CLI.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use crate::engine::SignedPermit;
use crate::error::PermitError;

/// Receives the signed permits of one run, keyed by user title.
#[async_trait]
pub trait PermitPackager: Send + Sync {
    /// Package the permits, returning one location per user.
    async fn package(&self, permits: &BTreeMap<String, SignedPermit>) -> Result<Vec<PathBuf>, PermitError>;
}

/// Writes `<root>/<title>/<permit file>` and `<root>/<title>/<signature file>`.
#[derive(Debug, Clone)]
pub struct DirectoryPackager {
    root: PathBuf,
    permit_filename: String,
    signature_filename: String,
}

impl DirectoryPackager {
    /// Create a packager writing under `root`.
    pub fn new(
        root: impl Into<PathBuf>,
        permit_filename: impl Into<String>,
        signature_filename: impl Into<String>,
    ) -> Self {
        Self {
            root: root.into(),
            permit_filename: permit_filename.into(),
            signature_filename: signature_filename.into(),
        }
    }

    /// Output root.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl PermitPackager for DirectoryPackager {
    #[instrument(skip_all, fields(root = %self.root.display(), permits = permits.len()))]
    async fn package(&self, permits: &BTreeMap<String, SignedPermit>) -> Result<Vec<PathBuf>, PermitError> {
        let mut written = Vec::with_capacity(permits.len());
        let mut used = HashSet::with_capacity(permits.len());
        for (title, permit) in permits {
            let name = unique_dir_name(&mut used, sanitize_title(title));
            let dir = self.root.join(&name);
            tokio::fs::create_dir_all(&dir).await.map_err(|e| io_error(&dir, e))?;

            let permit_path = dir.join(&self.permit_filename);
            tokio::fs::write(&permit_path, permit.xml.as_bytes())
                .await
                .map_err(|e| io_error(&permit_path, e))?;

            let signature_path = dir.join(&self.signature_filename);
            tokio::fs::write(&signature_path, permit.signature_xml.as_bytes())
                .await
                .map_err(|e| io_error(&signature_path, e))?;

            debug!(dir = %dir.display(), "Permit written");
            written.push(dir);
        }
        info!(count = written.len(), "Permits packaged");
        Ok(written)
    }
}

/// Directory-safe form of a user title.
///
/// Path separators, reserved characters and control characters become `_`;
/// a title that is empty or only dots becomes `_`.
#[must_use]
pub fn sanitize_title(title: &str) -> String {
    let cleaned: String = title
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    if cleaned.chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        cleaned
    }
}

/// Claims `name` in `used`, suffixing ` (n)` when another title already
/// sanitized to the same directory.
fn unique_dir_name(used: &mut HashSet<String>, name: String) -> String {
    if used.insert(name.clone()) {
        return name;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{name} ({n})");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

fn io_error(path: &Path, e: std::io::Error) -> PermitError {
    PermitError::Packaging {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}
