use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use crtdesk_core::{DocumentSettings, DownloadSink};
use crtdesk_render::fetch_document_bytes;
use directories::UserDirs;
use tracing::{info, instrument};

/// Copies the printable document into a directory, the way a browser
/// download would.
#[derive(Debug, Clone)]
pub struct DirectoryDownload {
    source: String,
    directory: PathBuf,
    file_name: String,
}

impl DirectoryDownload {
    pub fn new(
        source: impl Into<String>,
        directory: impl Into<PathBuf>,
        file_name: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            directory: directory.into(),
            file_name: file_name.into(),
        }
    }

    /// Uses `directory` when given, otherwise the platform download folder.
    pub fn from_settings(settings: &DocumentSettings, directory: Option<PathBuf>) -> Result<Self> {
        let directory = match directory {
            Some(directory) => directory,
            None => UserDirs::new()
                .and_then(|dirs| dirs.download_dir().map(Path::to_path_buf))
                .ok_or_else(|| anyhow!("unable to resolve the download directory"))?,
        };
        Ok(Self::new(
            settings.download_url.clone(),
            directory,
            settings.download_name.clone(),
        ))
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// First free name of the form `name.ext`, `name (1).ext`, ...
    fn target_path(&self) -> PathBuf {
        let candidate = self.directory.join(&self.file_name);
        if !candidate.exists() {
            return candidate;
        }
        let name = Path::new(&self.file_name);
        let stem = name
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.file_name.clone());
        let extension = name
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        (1..)
            .map(|n| self.directory.join(format!("{stem} ({n}){extension}")))
            .find(|path| !path.exists())
            .unwrap_or(candidate)
    }
}

impl DownloadSink for DirectoryDownload {
    #[instrument(skip(self), fields(source = %self.source))]
    fn deliver(&self) -> Result<PathBuf> {
        let bytes = fetch_document_bytes(&self.source)?;
        fs::create_dir_all(&self.directory)
            .with_context(|| format!("failed to create {}", self.directory.display()))?;
        let target = self.target_path();
        fs::write(&target, &bytes)
            .with_context(|| format!("failed to write {}", target.display()))?;
        info!(path = %target.display(), bytes = bytes.len(), "document delivered");
        Ok(target)
    }
}
