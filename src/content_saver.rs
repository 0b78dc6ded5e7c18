//! Content-addressed persistence of fetched artifacts.
//!
//! Every artifact lands under a type-specific root, sharded by source
//! domain and a digest prefix so no single directory grows without bound:
//!
//! ```text
//! <data_dir>/<kind>/<domain>/<hash[..2]>/<timestamp>_<hash><ext>
//! ```
//!
//! The 16-hex-char SHA-256 prefix in the filename is the dedup key: if the
//! shard directory already holds a file embedding the same hash, the write
//! is skipped. Save failures are logged and swallowed; losing one artifact
//! is an accepted risk, never a reason to fail the fetch path.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, error, info};

/// Closed set of artifact kinds, decided once at the fetch boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    Text,
    Image,
    Video,
    File,
    Screenshot,
}

impl ContentKind {
    /// Subdirectory under the data root for this kind.
    #[must_use]
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "images",
            Self::Video => "videos",
            Self::File => "files",
            Self::Screenshot => "screenshots",
        }
    }

    /// File extension, taking a hint from the source URL's path where the
    /// kind alone does not determine it.
    fn extension(self, url: &str) -> String {
        match self {
            Self::Text => ".txt".to_string(),
            Self::Screenshot => ".png".to_string(),
            Self::Image => url_extension(url, &[".jpg", ".jpeg", ".png", ".gif", ".bmp", ".webp"])
                .unwrap_or_else(|| ".jpg".to_string()),
            Self::Video | Self::File => {
                url_extension(url, &[]).unwrap_or_else(|| ".bin".to_string())
            }
        }
    }

    const ALL: [Self; 5] = [
        Self::Text,
        Self::Image,
        Self::Video,
        Self::File,
        Self::Screenshot,
    ];
}

/// Pull an extension out of a URL path. With a non-empty allowlist, only
/// listed extensions are accepted.
fn url_extension(url: &str, allowed: &[&str]) -> Option<String> {
    let path = url::Url::parse(url).ok()?.path().to_string();
    let name = path.rsplit('/').next()?;
    let dot = name.rfind('.')?;
    let ext = name[dot..].to_ascii_lowercase();
    if ext.len() < 2 || ext.len() > 8 {
        return None;
    }
    if !allowed.is_empty() && !allowed.contains(&ext.as_str()) {
        return None;
    }
    Some(ext)
}

/// Writes artifacts into the content-addressed layout.
pub struct ContentSaver {
    data_dir: PathBuf,
}

impl ContentSaver {
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Create every type-specific root directory up front.
    pub async fn ensure_dirs(&self) -> anyhow::Result<()> {
        for kind in ContentKind::ALL {
            tokio::fs::create_dir_all(self.data_dir.join(kind.dir_name())).await?;
        }
        Ok(())
    }

    /// Persist `bytes` for `url`. Infallible from the caller's view: all
    /// errors are logged here and swallowed.
    pub async fn save(&self, url: &str, kind: ContentKind, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        if let Err(e) = self.save_inner(url, kind, bytes).await {
            error!("Failed to save {kind:?} content for {url}: {e:#}");
        }
    }

    async fn save_inner(&self, url: &str, kind: ContentKind, bytes: &[u8]) -> anyhow::Result<()> {
        let digest = Sha256::digest(bytes);
        let hash = &hex::encode(digest)[..16];

        let domain = crate::urlnorm::domain_of(url).unwrap_or_else(|| "unknown".to_string());
        let shard_dir = self
            .data_dir
            .join(kind.dir_name())
            .join(&domain)
            .join(&hash[..2]);
        tokio::fs::create_dir_all(&shard_dir).await?;

        if Self::hash_already_present(&shard_dir, hash).await? {
            debug!("Content already saved, skipping: {url} ({hash})");
            return Ok(());
        }

        let timestamp = chrono::Utc::now().format("%Y%m%d%H%M%S");
        let filename = format!("{timestamp}_{hash}{}", kind.extension(url));
        let path = shard_dir.join(filename);

        tokio::fs::write(&path, bytes).await?;
        info!("[{}] Saved {} -> {}", kind.dir_name(), url, path.display());
        Ok(())
    }

    /// Dedup check: does any file in the shard directory embed this hash?
    /// Filenames carry a timestamp, so the check scans names rather than
    /// recomputing an exact path.
    async fn hash_already_present(shard_dir: &Path, hash: &str) -> anyhow::Result<bool> {
        let mut entries = tokio::fs::read_dir(shard_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_name().to_string_lossy().contains(hash) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
