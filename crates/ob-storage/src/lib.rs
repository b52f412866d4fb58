//! Durable storage: the known-hosts stash and downloaded files.

use ob_core::ErrorKind;
use ob_core::OrbiterError;
use ob_core::OrbiterResult;
use ob_security::FingerprintAlgorithm;
use ob_security::TrustStore;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use tracing::debug;
use tracing::info;

const STASH_FILE_NAME: &str = "known_hosts";
const DEFAULT_DOWNLOAD_NAME: &str = "download";

/// Durable storage configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageConfig {
    /// Nothing is read from or written to disk.
    pub ephemeral_mode: bool,
}

/// Entry point for everything the client keeps on disk.
#[derive(Debug, Clone)]
pub struct StorageManager {
    pub config: StorageConfig,
    persistent_root: Option<PathBuf>,
    download_root: Option<PathBuf>,
}

impl StorageManager {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            persistent_root: None,
            download_root: None,
        }
    }

    pub fn with_persistent_root(mut self, root: PathBuf) -> Self {
        self.persistent_root = Some(root);
        self
    }

    pub fn with_download_root(mut self, root: PathBuf) -> Self {
        self.download_root = Some(root);
        self
    }

    pub fn stash_path(&self) -> OrbiterResult<PathBuf> {
        let root = self.persistent_root.as_ref().ok_or_else(|| {
            OrbiterError::new(
                ErrorKind::Storage,
                "storage.persistence_unconfigured",
                "persistent storage root is not configured",
            )
        })?;

        Ok(root.join(STASH_FILE_NAME))
    }

    /// Loads the stash; a missing file or ephemeral mode gives an empty store.
    pub fn load_trust_store(&self) -> OrbiterResult<TrustStore> {
        if self.config.ephemeral_mode {
            return Ok(TrustStore::new());
        }

        let path = self.stash_path()?;
        if !path.exists() {
            debug!(path = %path.display(), "no stash yet");
            return Ok(TrustStore::new());
        }

        let content = fs::read_to_string(&path).map_err(|error| {
            OrbiterError::new(
                ErrorKind::Storage,
                "storage.stash_read_failed",
                format!("failed to read stash `{}`: {error}", path.display()),
            )
        })?;

        let store = parse_stash(&content);
        info!(path = %path.display(), hosts = store.len(), "stash loaded");
        Ok(store)
    }

    /// Writes persistent records only, replacing the file atomically.
    pub fn save_trust_store(&self, store: &TrustStore) -> OrbiterResult<()> {
        if self.config.ephemeral_mode {
            debug!("ephemeral mode, stash not saved");
            return Ok(());
        }

        let path = self.stash_path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|error| {
                OrbiterError::new(
                    ErrorKind::Storage,
                    "storage.stash_dir_create_failed",
                    format!(
                        "failed to create stash directory `{}`: {error}",
                        parent.display()
                    ),
                )
            })?;
        }

        let staging = path.with_extension("tmp");
        fs::write(&staging, encode_stash(store)).map_err(|error| {
            OrbiterError::new(
                ErrorKind::Storage,
                "storage.stash_write_failed",
                format!("failed to write stash `{}`: {error}", staging.display()),
            )
        })?;

        fs::rename(&staging, &path).map_err(|error| {
            OrbiterError::new(
                ErrorKind::Storage,
                "storage.stash_write_failed",
                format!("failed to replace stash `{}`: {error}", path.display()),
            )
        })?;

        info!(path = %path.display(), "stash saved");
        Ok(())
    }

    /// Writes `body` under the download directory and returns its path.
    ///
    /// The name comes from the last segment of `url_path`; an existing file
    /// is never overwritten.
    pub fn save_download(&self, url_path: &str, body: &[u8]) -> OrbiterResult<PathBuf> {
        let root = self.download_root.as_ref().ok_or_else(|| {
            OrbiterError::new(
                ErrorKind::DownloadIo,
                "storage.download_unconfigured",
                "download directory is not configured",
            )
        })?;

        fs::create_dir_all(root).map_err(|error| download_error(root, &error))?;

        let path = unique_path(root, &download_file_name(url_path));
        fs::write(&path, body).map_err(|error| download_error(&path, &error))?;
        info!(path = %path.display(), bytes = body.len(), "download saved");
        Ok(path)
    }
}

/// `<data_dir>/orbiter`, or `./orbiter` when the platform has no data dir.
pub fn default_data_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("orbiter")
}

/// The user's download directory, falling back to the home directory.
pub fn default_download_root() -> PathBuf {
    dirs::download_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Parses stash lines `<host> <algorithm> <fingerprint> <expiry>`.
///
/// Lines of any other shape are skipped. Loaded records are persistent.
pub fn parse_stash(content: &str) -> TrustStore {
    let mut store = TrustStore::new();

    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match parse_stash_line(line) {
            Some((host, algorithm, fingerprint, expiry)) => {
                store.trust(host, algorithm, fingerprint, expiry, true);
            }
            None => debug!(line = index + 1, "skipping malformed stash line"),
        }
    }

    store
}

pub fn encode_stash(store: &TrustStore) -> String {
    let mut encoded = String::new();
    for (host, record) in store.persistent_records() {
        encoded.push_str(&format!(
            "{host} {} {} {}\n",
            record.algorithm.as_str(),
            record.fingerprint,
            record.expiry
        ));
    }
    encoded
}

fn parse_stash_line(line: &str) -> Option<(&str, FingerprintAlgorithm, &str, i64)> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let [host, algorithm, fingerprint, expiry] = fields.as_slice() else {
        return None;
    };

    let algorithm = FingerprintAlgorithm::from_id(algorithm)?;
    if fingerprint.is_empty() || !fingerprint.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return None;
    }
    if !expiry.chars().all(|ch| ch.is_ascii_digit()) {
        return None;
    }
    let expiry = expiry.parse::<i64>().ok()?;

    Some((*host, algorithm, *fingerprint, expiry))
}

/// File name for a download, from the last non-empty path segment.
pub fn download_file_name(url_path: &str) -> String {
    let segment = url_path
        .rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or_default();

    let mut out = String::new();
    for ch in segment.chars() {
        if ch.is_control() || matches!(ch, '/' | '\\' | ':') {
            out.push('_');
        } else {
            out.push(ch);
        }
    }

    if out.is_empty() || out == "." || out == ".." {
        DEFAULT_DOWNLOAD_NAME.to_owned()
    } else {
        out
    }
}

fn unique_path(root: &Path, name: &str) -> PathBuf {
    let candidate = root.join(name);
    if !candidate.exists() {
        return candidate;
    }

    let (stem, extension) = match name.rsplit_once('.') {
        Some((stem, extension)) if !stem.is_empty() => (stem, Some(extension)),
        _ => (name, None),
    };

    let mut counter = 1_u32;
    loop {
        let numbered = match extension {
            Some(extension) => format!("{stem}-{counter}.{extension}"),
            None => format!("{stem}-{counter}"),
        };
        let candidate = root.join(numbered);
        if !candidate.exists() {
            return candidate;
        }
        counter = counter.saturating_add(1);
    }
}

fn download_error(path: &Path, error: &std::io::Error) -> OrbiterError {
    OrbiterError::new(
        ErrorKind::DownloadIo,
        "storage.download_write_failed",
        format!("Failed to download file to {}: {error}", path.display()),
    )
}
