//! Archive extraction
//!
//! Unpacks a downloaded ZIP or RAR into the platform folder, then tidies the result:
//! file modes are normalized and platform rename rules are applied. The archive is
//! deleted afterwards whether extraction succeeded or not.

mod rar;
mod zip;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use rar::RarExtractor;
pub use zip::ZipExtractor;

use crate::config::ExtractionConfig;
use crate::error::{Error, ExtractionError, Result};
use crate::types::{ArchiveType, ExtractionReport, ProgressSink};
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::task::spawn_blocking;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Detect archive type by file extension
///
/// Only `.zip` and `.rar` are recognized.
pub fn detect_archive_type(path: &Path) -> Option<ArchiveType> {
    let ext = path.extension()?.to_str()?.to_lowercase();

    match ext.as_str() {
        "rar" => Some(ArchiveType::Rar),
        "zip" => Some(ArchiveType::Zip),
        _ => None,
    }
}

/// Check if a file is an archive we can extract
pub fn is_archive(path: &Path) -> bool {
    detect_archive_type(path).is_some()
}

/// Extract `archive_path` into `dest_path`, then delete the archive
///
/// Progress goes to `sink` in the `Extracting` phase. On success, extracted files get
/// mode `0o644` and directories `0o755` (unix, when enabled in `config`), and the
/// platform rename rule for `dest_path`'s folder name is applied.
///
/// # Errors
///
/// [`ExtractionError::Unsupported`] for unknown extensions, other
/// [`ExtractionError`] variants for unpack failures, [`Error::Cancelled`] when
/// `cancel` trips between entries. The archive is gone in every case.
pub async fn extract_archive(
    archive_path: &Path,
    dest_path: &Path,
    sink: Arc<dyn ProgressSink>,
    cancel: &CancellationToken,
    config: &ExtractionConfig,
) -> Result<ExtractionReport> {
    let result = extract_and_tidy(archive_path, dest_path, sink, cancel, config).await;

    match tokio::fs::remove_file(archive_path).await {
        Ok(()) => debug!(?archive_path, "archive deleted"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(?archive_path, error = %e, "failed to delete archive"),
    }

    if let Err(e) = &result {
        warn!(?archive_path, error = %e, "extraction failed");
    }

    result
}

async fn extract_and_tidy(
    archive_path: &Path,
    dest_path: &Path,
    sink: Arc<dyn ProgressSink>,
    cancel: &CancellationToken,
    config: &ExtractionConfig,
) -> Result<ExtractionReport> {
    let archive_type = detect_archive_type(archive_path).ok_or_else(|| {
        Error::Extraction(ExtractionError::Unsupported {
            archive: archive_path.to_path_buf(),
        })
    })?;

    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    tokio::fs::create_dir_all(dest_path).await?;

    info!(?archive_path, ?dest_path, ?archive_type, "extracting archive");

    let archive_owned = archive_path.to_path_buf();
    let dest_owned = dest_path.to_path_buf();
    let cancel_owned = cancel.clone();
    let mut files = spawn_blocking(move || match archive_type {
        ArchiveType::Zip => {
            ZipExtractor::extract(&archive_owned, &dest_owned, sink.as_ref(), &cancel_owned)
        }
        ArchiveType::Rar => {
            RarExtractor::extract(&archive_owned, &dest_owned, sink.as_ref(), &cancel_owned)
        }
    })
    .await
    .map_err(|e| {
        Error::Extraction(ExtractionError::Failed {
            archive: archive_path.to_path_buf(),
            reason: format!("extraction task panicked: {}", e),
        })
    })??;

    let roots = top_level_entries(dest_path, &files);

    if config.normalize_permissions {
        let dest_owned = dest_path.to_path_buf();
        let roots_owned = roots.clone();
        spawn_blocking(move || {
            for root in &roots_owned {
                normalize_permissions(&dest_owned.join(root));
            }
        })
        .await
        .map_err(|e| Error::Other(format!("permission task panicked: {}", e)))?;
    }

    let renamed = match rename_suffix(dest_path, config) {
        Some(suffix) => apply_rename_rule(dest_path, &roots, suffix, &mut files).await?,
        None => None,
    };

    Ok(ExtractionReport { files, renamed })
}

/// First path component (relative to `dest_path`) of every extracted file
fn top_level_entries(dest_path: &Path, files: &[PathBuf]) -> BTreeSet<OsString> {
    files
        .iter()
        .filter_map(|f| f.strip_prefix(dest_path).ok())
        .filter_map(|rel| match rel.components().next() {
            Some(Component::Normal(first)) => Some(first.to_os_string()),
            _ => None,
        })
        .collect()
}

/// Suffix configured for the platform folder `dest_path` points at
fn rename_suffix<'a>(dest_path: &Path, config: &'a ExtractionConfig) -> Option<&'a str> {
    let folder = dest_path.file_name()?.to_str()?;
    config
        .rename_rules
        .get(folder)
        .or_else(|| config.rename_rules.get(&folder.to_lowercase()))
        .map(String::as_str)
        .filter(|s| !s.is_empty())
}

/// Append `suffix` to the single top-level directory the extraction produced
///
/// Zero or several top-level directories leave the tree untouched. Loose top-level
/// files next to the directory do not count.
async fn apply_rename_rule(
    dest_path: &Path,
    roots: &BTreeSet<OsString>,
    suffix: &str,
    files: &mut [PathBuf],
) -> Result<Option<(PathBuf, PathBuf)>> {
    let dirs: Vec<&OsString> = roots
        .iter()
        .filter(|r| dest_path.join(r).is_dir())
        .collect();

    if dirs.len() != 1 {
        info!(
            ?dest_path,
            top_level_dirs = dirs.len(),
            "rename rule not applied: extraction did not produce exactly one top-level directory"
        );
        return Ok(None);
    }

    let old = dest_path.join(dirs[0]);
    let old_name = dirs[0].to_string_lossy();
    if old_name.ends_with(suffix) {
        return Ok(None);
    }

    let new = dest_path.join(format!("{}{}", old_name, suffix));
    if tokio::fs::try_exists(&new).await.unwrap_or(false) {
        warn!(?old, ?new, "rename target already exists, keeping extracted name");
        return Ok(None);
    }

    tokio::fs::rename(&old, &new).await?;
    for file in files.iter_mut() {
        if let Ok(rest) = file.strip_prefix(&old) {
            *file = new.join(rest);
        }
    }

    info!(?old, ?new, "applied platform rename rule");
    Ok(Some((old, new)))
}

/// Files become `0o644`, directories `0o755`
///
/// Failures are logged and skipped; a file we cannot chmod is still usable.
#[cfg(unix)]
fn normalize_permissions(root: &Path) {
    use std::os::unix::fs::PermissionsExt;

    for entry in walkdir::WalkDir::new(root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(?root, error = %e, "cannot walk extracted tree");
                continue;
            }
        };
        let mode = if entry.file_type().is_dir() { 0o755 } else { 0o644 };
        if let Err(e) =
            std::fs::set_permissions(entry.path(), std::fs::Permissions::from_mode(mode))
        {
            warn!(path = ?entry.path(), error = %e, "failed to set permissions");
        }
    }
}

#[cfg(not(unix))]
fn normalize_permissions(_root: &Path) {}
