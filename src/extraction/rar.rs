use crate::error::{Error, ExtractionError, Result};
use crate::types::{Phase, ProgressSink, ProgressState};
use std::path::{Component, Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A file member found by the listing pass
#[derive(Debug, Clone)]
struct Member {
    path: PathBuf,
    size: u64,
}

/// Snapshot after `done` of `count` members: `total * done / count` bytes
fn file_count_progress(total: u64, done: u64, count: u64) -> ProgressState {
    let approx = if count == 0 {
        0
    } else {
        (total as u128 * done.min(count) as u128 / count as u128) as u64
    };
    ProgressState::new(Phase::Extracting, approx, total)
}

/// Archive extractor for RAR files
///
/// Runs two passes over the archive: a listing pass that collects members and sizes,
/// then an extraction pass. unrar reports no byte progress, so progress advances by
/// member count (`total * done / count`). This is an approximation and can
/// misreport when a large member sits next to many small ones.
pub struct RarExtractor;

impl RarExtractor {
    fn convert_unrar_error(e: unrar::error::UnrarError, archive_path: &Path) -> Error {
        Error::Extraction(ExtractionError::Failed {
            archive: archive_path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Keep only normal components so "../../x" cannot escape the destination
    fn sanitize(name: &Path) -> PathBuf {
        name.components()
            .filter(|c| matches!(c, Component::Normal(_)))
            .collect()
    }

    /// File members of the archive with their unpacked sizes
    fn list_members(archive_path: &Path) -> Result<Vec<Member>> {
        let listing = unrar::Archive::new(archive_path)
            .open_for_listing()
            .map_err(|e| Self::convert_unrar_error(e, archive_path))?;

        let mut members = Vec::new();
        for header in listing {
            let header = header.map_err(|e| Self::convert_unrar_error(e, archive_path))?;
            if header.is_directory() {
                continue;
            }
            let path = Self::sanitize(Path::new(&header.filename));
            if path.as_os_str().is_empty() {
                continue;
            }
            #[allow(clippy::unnecessary_cast)]
            let size = header.unpacked_size as u64;
            members.push(Member { path, size });
        }

        Ok(members)
    }

    /// Extract every file member of `archive_path` into `dest_path`
    ///
    /// Blocking; run it on the blocking pool. Fails with
    /// [`ExtractionError::EmptyListing`] when the listing pass finds no file, and with
    /// [`ExtractionError::MissingMember`] when a listed member is absent on disk after
    /// it was extracted.
    pub fn extract(
        archive_path: &Path,
        dest_path: &Path,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<Vec<PathBuf>> {
        debug!(?archive_path, ?dest_path, "attempting RAR extraction");

        let members = Self::list_members(archive_path)?;
        if members.is_empty() {
            return Err(Error::Extraction(ExtractionError::EmptyListing {
                archive: archive_path.to_path_buf(),
            }));
        }

        let count = members.len() as u64;
        let total: u64 = members.iter().map(|m| m.size).sum();
        let mut done = 0u64;
        sink.report(ProgressState::new(Phase::Extracting, 0, total));

        let processor = unrar::Archive::new(archive_path)
            .open_for_processing()
            .map_err(|e| Self::convert_unrar_error(e, archive_path))?;

        let mut extracted_files = Vec::new();
        let mut at_header = processor;
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let at_file = match at_header.read_header() {
                Ok(Some(entry_processor)) => entry_processor,
                Ok(None) => break,
                Err(e) => return Err(Self::convert_unrar_error(e, archive_path)),
            };

            let header = at_file.entry();
            let sanitized = Self::sanitize(Path::new(&header.filename));

            if header.is_directory() || sanitized.as_os_str().is_empty() {
                if sanitized.as_os_str().is_empty() {
                    warn!(?archive_path, "skipping entry with unsafe path");
                }
                at_header = at_file
                    .skip()
                    .map_err(|e| Self::convert_unrar_error(e, archive_path))?;
                continue;
            }

            let file_path = dest_path.join(&sanitized);
            if let Some(parent) = file_path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            at_header = at_file
                .extract_to(&file_path)
                .map_err(|e| Self::convert_unrar_error(e, archive_path))?;

            if !file_path.exists() {
                return Err(Error::Extraction(ExtractionError::MissingMember {
                    archive: archive_path.to_path_buf(),
                    member: sanitized.display().to_string(),
                }));
            }

            done += 1;
            sink.report(file_count_progress(total, done, count));
            extracted_files.push(file_path);
        }

        // Listed members the processing pass never produced
        if let Some(missing) = members
            .iter()
            .find(|m| !dest_path.join(&m.path).exists())
        {
            return Err(Error::Extraction(ExtractionError::MissingMember {
                archive: archive_path.to_path_buf(),
                member: missing.path.display().to_string(),
            }));
        }

        info!(
            ?archive_path,
            extracted_count = extracted_files.len(),
            "RAR extraction successful"
        );

        Ok(extracted_files)
    }
}
