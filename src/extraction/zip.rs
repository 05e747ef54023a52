use crate::error::{Error, ExtractionError, Result};
use crate::types::{Phase, ProgressSink, ProgressState};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Copy buffer for entry data; progress is reported once per buffer
const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Archive extractor for ZIP files
///
/// The central directory gives every entry's uncompressed size up front, so progress
/// is byte-accurate.
pub struct ZipExtractor;

impl ZipExtractor {
    fn failed(archive_path: &Path, reason: String) -> Error {
        Error::Extraction(ExtractionError::Failed {
            archive: archive_path.to_path_buf(),
            reason,
        })
    }

    /// Sum of uncompressed entry sizes
    fn total_size(archive: &mut zip::ZipArchive<std::fs::File>, archive_path: &Path) -> Result<u64> {
        let mut total = 0u64;
        for i in 0..archive.len() {
            let entry = archive
                .by_index_raw(i)
                .map_err(|e| Self::failed(archive_path, format!("failed to read ZIP entry: {}", e)))?;
            total = total.saturating_add(entry.size());
        }
        Ok(total)
    }

    /// Extract every entry of `archive_path` into `dest_path`
    ///
    /// Blocking; run it on the blocking pool. Entries whose names escape `dest_path`
    /// are skipped. Cancellation is checked before each entry.
    ///
    /// # Returns
    ///
    /// Paths of the files written (directories are not listed)
    pub fn extract(
        archive_path: &Path,
        dest_path: &Path,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<Vec<PathBuf>> {
        debug!(?archive_path, ?dest_path, "attempting ZIP extraction");

        let file = std::fs::File::open(archive_path)?;
        let mut archive = zip::ZipArchive::new(file)
            .map_err(|e| Self::failed(archive_path, format!("failed to read ZIP archive: {}", e)))?;

        let total = Self::total_size(&mut archive, archive_path)?;
        let mut done = 0u64;
        sink.report(ProgressState::new(Phase::Extracting, 0, total));

        let mut extracted_files = Vec::new();
        let mut buffer = vec![0u8; COPY_BUFFER_SIZE];

        for i in 0..archive.len() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let mut entry = archive
                .by_index(i)
                .map_err(|e| Self::failed(archive_path, format!("failed to read ZIP entry: {}", e)))?;

            let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
                warn!(?archive_path, entry = entry.name(), "skipping entry with unsafe path");
                done = done.saturating_add(entry.size());
                sink.report(ProgressState::new(Phase::Extracting, done, total));
                continue;
            };
            let file_path = dest_path.join(relative);

            if entry.is_dir() {
                std::fs::create_dir_all(&file_path)?;
                continue;
            }

            if let Some(parent) = file_path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let mut outfile = std::io::BufWriter::new(std::fs::File::create(&file_path)?);
            loop {
                let n = entry.read(&mut buffer).map_err(|e| {
                    Self::failed(
                        archive_path,
                        format!("failed to extract {}: {}", file_path.display(), e),
                    )
                })?;
                if n == 0 {
                    break;
                }
                outfile.write_all(&buffer[..n])?;
                done = done.saturating_add(n as u64);
                sink.report(ProgressState::new(Phase::Extracting, done.min(total), total));
            }
            outfile.flush()?;

            extracted_files.push(file_path);
        }

        sink.report(ProgressState::new(Phase::Extracting, total, total));

        info!(
            ?archive_path,
            extracted_count = extracted_files.len(),
            "ZIP extraction successful"
        );

        Ok(extracted_files)
    }
}
