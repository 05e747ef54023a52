//! Utility functions for file naming, directory checks and disk space

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Characters rejected by FAT32/exFAT/NTFS, which is what most handheld SD cards use
const ILLEGAL_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Name of the probe file used to check that a directory accepts writes
const WRITE_PROBE: &str = ".rom-dl-write-test";

/// Turn a display name into a safe single path component
///
/// Path separators, characters illegal on common SD-card filesystems and control
/// characters become `_`. Leading/trailing whitespace and trailing dots are trimmed.
/// An empty result (or "." / "..") becomes `download`.
///
/// # Examples
///
/// ```
/// use rom_dl::utils::sanitize_filename;
///
/// assert_eq!(sanitize_filename("Zelda: Link's Awakening"), "Zelda_ Link's Awakening");
/// assert_eq!(sanitize_filename("../../etc/passwd"), "_.._etc_passwd");
/// ```
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| {
            if ILLEGAL_CHARS.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    let trimmed = replaced.trim().trim_end_matches(['.', ' ']);
    let trimmed = trimmed.trim_start_matches("..");

    if trimmed.is_empty() || trimmed == "." {
        "download".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Extension of the last path segment of a URL, percent-decoded, without the dot
pub fn url_extension(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    let decoded = urlencoding::decode(last).ok()?;
    let ext = Path::new(decoded.as_ref()).extension()?.to_str()?;
    if ext.is_empty() || ext.len() > 8 {
        return None;
    }
    Some(ext.to_string())
}

/// On-disk filename for a download
///
/// Uses the sanitized display name. When the name has no extension, the extension of
/// the URL's last path segment is appended so the file keeps its real type.
pub fn target_filename(name: &str, url: &str) -> String {
    let base = sanitize_filename(name);
    if has_file_extension(&base) {
        return base;
    }
    match url_extension(url) {
        Some(ext) => format!("{}.{}", base, ext),
        None => base,
    }
}

/// Where a task streams `destination` before it is complete
///
/// `<file>.<task>.part`, next to the final file. The task id keeps two tasks for the
/// same game from touching each other's partial data.
pub fn partial_path(destination: &Path, task: impl std::fmt::Display) -> PathBuf {
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".to_string());
    destination.with_file_name(format!("{}.{}.part", name, task))
}

/// Whether `name` ends in something that looks like a file extension
///
/// "Mr. Driller" has no extension; "Mr. Driller.iso" does.
fn has_file_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| {
            !e.is_empty() && e.len() <= 8 && e.chars().all(|c| c.is_ascii_alphanumeric())
        })
}

/// Create `dir` if needed and verify it accepts new files
///
/// Writes and removes a small probe file. Fails with [`Error::NotWritable`] if the
/// directory cannot be created or written.
pub async fn ensure_writable_dir(dir: &Path) -> Result<()> {
    if let Err(e) = tokio::fs::create_dir_all(dir).await {
        tracing::warn!(?dir, error = %e, "Failed to create destination directory");
        return Err(Error::NotWritable {
            path: dir.to_path_buf(),
        });
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        // Directories made by other tools sometimes lack the owner write bit
        if let Ok(meta) = tokio::fs::metadata(dir).await {
            let mode = meta.permissions().mode();
            if mode & 0o700 != 0o700 {
                let perms = std::fs::Permissions::from_mode(mode | 0o700);
                tokio::fs::set_permissions(dir, perms).await.ok();
            }
        }
    }

    let probe = dir.join(WRITE_PROBE);
    match tokio::fs::write(&probe, b"").await {
        Ok(()) => {
            tokio::fs::remove_file(&probe).await.ok();
            Ok(())
        }
        Err(e) => {
            tracing::warn!(?dir, error = %e, "Destination directory is not writable");
            Err(Error::NotWritable {
                path: dir.to_path_buf(),
            })
        }
    }
}

/// Fail with [`Error::InsufficientSpace`] if `dir` has fewer than `required` bytes free
///
/// If free space cannot be determined, the check passes and a warning is logged.
pub fn check_disk_space(dir: &Path, required: u64) -> Result<()> {
    match get_available_space(dir) {
        Ok(available) if available < required => Err(Error::InsufficientSpace {
            required,
            available,
        }),
        Ok(_) => Ok(()),
        Err(e) => {
            tracing::warn!(?dir, error = %e, "Could not determine free disk space");
            Ok(())
        }
    }
}

/// Get available disk space for a given path
///
/// Uses platform-specific APIs to query filesystem statistics:
/// - Linux: statvfs
/// - macOS: statvfs
/// - Windows: GetDiskFreeSpaceExW
pub fn get_available_space(path: &Path) -> std::io::Result<u64> {
    #[cfg(unix)]
    {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        // SAFETY: c_path is a valid NUL-terminated string, stat is zero-initialized
        // and only read after statvfs reports success.
        unsafe {
            let mut stat: libc::statvfs = std::mem::zeroed();
            if libc::statvfs(c_path.as_ptr(), &mut stat) != 0 {
                return Err(std::io::Error::last_os_error());
            }

            // f_bavail: blocks available to unprivileged users
            #[allow(clippy::unnecessary_cast)]
            let available_bytes = (stat.f_bavail as u64).saturating_mul(stat.f_frsize as u64);
            Ok(available_bytes)
        }
    }

    #[cfg(windows)]
    {
        use std::os::windows::ffi::OsStrExt;
        use winapi::um::fileapi::GetDiskFreeSpaceExW;

        let wide_path: Vec<u16> = path
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        // SAFETY: wide_path is NUL-terminated and every out-pointer refers to a live u64.
        unsafe {
            let mut free_bytes_available: u64 = 0;
            let mut _total_bytes: u64 = 0;
            let mut _total_free_bytes: u64 = 0;

            if GetDiskFreeSpaceExW(
                wide_path.as_ptr(),
                &mut free_bytes_available as *mut u64 as *mut _,
                &mut _total_bytes as *mut u64 as *mut _,
                &mut _total_free_bytes as *mut u64 as *mut _,
            ) == 0
            {
                return Err(std::io::Error::last_os_error());
            }

            Ok(free_bytes_available)
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "Disk space checking is not supported on this platform",
        ))
    }
}
