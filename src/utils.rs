//! Utility functions for file operations and path manipulation

use crate::error::{Error, Result};
use rand::Rng;
use rand::distributions::Alphanumeric;
use std::path::{Path, PathBuf};

/// Prefix shared by every transient download file
pub const TRANSIENT_PREFIX: &str = "fdl-part-";

/// Extension used for files still being written
pub const PARTIAL_EXTENSION: &str = "partial";

/// Maximum number of rename attempts when resolving file collisions
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Build a randomized transient file name
///
/// Names share [`TRANSIENT_PREFIX`] so the cleanup pass can find leftovers,
/// and carry a random suffix so sequential attempts never collide.
///
/// # Examples
///
/// ```
/// use filler_dl::utils::{transient_file_name, TRANSIENT_PREFIX};
///
/// let name = transient_file_name("pexels", "mp4");
/// assert!(name.starts_with(TRANSIENT_PREFIX));
/// assert!(name.ends_with(".mp4"));
/// ```
pub fn transient_file_name(tag: &str, extension: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect();
    format!("{TRANSIENT_PREFIX}{tag}-{suffix}.{extension}")
}

/// Path a download is streamed to before it is moved into place
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(PARTIAL_EXTENSION);
    path.with_file_name(name)
}

/// Get a path that does not exist yet, adding ` (1)`, ` (2)`, ... before the extension
///
/// # Examples
///
/// ```
/// use filler_dl::utils::get_unique_path;
/// use std::path::Path;
///
/// let path = Path::new("/tmp/filler-dl-doc-nonexistent/artifact.mp4");
/// assert_eq!(get_unique_path(path).unwrap(), path);
/// ```
pub fn get_unique_path(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        return Ok(path.to_path_buf());
    }

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::Io(std::io::Error::other(format!(
            "cannot extract file stem from {}",
            path.display()
        ))))?;
    let extension = path.extension().and_then(|e| e.to_str());
    let parent = path.parent().unwrap_or_else(|| Path::new("."));

    for i in 1..=MAX_RENAME_ATTEMPTS {
        let new_name = match extension {
            Some(ext) => format!("{} ({}).{}", stem, i, ext),
            None => format!("{} ({})", stem, i),
        };
        let new_path = parent.join(new_name);
        if !new_path.exists() {
            return Ok(new_path);
        }
    }

    Err(Error::Io(std::io::Error::new(
        std::io::ErrorKind::AlreadyExists,
        format!("could not find unique filename for {}", path.display()),
    )))
}

/// Remove a file, logging instead of failing
///
/// Returns true when the file is gone afterwards (removed or already absent).
pub async fn remove_file_logged(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            tracing::debug!(?path, "deleted file");
            true
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(e) => {
            tracing::warn!(?path, error = %e, "failed to delete file");
            false
        }
    }
}

/// Size of a file on disk, or 0 when it is missing
pub async fn file_size_or_zero(path: &Path) -> u64 {
    tokio::fs::metadata(path)
        .await
        .map(|m| if m.is_file() { m.len() } else { 0 })
        .unwrap_or(0)
}

/// Get available disk space for a given path
///
/// # Arguments
///
/// * `path` - The path to check (typically the work directory)
///
/// # Returns
///
/// Returns the available disk space in bytes, or an IO error if the check fails.
pub fn get_available_space(path: &Path) -> std::io::Result<u64> {
    #[cfg(unix)]
    {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        // SAFETY: c_path is a valid null-terminated string, stat is zero-initialized,
        // and the struct is only read after statvfs reports success.
        unsafe {
            let mut stat: libc::statvfs = std::mem::zeroed();
            if libc::statvfs(c_path.as_ptr(), &mut stat) != 0 {
                return Err(std::io::Error::last_os_error());
            }

            // f_bavail is available blocks for unprivileged users
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

        // SAFETY: wide_path is null-terminated and all out-pointers reference live u64s.
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

/// Check that `path` has room for a session of `target_bytes`
///
/// Required space is `target_bytes * size_multiplier + min_free_space`.
pub fn check_disk_space(
    path: &Path,
    target_bytes: u64,
    config: &crate::config::DiskSpaceConfig,
) -> Result<()> {
    if !config.enabled {
        return Ok(());
    }

    let required = (target_bytes as f64 * config.size_multiplier) as u64;
    let required_with_buffer = required.saturating_add(config.min_free_space);

    let available = get_available_space(path).map_err(|e| {
        Error::DiskSpaceCheckFailed(format!(
            "Failed to check disk space for '{}': {}",
            path.display(),
            e
        ))
    })?;

    if available < required_with_buffer {
        return Err(Error::InsufficientSpace {
            required: required_with_buffer,
            available,
        });
    }

    Ok(())
}
