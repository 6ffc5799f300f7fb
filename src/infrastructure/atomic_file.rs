use anyhow::{anyhow, Context, Result};
use log::warn;
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;
use tempfile::NamedTempFile;

/// How a failed replace of the target file is retried.
///
/// On Windows antivirus and indexers briefly hold handles on fresh files,
/// so the first replace can fail spuriously.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplaceRetry {
    /// Total tries, including the first. Zero is treated as one.
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for ReplaceRetry {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_millis(50),
        }
    }
}

/// Ensures the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)
                .context(format!("Failed to create directory: {:?}", parent))?;
        }
    }
    Ok(())
}

/// Serializes `value` as pretty JSON and atomically replaces `path` with it,
/// using the default [`ReplaceRetry`].
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    write_json_atomic_with(path, value, ReplaceRetry::default())
}

/// The document is written to a temp file in the same directory, synced,
/// then renamed over the target. A reader sees either the old or the new
/// document, never a partial one.
pub fn write_json_atomic_with<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
    retry: ReplaceRetry,
) -> Result<()> {
    ensure_parent_dir(path)?;

    // Same directory so the rename never crosses filesystems.
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let file = NamedTempFile::new_in(parent).context("Failed to create temp file")?;

    serde_json::to_writer_pretty(&file, value).context("Failed to serialize document")?;
    file.as_file().sync_all().context("Failed to sync temp file")?;

    let (temp_file, temp_path) = file.keep().context("Failed to keep temp file")?;
    drop(temp_file);

    replace_with_retry(&temp_path, path, retry).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        e
    })
}

fn replace_with_retry(src: &Path, dst: &Path, retry: ReplaceRetry) -> Result<()> {
    let attempts = retry.attempts.max(1);
    let mut attempt = 1;
    loop {
        match replace_file(src, dst) {
            Ok(()) => return Ok(()),
            Err(e) if attempt >= attempts => {
                return Err(anyhow!(
                    "Failed to replace {:?} after {} attempt(s): {:#}",
                    dst,
                    attempt,
                    e
                ));
            }
            Err(e) => {
                warn!("Replace of {:?} failed (attempt {}/{}): {:#}", dst, attempt, attempts, e);
                attempt += 1;
                thread::sleep(retry.delay);
            }
        }
    }
}

#[cfg(target_os = "windows")]
fn replace_file(src: &Path, dst: &Path) -> Result<()> {
    use std::os::windows::ffi::OsStrExt;
    use windows::core::PCWSTR;
    use windows::Win32::Storage::FileSystem::{
        MoveFileExW, MOVEFILE_REPLACE_EXISTING, MOVEFILE_WRITE_THROUGH,
    };

    let wide = |p: &Path| -> Vec<u16> {
        p.as_os_str().encode_wide().chain(std::iter::once(0)).collect()
    };
    let (src_wide, dst_wide) = (wide(src), wide(dst));

    let result = unsafe {
        MoveFileExW(
            PCWSTR(src_wide.as_ptr()),
            PCWSTR(dst_wide.as_ptr()),
            MOVEFILE_REPLACE_EXISTING | MOVEFILE_WRITE_THROUGH,
        )
    };
    result.context("MoveFileExW failed")
}

#[cfg(not(target_os = "windows"))]
fn replace_file(src: &Path, dst: &Path) -> Result<()> {
    fs::rename(src, dst).context("Failed to rename temp file")
}
