//! Transient IO retry and atomic file writes.

use std::io::{self, Write};
use std::path::Path;

use st_core::BackoffPolicy;

use crate::StoreError;

/// Total attempts for a file operation, including the first.
pub(crate) const MAX_ATTEMPTS: u32 = 3;

/// Returns true for errors that a short wait may clear, such as a file
/// briefly held open by another process.
pub(crate) fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
            | io::ErrorKind::PermissionDenied
            | io::ErrorKind::ResourceBusy
    )
}

/// Runs `op`, retrying transient failures with jittered exponential backoff.
pub(crate) fn with_retry<T>(what: &str, mut op: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    let policy = BackoffPolicy::file_io();
    let mut attempt = 0;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if attempt + 1 < MAX_ATTEMPTS && is_transient(&err) => {
                let delay = policy.delay(attempt);
                tracing::debug!(
                    what,
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "retrying file operation"
                );
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

fn temp_in(dir: &Path) -> io::Result<tempfile::NamedTempFile> {
    tempfile::Builder::new()
        .prefix(".st-")
        .suffix(".tmp")
        .tempfile_in(dir)
}

fn parent_of(path: &Path) -> &Path {
    path.parent().unwrap_or_else(|| Path::new("."))
}

/// Replaces `path` with `bytes` via write-temp-then-rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    with_retry("write", || {
        let mut tmp = temp_in(parent_of(path))?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|err| err.error)?;
        Ok(())
    })
    .map_err(|err| StoreError::io(path, err))
}

/// Creates `path` with `bytes` via write-temp-then-rename, never replacing
/// an existing file.
pub(crate) fn write_new(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let result = with_retry("create", || {
        let mut tmp = temp_in(parent_of(path))?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist_noclobber(path).map_err(|err| err.error)?;
        Ok(())
    });

    match result {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
            Err(StoreError::Collision(path.display().to_string()))
        }
        Err(err) => Err(StoreError::io(path, err)),
    }
}
