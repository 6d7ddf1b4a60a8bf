//! Session file handling. The session's actual contents — credentials,
//! 2FA state, reconnection data — belong to the wire client and are out
//! of scope here. Only the permission check and atomic-write helper are
//! implemented, reusing the progress-file writer's `.tmp` + rename
//! convention.

use std::path::Path;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use crate::error::ProgressError;
use crate::progress_store::tmp_path_for;

const REQUIRED_MODE: u32 = 0o600;

/// Atomically writes `contents` to `path`, setting its permissions to
/// 0600 before the rename so the file is never briefly world-readable.
pub fn write_session(path: &Path, contents: &str) -> Result<(), ProgressError> {
    let tmp_path = tmp_path_for(path);
    std::fs::write(&tmp_path, contents).map_err(|e| ProgressError::WriteFailed(e.to_string()))?;

    #[cfg(unix)]
    {
        if let Err(e) = std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(REQUIRED_MODE)) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(ProgressError::WriteFailed(e.to_string()));
        }
    }

    if let Err(e) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(ProgressError::WriteFailed(e.to_string()));
    }

    Ok(())
}

/// Warns (does not fail) if an existing session file's permissions are
/// looser than 0600. A missing file is not a violation — nothing has been
/// written yet.
pub fn check_permissions(path: &Path) -> Result<(), ProgressError> {
    let meta = match std::fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(ProgressError::FileCorrupted(e.to_string())),
    };

    #[cfg(unix)]
    {
        let mode = meta.permissions().mode() & 0o777;
        if mode != REQUIRED_MODE {
            tracing::warn!(
                path = %path.display(),
                mode = format!("{mode:o}"),
                "session file permissions should be 0600"
            );
        }
    }
    #[cfg(not(unix))]
    {
        let _ = meta;
    }

    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn write_session_sets_0600() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.txt");
        write_session(&path, "opaque-session-blob").unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "opaque-session-blob");
    }

    #[test]
    fn check_permissions_is_ok_on_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no-such-session.txt");
        assert!(check_permissions(&path).is_ok());
    }

    #[test]
    fn check_permissions_warns_but_does_not_fail_on_loose_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.txt");
        std::fs::write(&path, "blob").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        assert!(check_permissions(&path).is_ok());
    }
}
