// ============================================================
// UPLOAD STORAGE
// ============================================================
// Staging directory for accepted uploads, outside any served tree

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

/// Create the staging directory if needed and lock down its permissions.
pub fn ensure_upload_root(dir: &Path) -> std::io::Result<PathBuf> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;
    }

    Ok(dir.to_path_buf())
}

/// Collision-resistant name for a staged upload:
/// `csv_<user>_<timestamp>_<random>.csv`.
pub fn secure_filename(user_id: i64) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!(
        "csv_{}_{}_{}.csv",
        user_id,
        Utc::now().timestamp(),
        &random[..8]
    )
}

/// Move an accepted temp file into the staging directory and tighten its
/// permissions. Falls back to copy-and-remove when the temp file lives on
/// a different filesystem.
pub fn stage_upload(temp_path: &Path, upload_root: &Path, filename: &str) -> std::io::Result<PathBuf> {
    let target = upload_root.join(filename);

    if fs::rename(temp_path, &target).is_err() {
        fs::copy(temp_path, &target)?;
        let _ = fs::remove_file(temp_path);
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&target, fs::Permissions::from_mode(0o600))?;
    }

    debug!(target = %target.display(), "Upload staged");
    Ok(target)
}

/// Best-effort removal of a staged file.
pub fn remove_staged(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove staged file");
        } else {
            debug!(path = %path.display(), "Staged file cleaned up");
        }
    }
}
