//! Write-then-rename file replacement.

use std::io;
use std::path::Path;

use tokio::fs;
use uuid::Uuid;

/// Replace the file at `path` with `data` via a sibling temp file.
///
/// Readers see either the old or the new content, never a partial write.
/// Existing permissions are carried over to the replacement.
pub async fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = parent.join(format!(".{name}.{}.tmp", Uuid::new_v4().simple()));

    let permissions = fs::metadata(path).await.ok().map(|m| m.permissions());

    let staged = async {
        fs::write(&tmp, data).await?;
        if let Some(permissions) = permissions {
            fs::set_permissions(&tmp, permissions).await?;
        }
        fs::rename(&tmp, path).await
    }
    .await;

    if let Err(e) = staged {
        let _ = fs::remove_file(&tmp).await;
        return Err(e);
    }
    Ok(())
}
