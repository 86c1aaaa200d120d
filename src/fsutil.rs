//! Output files only ever appear at their final path once complete, so an
//! existing file can be trusted when deciding to skip work.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::Result;

/// Sibling path used while a file is being written.
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}

pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let partial = partial_path(path);
    if let Err(e) = fs::write(&partial, contents).await {
        let _ = fs::remove_file(&partial).await;
        return Err(e.into());
    }
    fs::rename(&partial, path).await?;
    Ok(())
}

pub async fn exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}
