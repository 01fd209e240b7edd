use std::fs;
use std::io;
use std::path::Path;

use zip::ZipArchive;

use crate::error::PrepError;

fn archive_error(zip_path: &Path, message: impl Into<String>) -> PrepError {
    PrepError::Archive {
        path: zip_path.to_path_buf(),
        message: message.into(),
    }
}

/// Unpacks `zip_path` into `target_dir`. Returns the number of files written.
pub fn extract_zip(zip_path: &Path, target_dir: &Path) -> Result<usize, PrepError> {
    let file = fs::File::open(zip_path).map_err(|err| archive_error(zip_path, err.to_string()))?;
    let mut archive =
        ZipArchive::new(file).map_err(|err| archive_error(zip_path, err.to_string()))?;

    let mut written = 0;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| archive_error(zip_path, err.to_string()))?;
        let entry_path = match entry.enclosed_name() {
            Some(path) => target_dir.join(path),
            None => {
                return Err(archive_error(zip_path, "zip entry path traversal detected"));
            }
        };

        if entry.is_dir() {
            fs::create_dir_all(&entry_path)
                .map_err(|err| PrepError::Filesystem(err.to_string()))?;
            continue;
        }

        if let Some(parent) = entry_path.parent() {
            fs::create_dir_all(parent).map_err(|err| PrepError::Filesystem(err.to_string()))?;
        }
        let mut outfile =
            fs::File::create(&entry_path).map_err(|err| PrepError::Filesystem(err.to_string()))?;
        io::copy(&mut entry, &mut outfile)
            .map_err(|err| archive_error(zip_path, format!("entry {}: {err}", entry.name())))?;
        written += 1;
    }
    Ok(written)
}

/// Rename, falling back to copy and delete when source and target sit on
/// different filesystems. An existing target is replaced.
pub fn move_file(source: &Path, target: &Path) -> Result<(), PrepError> {
    if fs::rename(source, target).is_ok() {
        return Ok(());
    }
    fs::copy(source, target).map_err(|err| {
        PrepError::Filesystem(format!(
            "move {} -> {}: {err}",
            source.display(),
            target.display()
        ))
    })?;
    fs::remove_file(source).map_err(|err| PrepError::Filesystem(err.to_string()))?;
    Ok(())
}
