use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Lists regular files in `dir` whose extension is one of `allowed`
/// (case-insensitive), sorted by file name.
pub fn list_files(dir: &Path, allowed: &[&str]) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && has_allowed_extension(path, allowed))
        .collect();

    // Sort alphabetically (works for padded numbers like frame_00001.jpg)
    files.sort();
    Ok(files)
}

pub fn has_allowed_extension(path: &Path, allowed: &[&str]) -> bool {
    let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
        return false;
    };

    let ext = ext.to_ascii_lowercase();
    allowed.iter().any(|allowed_ext| *allowed_ext == ext.as_str())
}

/// Deletes files in `dir` named `<prefix>*` with an allowed extension and
/// returns how many were removed. A missing directory counts as empty.
pub fn remove_files_with_prefix(dir: &Path, prefix: &str, allowed: &[&str]) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }
    let mut removed = 0;
    for path in list_files(dir, allowed)? {
        let matches = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with(prefix));
        if matches {
            fs::remove_file(&path).with_context(|| format!("Failed to remove {}", path.display()))?;
            removed += 1;
        }
    }
    Ok(removed)
}

pub fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create directory: {}", dir.display()))
}

/// Writes `contents` to a sibling temp file, then renames it over `path`.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, contents).with_context(|| format!("Failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move {} into place", path.display()))?;
    Ok(())
}
