use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::constants::layout::PARTIAL_EXTENSION;
use crate::errors::TraceError;

/// Write `path` through a sibling `.part` file that is renamed on success.
///
/// On failure the partial file is removed and `path` is left untouched.
pub fn write_atomically<F>(path: &Path, write: F) -> Result<(), TraceError>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<(), TraceError>,
{
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let partial = partial_path(path);
    let result = File::create(&partial)
        .map_err(TraceError::from)
        .and_then(|file| {
            let mut writer = BufWriter::new(file);
            write(&mut writer)?;
            writer.flush()?;
            Ok(())
        })
        .and_then(|()| fs::rename(&partial, path).map_err(TraceError::from));
    if result.is_err() {
        let _ = fs::remove_file(&partial);
    }
    result
}

/// `<path>.part`, keeping the original extension visible.
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(PARTIAL_EXTENSION);
    PathBuf::from(name)
}

/// Files directly under `dir` whose extension matches `extension`
/// (case-insensitive) and whose name starts with `prefix`, sorted by path.
/// A missing directory yields an empty list.
pub fn list_files(dir: &Path, prefix: &str, extension: &str) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| has_extension(path, extension))
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.starts_with(prefix))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();
    paths
}

/// True if the path has the given extension (case-insensitive).
pub fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(extension))
        .unwrap_or(false)
}
