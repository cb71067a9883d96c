use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::diagnostics::LexmacError;
use crate::engine::InputOutput;

/// File extensions picked up when a directory is given as input.
pub const SOURCE_EXTENSIONS: &[&str] = &["lm", "lexmac"];

// =====================
// Public API - File Discovery
// =====================

/// Expands `paths` into a list of source files.
///
/// Files are taken as given, whatever their extension. Directories are walked
/// recursively for files with one of [`SOURCE_EXTENSIONS`]; each directory's
/// files are sorted so the order is deterministic.
pub fn discover_sources<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<PathBuf>, LexmacError> {
    let mut files = Vec::new();
    for path in paths {
        let path = path.as_ref();
        if path.is_file() {
            files.push(path.to_path_buf());
            continue;
        }
        if !path.is_dir() {
            return Err(LexmacError::io(
                path.display(),
                std::io::Error::new(std::io::ErrorKind::NotFound, "no such file or directory"),
            ));
        }
        files.extend(discover_in_dir(path)?);
    }
    Ok(files)
}

/// Recursively scans a directory for source files.
pub fn discover_in_dir<P: AsRef<Path>>(root: P) -> Result<Vec<PathBuf>, LexmacError> {
    let root = root.as_ref();
    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).display().to_string();
            LexmacError::io(path, std::io::Error::other(e.to_string()))
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if !is_source_file(path) {
            continue;
        }

        files.push(path.to_path_buf());
    }
    files.sort();
    Ok(files)
}

// =====================
// Public API - Loading
// =====================

/// Reads every file into an input for the processor. The output tag is the
/// file's path.
pub fn load_inputs(files: &[PathBuf]) -> Result<Vec<InputOutput>, LexmacError> {
    files
        .iter()
        .map(|path| {
            let text = std::fs::read_to_string(path).map_err(|e| LexmacError::io(path.display(), e))?;
            let name = path.display().to_string();
            Ok(InputOutput::from_text(name.clone(), text).with_output_tag(name))
        })
        .collect()
}

fn is_source_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext))
}
