//! Utility functions for parity file housekeeping

use crate::error::Result;
use crate::resolver::{is_par2_file, par2_set_key};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Find the files of an existing parity set named `archive_name` in `dir`
///
/// Matches the main file and its volumes (`<archive>.par2`,
/// `<archive>.volNN+MM.par2`). The archive name is compared
/// case-insensitively, since par2 sets are often moved between file systems
/// with different case rules. The result is sorted.
///
/// # Errors
///
/// Returns an error if `dir` cannot be read.
///
/// # Examples
///
/// ```no_run
/// use par2guard::utils::existing_par2_files;
/// use std::path::Path;
///
/// let existing = existing_par2_files(Path::new("/music/Album"), "Album").unwrap();
/// if !existing.is_empty() {
///     println!("{} parity files would be overwritten", existing.len());
/// }
/// ```
pub fn existing_par2_files(dir: &Path, archive_name: &str) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type()?.is_file() || !is_par2_file(&path) {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if par2_set_key(&name).eq_ignore_ascii_case(archive_name) {
            found.push(path);
        }
    }
    found.sort();
    debug!(dir = ?dir, archive_name, count = found.len(), "scanned for existing parity files");
    Ok(found)
}

/// Delete parity files, returning how many were removed
///
/// Files that are already gone are not an error.
///
/// # Errors
///
/// Returns the first I/O error other than "not found".
pub fn remove_par2_files(paths: &[PathBuf]) -> Result<usize> {
    let mut removed = 0;
    for path in paths {
        match std::fs::remove_file(path) {
            Ok(()) => {
                removed += 1;
                info!(path = ?path, "removed existing parity file");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(removed)
}
