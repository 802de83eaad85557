use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use globset::GlobMatcher;

use crate::error::{Error, Result};

/// A document file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    /// Path relative to the directory that was walked. For a single-file
    /// input this is just the file name.
    pub relative_path: PathBuf,
    pub absolute_path: PathBuf,
}

/// File extensions read as plain UTF-8 text.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["md", "txt"];

pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext))
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Find the documents under `root`.
///
/// A directory is walked recursively, skipping hidden entries and symlinked
/// directories, keeping `.md`/`.txt` files whose relative path matches
/// `filter` (when given). The result is sorted by relative path.
///
/// A file path yields itself, provided its extension is supported. A
/// missing path is [`Error::NotFound`].
pub fn discover_files(
    root: &Path,
    filter: Option<&GlobMatcher>,
) -> Result<Vec<DiscoveredFile>> {
    if !root.exists() {
        return Err(Error::NotFound {
            kind: "path",
            name: root.display().to_string(),
        });
    }

    let root = root.canonicalize()?;

    if root.is_file() {
        if !is_supported(&root) {
            return Err(Error::Config(format!(
                "unsupported file type: {} (expected one of: {})",
                root.display(),
                SUPPORTED_EXTENSIONS.join(", ")
            )));
        }
        let name = root.file_name().map(PathBuf::from).unwrap_or_default();
        return Ok(vec![DiscoveredFile {
            relative_path: name,
            absolute_path: root,
        }]);
    }

    let mut results = Vec::new();
    let mut pending = vec![root.clone()];

    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if is_hidden(&entry.file_name().to_string_lossy()) {
                continue;
            }

            let path = entry.path();
            let file_type = entry.file_type()?;

            if file_type.is_dir() {
                pending.push(path);
                continue;
            }

            // Follow file symlinks, never directory ones.
            let absolute_path = if file_type.is_symlink() {
                match path.canonicalize() {
                    Ok(resolved) if resolved.is_file() => resolved,
                    _ => continue,
                }
            } else if file_type.is_file() {
                path.clone()
            } else {
                continue;
            };

            if !is_supported(&path) {
                continue;
            }

            let relative_path = path
                .strip_prefix(&root)
                .unwrap_or(&path)
                .to_path_buf();

            if let Some(matcher) = filter
                && !matcher.is_match(&relative_path)
            {
                continue;
            }

            results.push(DiscoveredFile {
                relative_path,
                absolute_path,
            });
        }
    }

    results.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(results)
}

/// Run [`discover_files`] over several roots, keeping the first occurrence
/// of each file. Overlapping inputs such as `docs` and `docs/a.md` yield
/// `a.md` once.
pub fn discover_all<P: AsRef<Path>>(
    roots: &[P],
    filter: Option<&GlobMatcher>,
) -> Result<Vec<DiscoveredFile>> {
    let mut seen = HashSet::new();
    let mut results = Vec::new();
    for root in roots {
        for file in discover_files(root.as_ref(), filter)? {
            if seen.insert(file.absolute_path.clone()) {
                results.push(file);
            }
        }
    }
    Ok(results)
}
