use crate::error::{io_error, MillError};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Confines every caller-supplied path to a single canonical root directory.
/// Symlinks on both the root and the candidate are resolved before the
/// ancestry check, so OS-level aliasing of the root never produces a false
/// escape.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: &Path) -> Result<Self, MillError> {
        let root = fs::canonicalize(root).map_err(|source| io_error(root, source))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a candidate path against the workspace root. Relative
    /// candidates are joined to the root; foreign separators are normalized
    /// first so a request authored on another OS resolves the same way here.
    /// Fails with `PathEscape` unless the canonicalized result is the root
    /// itself or a proper descendant of it.
    pub fn resolve(&self, candidate: &str) -> Result<PathBuf, MillError> {
        let normalized = normalize_separators(candidate);
        let joined = if normalized.is_absolute() {
            normalized
        } else {
            self.root.join(normalized)
        };

        let resolved = canonicalize_allowing_absent(&joined).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                MillError::NotFound {
                    path: candidate.to_string(),
                }
            } else {
                io_error(&joined, source)
            }
        })?;

        if resolved == self.root || resolved.starts_with(&self.root) {
            Ok(resolved)
        } else {
            Err(MillError::PathEscape {
                path: candidate.to_string(),
            })
        }
    }
}

/// Splits on both `/` and `\` and rejoins with the host separator. `..` and
/// `.` segments survive as path components for canonicalization to handle.
fn normalize_separators(candidate: &str) -> PathBuf {
    let mut path = PathBuf::new();
    if candidate.starts_with('/') || candidate.starts_with('\\') {
        path.push(std::path::MAIN_SEPARATOR.to_string());
    }
    for segment in candidate.split(['/', '\\']).filter(|s| !s.is_empty()) {
        path.push(segment);
    }
    path
}

/// `fs::canonicalize` for paths whose leaf may not exist yet (export
/// destinations). The deepest existing ancestor is canonicalized through
/// symlinks; the non-existent remainder is appended lexically, with `..`
/// popping a component. No symlink can live inside a directory that does not
/// exist, so lexical handling of the tail is exact.
fn canonicalize_allowing_absent(path: &Path) -> io::Result<PathBuf> {
    match fs::canonicalize(path) {
        Ok(resolved) => Ok(resolved),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            for ancestor in path.ancestors().skip(1) {
                if ancestor.as_os_str().is_empty() {
                    break;
                }
                if let Ok(base) = fs::canonicalize(ancestor) {
                    let remainder = path.strip_prefix(ancestor).map_err(io::Error::other)?;
                    return Ok(append_lexical(base, remainder));
                }
            }
            Err(err)
        }
        Err(err) => Err(err),
    }
}

fn append_lexical(mut base: PathBuf, remainder: &Path) -> PathBuf {
    for component in remainder.components() {
        match component {
            Component::Normal(segment) => base.push(segment),
            Component::ParentDir => {
                base.pop();
            }
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => {}
        }
    }
    base
}
