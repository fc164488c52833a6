//! Path cleaning and directory creation helpers.
//!
//! # Responsibilities
//! - Expand `~` and `$VAR` / `${VAR}` references in user supplied paths
//! - Lexically clean paths so defaults can be compared with overrides
//! - Create directories with owner-only permissions

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::config::error::ConfigError;

/// Expand `~` and environment variables, then clean the path lexically.
///
/// An empty input stays empty so callers can tell "unset" apart.
pub fn clean_and_expand_path(path: impl AsRef<Path>) -> PathBuf {
    let raw = path.as_ref().to_string_lossy();
    if raw.is_empty() {
        return PathBuf::new();
    }

    let mut expanded = raw.into_owned();
    if expanded == "~" || expanded.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            expanded = format!("{}{}", home.display(), &expanded[1..]);
        }
    }

    clean_path(Path::new(&expand_env_vars(&expanded)))
}

/// Replace `$VAR` and `${VAR}` with their values. Unset variables expand to
/// the empty string.
fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }

        let mut name = String::new();
        if chars.peek() == Some(&'{') {
            chars.next();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                name.push(c);
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c.is_ascii_alphanumeric() || c == '_' {
                    name.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
        }

        if name.is_empty() {
            out.push('$');
        } else if let Ok(value) = std::env::var(&name) {
            out.push_str(&value);
        }
    }

    out
}

/// Lexically resolve `.` and `..` segments without touching the filesystem.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(
                    cleaned.components().next_back(),
                    Some(Component::Normal(_))
                ) && cleaned.pop();
                if !popped && !cleaned.has_root() {
                    cleaned.push("..");
                }
            }
            other => cleaned.push(other.as_os_str()),
        }
    }

    if cleaned.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        cleaned
    }
}

/// Create `dir` and any missing parents with mode 0700.
///
/// A dangling symlink anywhere on the path is reported as
/// `is symlink X -> Y mounted?` instead of the bare I/O error.
pub fn make_directories(dir: &Path) -> Result<(), ConfigError> {
    create_dir_all_private(dir).map_err(|e| {
        let reason = match e.kind() {
            io::ErrorKind::AlreadyExists => match dangling_symlink(dir) {
                Some((link, target)) => format!(
                    "is symlink {} -> {} mounted?",
                    link.display(),
                    target.display()
                ),
                None => e.to_string(),
            },
            _ => e.to_string(),
        };
        ConfigError::DirectoryCreateFailed {
            path: dir.to_path_buf(),
            reason,
        }
    })
}

#[cfg(unix)]
fn create_dir_all_private(dir: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)
}

#[cfg(not(unix))]
fn create_dir_all_private(dir: &Path) -> io::Result<()> {
    fs::DirBuilder::new().recursive(true).create(dir)
}

/// Find the first path prefix that is a symlink whose target does not exist.
fn dangling_symlink(dir: &Path) -> Option<(PathBuf, PathBuf)> {
    dir.ancestors().find_map(|candidate| {
        let meta = fs::symlink_metadata(candidate).ok()?;
        if !meta.file_type().is_symlink() || fs::metadata(candidate).is_ok() {
            return None;
        }
        let target = fs::read_link(candidate).ok()?;
        Some((candidate.to_path_buf(), target))
    })
}
