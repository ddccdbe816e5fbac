//! Lexical path helpers. Nothing here touches the filesystem except
//! [`executable_path`].

use std::ffi::OsStr;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Joins path segments with the platform separator.
pub fn join<I, P>(parts: I) -> PathBuf
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    parts.into_iter().fold(PathBuf::new(), |mut acc, p| {
        acc.push(p);
        acc
    })
}

/// Collapses `.` and `..` segments without consulting the filesystem.
///
/// A `..` that would climb above a root is dropped; a leading `..` in a
/// relative path is kept.
pub fn normalize(path: impl AsRef<Path>) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.as_ref().components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

pub fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(OsStr::to_str)
}

/// Extension without the leading dot.
pub fn extension(path: &Path) -> Option<&str> {
    path.extension().and_then(OsStr::to_str)
}

/// Replaces the extension; an empty `ext` removes it.
pub fn change_extension(path: impl AsRef<Path>, ext: &str) -> PathBuf {
    let mut out = path.as_ref().to_path_buf();
    out.set_extension(ext.trim_start_matches('.'));
    out
}

pub fn parent(path: &Path) -> Option<&Path> {
    path.parent().filter(|p| !p.as_os_str().is_empty())
}

/// Full path of the running executable.
pub fn executable_path() -> io::Result<PathBuf> {
    std::env::current_exe()
}

/// The user's home directory, as the OS reports it.
pub fn home_path() -> Option<PathBuf> {
    dirs::home_dir()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("a/./b/../c"), PathBuf::from("a/c"));
        assert_eq!(normalize("../x/y/.."), PathBuf::from("../x"));
        #[cfg(unix)]
        assert_eq!(normalize("/../etc//./hosts"), PathBuf::from("/etc/hosts"));
    }

    #[test]
    fn test_name_and_extension() {
        let p = join(["assets", "sounds", "tone.wav"]);
        assert_eq!(file_name(&p), Some("tone.wav"));
        assert_eq!(extension(&p), Some("wav"));
        assert_eq!(change_extension(&p, ".ogg"), join(["assets", "sounds", "tone.ogg"]));
        assert_eq!(change_extension(&p, ""), join(["assets", "sounds", "tone"]));
        assert_eq!(parent(&p), Some(join(["assets", "sounds"]).as_path()));
        assert_eq!(parent(Path::new("tone.wav")), None);
    }

    #[test]
    fn test_executable_path_exists() {
        let exe = executable_path().unwrap();
        assert!(exe.is_absolute());
    }

    #[test]
    fn test_home_path_is_an_absolute_directory() {
        if let Some(home) = home_path() {
            assert!(home.is_absolute());
            assert_eq!(home_path(), Some(home));
        }
    }
}
