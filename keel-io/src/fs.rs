use bitflags::bitflags;
use log::{debug, info};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A file opened for block-wise binary reads or writes.
///
/// Positions and sizes are 64-bit. The handle closes on drop; [`BinaryFile::close`]
/// exists for callers that want the flush error.
#[derive(Debug)]
pub struct BinaryFile {
    file: File,
    path: PathBuf,
}

impl BinaryFile {
    /// Opens an existing file for reading.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        debug!("Opened {} for reading", path.display());
        Ok(Self { file, path: path.to_path_buf() })
    }

    /// Creates (or truncates) a file for reading and writing.
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).create(true).truncate(true).open(path)?;
        debug!("Created {}", path.display());
        Ok(Self { file, path: path.to_path_buf() })
    }

    /// Reads up to `buf.len()` bytes. Returns fewer only at end of file.
    pub fn read_block(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    /// Writes the whole block and returns its length.
    pub fn write_block(&mut self, data: &[u8]) -> io::Result<usize> {
        self.file.write_all(data)?;
        Ok(data.len())
    }

    pub fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }

    pub fn position(&mut self) -> io::Result<u64> {
        self.file.stream_position()
    }

    pub fn size(&self) -> io::Result<u64> {
        self.file.metadata().map(|m| m.len())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes and closes the handle.
    pub fn close(mut self) -> io::Result<()> {
        self.file.flush()?;
        self.file.sync_all()
    }
}

/// Size in bytes of the file at `path`.
pub fn file_size(path: impl AsRef<Path>) -> io::Result<u64> {
    fs::metadata(path).map(|m| m.len())
}

pub fn file_exists(path: impl AsRef<Path>) -> bool {
    fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

pub fn directory_exists(path: impl AsRef<Path>) -> bool {
    fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false)
}

/// Copies `from` to `to`. Fails with `AlreadyExists` when the target exists
/// and `overwrite` is false.
pub fn copy_file(from: impl AsRef<Path>, to: impl AsRef<Path>, overwrite: bool) -> io::Result<u64> {
    let (from, to) = (from.as_ref(), to.as_ref());
    if !overwrite && to.exists() {
        return Err(io::Error::new(io::ErrorKind::AlreadyExists, format!("{} already exists", to.display())));
    }
    let bytes = fs::copy(from, to)?;
    info!("Copied {} -> {} ({} bytes)", from.display(), to.display(), bytes);
    Ok(bytes)
}

pub fn delete_file(path: impl AsRef<Path>) -> io::Result<()> {
    fs::remove_file(path)
}

/// Creates every missing directory along `path`.
pub fn create_directories(path: impl AsRef<Path>) -> io::Result<()> {
    fs::create_dir_all(path)
}

/// Removes a directory only if it is empty.
pub fn remove_empty_directory(path: impl AsRef<Path>) -> io::Result<()> {
    fs::remove_dir(path)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Unknown,
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct FileAttributes: u32 {
        const NORMAL = 1 << 0;
        const READ_ONLY = 1 << 1;
        const HIDDEN = 1 << 2;
        const SYMLINK = 1 << 3;
    }
}

#[derive(Clone, Debug)]
pub struct FileEntry {
    pub path: PathBuf,
    pub kind: EntryKind,
    pub size: u64,
    pub attributes: FileAttributes,
}

/// Lists the entries of `dir` whose file name matches `filter`.
///
/// The filter understands `*` (any run of characters) and `?` (exactly one
/// character); `"*"` lists everything. Entries come back sorted by path.
pub fn list_directory(dir: impl AsRef<Path>, filter: &str) -> io::Result<Vec<FileEntry>> {
    let mut entries = Vec::new();
    for item in fs::read_dir(dir)? {
        let item = item?;
        let name = item.file_name();
        let name = name.to_string_lossy();
        if !wildcard_match(filter, &name) {
            continue;
        }
        let file_type = item.file_type()?;
        let meta = fs::metadata(item.path()).or_else(|_| item.metadata())?;

        let kind = if meta.is_dir() {
            EntryKind::Directory
        } else if meta.is_file() {
            EntryKind::File
        } else {
            EntryKind::Unknown
        };

        let mut attributes = FileAttributes::empty();
        if meta.permissions().readonly() {
            attributes |= FileAttributes::READ_ONLY;
        }
        if name.starts_with('.') {
            attributes |= FileAttributes::HIDDEN;
        }
        if file_type.is_symlink() {
            attributes |= FileAttributes::SYMLINK;
        }
        if attributes.is_empty() {
            attributes = FileAttributes::NORMAL;
        }

        entries.push(FileEntry {
            path: item.path(),
            kind,
            size: if kind == EntryKind::File { meta.len() } else { 0 },
            attributes,
        });
    }
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}

fn wildcard_match(pattern: &str, name: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let n: Vec<char> = name.chars().collect();
    let (mut pi, mut ni) = (0, 0);
    // Last '*' seen and the name position it was tried against.
    let mut star: Option<(usize, usize)> = None;

    while ni < n.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == n[ni]) {
            pi += 1;
            ni += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ni));
            pi += 1;
        } else if let Some((sp, sn)) = star {
            pi = sp + 1;
            ni = sn + 1;
            star = Some((sp, sn + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|&c| c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_file_blocks_and_seek() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        let path = dir.join("data.bin");

        let mut file = BinaryFile::create(&path).unwrap();
        assert_eq!(file.write_block(&[1, 2, 3, 4, 5]).unwrap(), 5);
        assert_eq!(file.position().unwrap(), 5);
        file.seek(SeekFrom::Start(1)).unwrap();
        let mut buf = [0u8; 2];
        assert_eq!(file.read_block(&mut buf).unwrap(), 2);
        assert_eq!(buf, [2, 3]);
        assert_eq!(file.size().unwrap(), 5);
        file.close().unwrap();

        let mut reader = BinaryFile::open(&path).unwrap();
        let mut all = [0u8; 16];
        assert_eq!(reader.read_block(&mut all).unwrap(), 5);
        assert_eq!(file_size(&path).unwrap(), 5);
    }

    #[test]
    fn test_copy_delete_and_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        let src = dir.join("a.txt");
        let dst = dir.join("b.txt");
        fs::write(&src, b"hello").unwrap();

        assert_eq!(copy_file(&src, &dst, false).unwrap(), 5);
        let err = copy_file(&src, &dst, false).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert!(copy_file(&src, &dst, true).is_ok());

        delete_file(&dst).unwrap();
        assert!(!file_exists(&dst));

        let nested = dir.join("x").join("y");
        create_directories(&nested).unwrap();
        assert!(directory_exists(&nested));
        assert!(remove_empty_directory(dir.join("x")).is_err());
        remove_empty_directory(&nested).unwrap();
    }

    #[test]
    fn test_list_directory_filters() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        fs::write(dir.join("one.wav"), [0u8; 10]).unwrap();
        fs::write(dir.join("two.wav"), [0u8; 3]).unwrap();
        fs::write(dir.join("notes.txt"), b"x").unwrap();
        create_directories(dir.join("sub")).unwrap();

        let wavs = list_directory(dir, "*.wav").unwrap();
        assert_eq!(wavs.len(), 2);
        assert_eq!(wavs[0].size, 10);
        assert!(wavs.iter().all(|e| e.kind == EntryKind::File));

        let all = list_directory(dir, "*").unwrap();
        assert_eq!(all.len(), 4);
        assert!(all.iter().any(|e| e.kind == EntryKind::Directory));
    }

    #[test]
    fn test_wildcards() {
        assert!(wildcard_match("*", "anything"));
        assert!(wildcard_match("t?o.*", "two.wav"));
        assert!(wildcard_match("*.tar.*", "a.tar.gz"));
        assert!(!wildcard_match("*.wav", "a.wave"));
        assert!(!wildcard_match("?", ""));
    }
}
