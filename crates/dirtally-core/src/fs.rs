use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Raw bytes of a path, used as store keys and hash input.
#[inline]
pub fn path_bytes(path: &Path) -> &[u8] {
    path.as_os_str().as_encoded_bytes()
}

/// Inverse of [`path_bytes`] for keys read back from storage.
#[cfg(unix)]
pub fn path_from_bytes(bytes: &[u8]) -> PathBuf {
    use std::os::unix::ffi::OsStrExt;
    PathBuf::from(std::ffi::OsStr::from_bytes(bytes))
}

#[cfg(not(unix))]
pub fn path_from_bytes(bytes: &[u8]) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(bytes).into_owned())
}

/// Every ancestor directory of `path`, nearest first, ending at the root.
///
/// `path` itself is not included.
pub fn parent_dirs(path: &Path) -> impl Iterator<Item = &Path> {
    path.ancestors()
        .skip(1)
        .filter(|ancestor| !ancestor.as_os_str().is_empty())
}

/// Sorts paths so that longer (deeper) paths come first.
pub fn sort_longest_first(paths: &mut [PathBuf]) {
    paths.sort_by(|a, b| {
        path_bytes(b)
            .len()
            .cmp(&path_bytes(a).len())
            .then_with(|| a.cmp(b))
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirEntryKind {
    /// A regular file, or a symlink whose target is a regular file.
    File { size: u64 },
    Dir,
    /// A symlink whose target is a directory.
    SymlinkDir,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryInfo {
    pub path: PathBuf,
    pub kind: DirEntryKind,
}

/// Lists the direct children of `dir`, skipping dot-entries.
///
/// Entries that vanish while listing, dangling symlinks and special files are
/// skipped. A missing `dir` is an error.
pub fn dir_entries(dir: &Path) -> io::Result<Vec<DirEntryInfo>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(err) => return Err(err),
        };
        if entry.file_name().as_encoded_bytes().first() == Some(&b'.') {
            continue;
        }

        let path = entry.path();
        let file_type = match entry.file_type() {
            Ok(file_type) => file_type,
            Err(_) => continue,
        };

        let kind = if file_type.is_dir() {
            DirEntryKind::Dir
        } else if file_type.is_symlink() {
            match fs::metadata(&path) {
                Ok(meta) if meta.is_dir() => DirEntryKind::SymlinkDir,
                Ok(meta) if meta.is_file() => DirEntryKind::File { size: meta.len() },
                _ => continue,
            }
        } else if file_type.is_file() {
            match entry.metadata() {
                Ok(meta) => DirEntryKind::File { size: meta.len() },
                Err(_) => continue,
            }
        } else {
            continue;
        };

        out.push(DirEntryInfo { path, kind });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_dirs_walks_to_root() {
        let parents: Vec<_> = parent_dirs(Path::new("/a/b/c.txt")).collect();
        assert_eq!(
            parents,
            vec![Path::new("/a/b"), Path::new("/a"), Path::new("/")]
        );
        assert_eq!(parent_dirs(Path::new("/")).count(), 0);
    }

    #[test]
    fn path_bytes_round_trip() {
        let path = Path::new("/data/projects/a b.txt");
        assert_eq!(path_from_bytes(path_bytes(path)), path);
    }

    #[test]
    fn longest_paths_sort_first() {
        let mut paths = vec![
            PathBuf::from("/a"),
            PathBuf::from("/a/bb/c"),
            PathBuf::from("/a/b"),
        ];
        sort_longest_first(&mut paths);
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/a/bb/c"),
                PathBuf::from("/a/b"),
                PathBuf::from("/a"),
            ]
        );
    }

    #[test]
    fn dir_entries_skips_dot_files_and_classifies() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("a.txt"), b"hello").unwrap();
        fs::write(tmp.path().join(".hidden"), b"x").unwrap();
        fs::create_dir(tmp.path().join("sub")).unwrap();

        let mut entries = dir_entries(tmp.path()).unwrap();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, DirEntryKind::File { size: 5 });
        assert_eq!(entries[1].kind, DirEntryKind::Dir);
    }

    #[cfg(unix)]
    #[test]
    fn dir_entries_follows_symlinks() {
        let tmp = tempfile::tempdir().unwrap();
        let target_dir = tmp.path().join("target");
        fs::create_dir(&target_dir).unwrap();
        fs::write(target_dir.join("f"), b"abc").unwrap();

        let listing = tmp.path().join("listing");
        fs::create_dir(&listing).unwrap();
        std::os::unix::fs::symlink(&target_dir, listing.join("dirlink")).unwrap();
        std::os::unix::fs::symlink(target_dir.join("f"), listing.join("filelink")).unwrap();
        std::os::unix::fs::symlink(tmp.path().join("missing"), listing.join("dangling")).unwrap();

        let mut entries = dir_entries(&listing).unwrap();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        let kinds: Vec<_> = entries.iter().map(|entry| entry.kind).collect();
        assert_eq!(
            kinds,
            vec![DirEntryKind::SymlinkDir, DirEntryKind::File { size: 3 }]
        );
    }
}
