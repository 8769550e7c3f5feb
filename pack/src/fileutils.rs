use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::warn;

// Read as much of `buf` as possible starting at the given byte offset. The file
// handle is opened for this read alone and closed before returning, whatever the
// outcome. The returned count is short only at end of file.
pub fn read_block(path: &Path, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;

    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

// List the regular files of a directory whose size falls inside the given bounds,
// sorted by full path. Does not recurse. Entries whose metadata cannot be read are
// skipped with a warning so one bad file does not sink the whole run.
pub fn list_dir_files_sorted(dir: &Path, min_size: u64, max_size: u64) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let meta = match entry.metadata() {
            Ok(meta) => meta,
            Err(e) => {
                warn!("skipping {}: {}", entry.path().display(), e);
                continue;
            }
        };
        if !meta.is_file() {
            continue;
        }
        if meta.len() < min_size || meta.len() > max_size {
            continue;
        }
        files.push(entry.path());
    }
    files.sort();
    Ok(files)
}

pub fn file_size(path: &Path) -> io::Result<u64> {
    Ok(fs::metadata(path)?.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("pack_fileutils_{}_{}", std::process::id(), name));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_read_block_positions_and_fills() {
        let dir = temp_dir("read_block");
        let path = dir.join("data");
        fs::write(&path, (0u16..1000).map(|v| v as u8).collect::<Vec<u8>>()).unwrap();

        let mut buf = [0u8; 16];
        assert_eq!(read_block(&path, 0, &mut buf).unwrap(), 16);
        assert_eq!(buf[0], 0);
        assert_eq!(buf[15], 15);

        assert_eq!(read_block(&path, 100, &mut buf).unwrap(), 16);
        assert_eq!(buf[0], 100);

        // Reads near the end come back short, reads past the end come back empty.
        assert_eq!(read_block(&path, 990, &mut buf).unwrap(), 10);
        assert_eq!(read_block(&path, 2000, &mut buf).unwrap(), 0);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_read_block_missing_file() {
        let dir = temp_dir("missing");
        let mut buf = [0u8; 16];
        assert!(read_block(&dir.join("no_such_file"), 0, &mut buf).is_err());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_list_dir_filters_and_sorts() {
        let dir = temp_dir("listing");
        fs::write(dir.join("b_medium"), vec![0u8; 500]).unwrap();
        fs::write(dir.join("a_medium"), vec![0u8; 400]).unwrap();
        fs::write(dir.join("c_tiny"), vec![0u8; 10]).unwrap();
        fs::write(dir.join("d_huge"), vec![0u8; 5000]).unwrap();
        fs::create_dir(dir.join("subdir")).unwrap();

        let files = list_dir_files_sorted(&dir, 100, 1000).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a_medium", "b_medium"]);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_list_dir_missing_directory() {
        let dir = temp_dir("gone");
        fs::remove_dir_all(&dir).unwrap();
        assert!(list_dir_files_sorted(&dir, 0, u64::MAX).is_err());
    }
}
