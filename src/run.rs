//! Temporary run tapes.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log;

/// A temporary tape holding one batch of values produced during run generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapeRun {
    path: PathBuf,
    len: usize,
}

impl TapeRun {
    /// Creates an empty run tape named after its index in `dir`.
    /// Fails with [`io::ErrorKind::AlreadyExists`] if a file with that name exists, the file is left intact.
    ///
    /// # Arguments
    /// * `dir` - Directory to place the tape in
    /// * `index` - Run sequence number, used to build the tape name
    /// * `len` - Number of values the run is going to hold
    pub fn create(dir: &Path, index: usize, len: usize) -> io::Result<Self> {
        let path = run_path(dir, index);
        fs::OpenOptions::new().write(true).create_new(true).open(&path)?;

        return Ok(TapeRun { path, len });
    }

    /// Creates an empty run tape under the first free name starting from `next_index`.
    /// Names taken by existing files or matching one of the `reserved` tapes are skipped.
    /// `next_index` is advanced past the name used.
    pub fn create_next(dir: &Path, next_index: &mut usize, len: usize, reserved: &[&Path]) -> io::Result<Self> {
        let reserved: Vec<PathBuf> = reserved.iter().map(|path| normalize(path)).collect();

        loop {
            let index = *next_index;
            *next_index += 1;

            if reserved.contains(&normalize(&run_path(dir, index))) {
                log::debug!("run tape name {} is reserved, skipping", index);
                continue;
            }

            match TapeRun::create(dir, index, len) {
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    log::debug!("run tape name {} is taken, skipping", index);
                }
                result => return result,
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of values on the tape.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Removes the run tape. A tape that is already gone is not an error.
    pub fn remove(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            result => result,
        }
    }
}

fn run_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("temp_tape_{}.txt", index))
}

/// Resolves the tape directory so the same tape reached through different paths compares equal.
/// The tape itself may not exist yet.
fn normalize(path: &Path) -> PathBuf {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    match (fs::canonicalize(dir), path.file_name()) {
        (Ok(dir), Some(name)) => dir.join(name),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod test {
    use std::fs;
    use std::io;

    use rstest::*;

    use super::TapeRun;

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    #[rstest]
    fn test_run_lifecycle(tmp_dir: tempfile::TempDir) {
        let run = TapeRun::create(tmp_dir.path(), 3, 5).unwrap();

        assert_eq!(run.path(), tmp_dir.path().join("temp_tape_3.txt"));
        assert_eq!(run.len(), 5);
        assert!(run.path().exists());
        assert_eq!(fs::read_to_string(run.path()).unwrap(), "");

        run.remove().unwrap();
        assert!(!run.path().exists());
        run.remove().unwrap();
    }

    #[rstest]
    fn test_run_keeps_existing_file(tmp_dir: tempfile::TempDir) {
        let path = tmp_dir.path().join("temp_tape_0.txt");
        fs::write(&path, "5 4 3").unwrap();

        let err = TapeRun::create(tmp_dir.path(), 0, 3).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(fs::read_to_string(&path).unwrap(), "5 4 3");
    }

    #[rstest]
    fn test_run_next_free_name(tmp_dir: tempfile::TempDir) {
        let taken = tmp_dir.path().join("temp_tape_0.txt");
        let reserved = tmp_dir.path().join("temp_tape_1.txt");
        fs::write(&taken, "1").unwrap();

        let mut next_index = 0;
        let run = TapeRun::create_next(tmp_dir.path(), &mut next_index, 2, &[&reserved]).unwrap();

        assert_eq!(run.path(), tmp_dir.path().join("temp_tape_2.txt"));
        assert_eq!(next_index, 3);
        assert_eq!(fs::read_to_string(&taken).unwrap(), "1");
        assert!(!reserved.exists());

        let run = TapeRun::create_next(tmp_dir.path(), &mut next_index, 2, &[&reserved]).unwrap();
        assert_eq!(run.path(), tmp_dir.path().join("temp_tape_3.txt"));
    }

    #[rstest]
    fn test_run_in_missing_directory(tmp_dir: tempfile::TempDir) {
        let result = TapeRun::create(&tmp_dir.path().join("missing"), 0, 1);
        assert!(result.is_err());
    }
}
