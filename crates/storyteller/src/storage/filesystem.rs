use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::StorageError;

/// Writes artifacts under a root directory without ever overwriting an
/// existing file.
pub struct FileStorage {
    output_directory: PathBuf,
}

impl FileStorage {
    pub fn new<P: AsRef<Path>>(output_directory: P) -> Self {
        Self {
            output_directory: output_directory.as_ref().to_path_buf(),
        }
    }

    pub fn output_directory(&self) -> &Path {
        &self.output_directory
    }

    /// Stores `content` as `{relative_directory}/{filename}.{extension}`.
    /// On a name clash `_2`, `_3`, ... is appended to the stem.
    pub fn store(
        &self,
        content: &[u8],
        relative_directory: &str,
        filename: &str,
        extension: &str,
    ) -> Result<PathBuf, StorageError> {
        let dir_path = self.output_directory.join(relative_directory);
        ensure_directory(&dir_path)?;

        let full_filename = format!("{}.{}", filename, extension);
        self.store_with_atomic_creation(&dir_path, &full_filename, content)
    }

    /// Creates the file with `create_new` (O_EXCL) so two writers racing on
    /// the same name end up with distinct files.
    fn store_with_atomic_creation(
        &self,
        dir_path: &Path,
        filename: &str,
        content: &[u8],
    ) -> Result<PathBuf, StorageError> {
        let (base, ext) = match filename.rfind('.') {
            Some(dot_pos) => (&filename[..dot_pos], Some(&filename[dot_pos..])),
            None => (filename, None),
        };

        for counter in 1..=1000 {
            let try_filename = if counter == 1 {
                filename.to_string()
            } else {
                match ext {
                    Some(ext) => format!("{}_{}{}", base, counter, ext),
                    None => format!("{}_{}", base, counter),
                }
            };

            let try_path = dir_path.join(&try_filename);

            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&try_path)
            {
                Ok(mut file) => {
                    file.write_all(content)
                        .map_err(|e| StorageError::WriteFile {
                            path: try_path.clone(),
                            source: e,
                        })?;
                    return Ok(try_path);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(StorageError::WriteFile {
                        path: try_path,
                        source: e,
                    });
                }
            }
        }

        Err(StorageError::FileExists(dir_path.join(filename)))
    }

    /// Overwrites `{relative_path}` in place. Used for files keyed by job id,
    /// where a rerun of the same job should replace the previous output.
    pub fn replace(&self, content: &[u8], relative_path: &str) -> Result<PathBuf, StorageError> {
        let path = self.output_directory.join(relative_path);
        if let Some(parent) = path.parent() {
            ensure_directory(parent)?;
        }
        std::fs::write(&path, content).map_err(|e| StorageError::WriteFile {
            path: path.clone(),
            source: e,
        })?;
        Ok(path)
    }

    /// Removes a file if present. Missing files are not an error.
    pub fn remove(&self, path: &Path) -> Result<(), StorageError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::RemoveFile {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }
}

pub fn ensure_directory(path: &Path) -> Result<(), StorageError> {
    if !path.exists() {
        std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
            path: path.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_store_file() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path());

        let content = b"<html></html>";
        let path = storage
            .store(content, "", "luna-and-the-comet_20260101120000", "html")
            .unwrap();

        assert!(path.exists());
        assert_eq!(std::fs::read(&path).unwrap(), content);
        assert_eq!(path.parent().unwrap(), temp_dir.path());
    }

    #[test]
    fn test_conflict_resolution_numbering_sequence() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path());

        for i in 1..=3 {
            let content = format!("Story {}", i);
            storage
                .store(content.as_bytes(), "", "my-story_20260101120000", "html")
                .unwrap();
        }

        assert!(temp_dir.path().join("my-story_20260101120000.html").exists());
        assert!(temp_dir.path().join("my-story_20260101120000_2.html").exists());
        assert!(temp_dir.path().join("my-story_20260101120000_3.html").exists());
        assert_eq!(
            std::fs::read_to_string(temp_dir.path().join("my-story_20260101120000.html"))
                .unwrap(),
            "Story 1"
        );
    }

    #[test]
    fn test_create_nested_directories() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path());

        let path = storage.store(b"mp3", "audio", "part", "mp3").unwrap();
        assert!(path.starts_with(temp_dir.path().join("audio")));
    }

    #[test]
    fn test_replace_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path());

        storage.replace(b"first", "audio/abc.mp3").unwrap();
        let path = storage.replace(b"second", "audio/abc.mp3").unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"second");
    }

    #[test]
    fn test_remove_missing_is_ok() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path());
        storage.remove(&temp_dir.path().join("nope.mp3")).unwrap();
    }
}
