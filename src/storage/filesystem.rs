use super::{Database, WriteStream};
use crate::codec::Source;
use crate::error::StorageError;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, instrument};

/// One file per key under a root directory.
///
/// Writes go to a hidden temp file in the same directory and are renamed into
/// place on commit, so readers never see a partial value.
#[derive(Debug, Clone)]
pub struct FileSystemDatabase {
  root: PathBuf,
}

impl FileSystemDatabase {
  /// Opens (creating if needed) a database rooted at `root`.
  pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
    let root = root.into();
    std::fs::create_dir_all(&root)?;
    Ok(Self { root })
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  fn path(&self, key: &str) -> Result<PathBuf, StorageError> {
    if key.is_empty()
      || key.starts_with('.')
      || key.contains(['/', '\\'])
    {
      return Err(StorageError::MalformedKey(key.to_string()));
    }
    Ok(self.root.join(key))
  }
}

impl Database for FileSystemDatabase {
  #[instrument(level = "trace", skip(self))]
  fn write_stream(
    &self,
    key: &str,
    content_type: &str,
  ) -> Result<Box<dyn WriteStream>, StorageError> {
    let path = self.path(key)?;
    let file = NamedTempFile::new_in(&self.root)?;
    Ok(Box::new(FileWriter { path, file }))
  }

  #[instrument(level = "trace", skip(self))]
  fn read_stream(&self, key: &str) -> Result<Source, StorageError> {
    let path = self.path(key)?;
    match File::open(&path) {
      Ok(file) => Ok(Box::new(BufReader::new(file))),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        Err(StorageError::NotFound(key.to_string()))
      }
      Err(e) => Err(e.into()),
    }
  }

  fn contains(&self, key: &str) -> Result<bool, StorageError> {
    Ok(self.path(key)?.is_file())
  }

  fn keys(&self) -> Result<Vec<String>, StorageError> {
    let mut keys = Vec::new();
    for entry in std::fs::read_dir(&self.root)? {
      let entry = entry?;
      if !entry.file_type()?.is_file() {
        continue;
      }
      if let Some(name) = entry.file_name().to_str() {
        if !name.starts_with('.') {
          keys.push(name.to_string());
        }
      }
    }
    keys.sort();
    Ok(keys)
  }
}

struct FileWriter {
  path: PathBuf,
  file: NamedTempFile,
}

impl Write for FileWriter {
  fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
    self.file.write(buf)
  }

  fn flush(&mut self) -> std::io::Result<()> {
    self.file.flush()
  }
}

impl WriteStream for FileWriter {
  fn commit(self: Box<Self>) -> Result<(), StorageError> {
    let FileWriter { path, mut file } = *self;
    file.flush()?;
    file.persist(&path).map_err(|e| e.error)?;
    debug!(path = %path.display(), "committed");
    Ok(())
  }
}
