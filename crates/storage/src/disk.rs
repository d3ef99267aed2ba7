use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::{ObjectStore, StorageError, validate_key};

/// Object store backed by a local directory.
///
/// Keys map directly to relative paths under the base directory;
/// [`validate_key`] keeps them inside it.
pub struct DiskStore {
    base_path: PathBuf,
}

impl DiskStore {
    /// Creates the store rooted at `base_path`, creating the directory
    /// if needed.
    pub async fn new<P: AsRef<Path>>(base_path: P) -> Result<Self, StorageError> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path).await?;
        Ok(Self { base_path })
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.base_path.join(key))
    }
}

#[async_trait]
impl ObjectStore for DiskStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        // Write-then-rename so readers never observe a partial object.
        let tmp = path.with_extension("part");
        fs::write(&tmp, &bytes).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.object_path(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.into()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.object_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn compose(&self, sources: &[String], dest: &str) -> Result<u64, StorageError> {
        let dest_path = self.object_path(dest)?;
        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let tmp = dest_path.with_extension("part");
        let mut out = fs::File::create(&tmp).await?;
        let mut total: u64 = 0;
        let mut buf = vec![0u8; 64 * 1024];

        for source in sources {
            let source_path = self.object_path(source)?;
            let mut file = match fs::File::open(&source_path).await {
                Ok(f) => f,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(StorageError::NotFound(source.clone()));
                }
                Err(e) => return Err(e.into()),
            };
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                out.write_all(&buf[..n]).await?;
                total += n as u64;
            }
        }

        out.flush().await?;
        drop(out);
        fs::rename(&tmp, &dest_path).await?;
        Ok(total)
    }
}
