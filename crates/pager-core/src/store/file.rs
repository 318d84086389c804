use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use tokio::fs;

use crate::{errors::Error, store::KvBackend, Result};

const EXT: &str = ".json";

/// One JSON file per record inside a state directory.
///
/// Writes land in a hidden temp file first and are renamed into place, so a
/// reader never observes a half-written record.
#[derive(Debug)]
pub struct FileBackend {
    dir: PathBuf,
    tmp_seq: AtomicU64,
}

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            tmp_seq: AtomicU64::new(0),
        }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_digit() || c == '-' || c == '_');
        if !valid {
            return Err(Error::Storage(format!("invalid record key {key:?}")));
        }
        Ok(self.dir.join(format!("{key}{EXT}")))
    }
}

fn storage_err(action: &str, path: &Path, e: std::io::Error) -> Error {
    Error::Storage(format!("{action} {}: {e}", path.display()))
}

#[async_trait]
impl KvBackend for FileBackend {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_err("read", &path, e)),
        }
    }

    async fn store(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| storage_err("create", &self.dir, e))?;

        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        let tmp = self
            .dir
            .join(format!(".{key}{EXT}.tmp-{}-{seq}", std::process::id()));
        if let Err(e) = fs::write(&tmp, &value).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(storage_err("write", &tmp, e));
        }
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(storage_err("rename", &path, e));
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_err("remove", &path, e)),
        }
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut rd = match fs::read_dir(&self.dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(storage_err("list", &self.dir, e)),
        };

        let mut keys = Vec::new();
        while let Some(ent) = rd
            .next_entry()
            .await
            .map_err(|e| storage_err("list", &self.dir, e))?
        {
            let name = ent.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            if let Some(key) = name.strip_suffix(EXT) {
                keys.push(key.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}
