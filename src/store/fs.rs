use super::{validate_key, Backend, KeyStream, StoreError};
use async_trait::async_trait;
use futures::{stream, StreamExt};
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};
use tokio::fs;
use tracing::warn;

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Flat-file backend. Key segments map to directories, so `gid/hash.json`
/// lives at `<root>/gid/hash.json`. Writes go to a hidden temp file that is
/// renamed into place, which keeps single-key writes atomic.
#[derive(Debug, Clone)]
pub struct FsBackend {
    root: PathBuf,
}

impl FsBackend {
    /// Opens `root`, creating it if needed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let segments = validate_key(key)?;
        Ok(segments
            .into_iter()
            .fold(self.root.clone(), |path, segment| path.join(segment)))
    }
}

fn not_found(key: &str, err: std::io::Error) -> StoreError {
    if err.kind() == ErrorKind::NotFound {
        StoreError::NotFound(key.to_string())
    } else {
        StoreError::Io(err)
    }
}

#[async_trait]
impl Backend for FsBackend {
    async fn write(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        let parent = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(parent).await?;

        let tmp = parent.join(format!(
            ".tmp-{}-{}",
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        fs::write(&tmp, bytes).await?;
        if let Err(err) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(err.into());
        }
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.path_for(key)?;
        fs::read(&path).await.map_err(|e| not_found(key, e))
    }

    async fn has(&self, key: &str) -> bool {
        match self.path_for(key) {
            Ok(path) => fs::metadata(&path)
                .await
                .map(|m| m.is_file())
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn erase(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        // group directories are left in place, a concurrent write may be
        // about to put a file in them
        fs::remove_file(&path).await.map_err(|e| not_found(key, e))
    }

    async fn keys_with_prefix(&self, prefix: &str) -> KeyStream {
        let walk = Walk {
            root: self.root.clone(),
            prefix: prefix.to_string(),
            pending: vec![self.root.clone()],
            current: None,
        };

        stream::unfold(walk, |mut walk| async move {
            loop {
                if walk.current.is_none() {
                    let dir = walk.pending.pop()?;
                    match fs::read_dir(&dir).await {
                        Ok(entries) => walk.current = Some(entries),
                        Err(err) => {
                            if err.kind() != ErrorKind::NotFound {
                                warn!("failed to list {}: {}", dir.display(), err);
                            }
                            continue;
                        }
                    }
                }

                let entries = walk.current.as_mut()?;
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => {
                        walk.current = None;
                        continue;
                    }
                    Err(err) => {
                        warn!("failed to read directory entry: {}", err);
                        walk.current = None;
                        continue;
                    }
                };

                let path = entry.path();
                let Some(key) = walk.key_for(&path) else {
                    continue;
                };
                match entry.file_type().await {
                    Ok(kind) if kind.is_dir() => {
                        let dir_prefix = format!("{}/", key);
                        if walk.prefix.starts_with(&dir_prefix) || dir_prefix.starts_with(&walk.prefix) {
                            walk.pending.push(path);
                        }
                    }
                    Ok(kind) if kind.is_file() && key.starts_with(&walk.prefix) => {
                        return Some((key, walk));
                    }
                    _ => {}
                }
            }
        })
        .boxed()
    }
}

/// Depth-first directory walk state for [`FsBackend::keys_with_prefix`]
struct Walk {
    root: PathBuf,
    prefix: String,
    pending: Vec<PathBuf>,
    current: Option<fs::ReadDir>,
}

impl Walk {
    /// The store key for `path`, or `None` for hidden and non UTF-8 entries
    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let segments: Option<Vec<&str>> = relative.iter().map(|s| s.to_str()).collect();
        let segments = segments?;
        if segments.is_empty() || segments.iter().any(|s| s.starts_with('.')) {
            return None;
        }
        Some(segments.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn backend() -> (tempfile::TempDir, FsBackend) {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsBackend::open(dir.path().join("reports")).await.unwrap();
        (dir, backend)
    }

    #[tokio::test]
    async fn write_read_erase_round_trip() {
        let (_dir, backend) = backend().await;
        backend.write("g/one.json", b"{}").await.unwrap();

        assert!(backend.has("g/one.json").await);
        assert_eq!(backend.read("g/one.json").await.unwrap(), b"{}");
        assert!(backend.root().join("g").join("one.json").is_file());

        backend.erase("g/one.json").await.unwrap();
        assert!(!backend.has("g/one.json").await);
        let keys: Vec<String> = backend.keys_with_prefix("g/").await.collect().await;
        assert!(keys.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn erasing_a_group_member_does_not_break_concurrent_writes() {
        let (_dir, backend) = backend().await;
        for i in 0..200 {
            backend.write("g/seed.json", b"seed").await.unwrap();

            let writer = backend.clone();
            let key = format!("g/{}.json", i);
            let write = tokio::spawn(async move { writer.write(&key, b"new").await });
            let eraser = backend.clone();
            let erase = tokio::spawn(async move { eraser.erase("g/seed.json").await });

            write.await.unwrap().unwrap();
            erase.await.unwrap().unwrap();
        }
        let keys: Vec<String> = backend.keys_with_prefix("g/").await.collect().await;
        assert_eq!(keys.len(), 200);
    }

    #[tokio::test]
    async fn missing_keys_are_not_found() {
        let (_dir, backend) = backend().await;
        assert!(matches!(
            backend.read("g/nope.json").await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            backend.erase("g/nope.json").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn traversal_keys_are_rejected() {
        let (_dir, backend) = backend().await;
        assert!(matches!(
            backend.write("../escape", b"x").await,
            Err(StoreError::InvalidKey(_))
        ));
        assert!(!backend.has("../escape").await);
    }

    #[tokio::test]
    async fn prefix_scan_walks_groups_and_skips_temp_files() {
        let (_dir, backend) = backend().await;
        backend.write("a/1.json", b"1").await.unwrap();
        backend.write("a/2.json", b"2").await.unwrap();
        backend.write("ab/3.json", b"3").await.unwrap();
        backend.write("b/4.json", b"4").await.unwrap();
        std::fs::write(backend.root().join("a").join(".tmp-stale"), b"x").unwrap();

        let mut group: Vec<String> = backend.keys_with_prefix("a/").await.collect().await;
        group.sort();
        assert_eq!(group, vec!["a/1.json", "a/2.json"]);

        let mut all: Vec<String> = backend.keys_with_prefix("").await.collect().await;
        all.sort();
        assert_eq!(all, vec!["a/1.json", "a/2.json", "ab/3.json", "b/4.json"]);

        let none: Vec<String> = backend.keys_with_prefix("zzz/").await.collect().await;
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn overwrite_is_idempotent() {
        let (_dir, backend) = backend().await;
        backend.write("g/k.json", b"same").await.unwrap();
        backend.write("g/k.json", b"same").await.unwrap();
        let keys: Vec<String> = backend.keys_with_prefix("g/").await.collect().await;
        assert_eq!(keys, vec!["g/k.json"]);
    }
}
