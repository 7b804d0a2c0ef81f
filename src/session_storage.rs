use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::object_store::ObjectStore;

/// Backs up, restores, and deletes a session's local auth directory against
/// the configured object store. The local filesystem is the browser
/// worker's scratch space; the object store is the durable copy a restart
/// or redeploy restores from.
pub struct SessionStorageService {
    store: Arc<dyn ObjectStore>,
    local_root: PathBuf,
}

impl SessionStorageService {
    pub fn new(store: Arc<dyn ObjectStore>, local_root: impl Into<PathBuf>) -> Self {
        Self {
            store,
            local_root: local_root.into(),
        }
    }

    fn local_dir(&self, session_id: &str) -> PathBuf {
        self.local_root.join(session_id)
    }

    fn object_key(&self, session_id: &str) -> String {
        format!("auth/{session_id}.tar")
    }

    /// Tar up the local auth directory (flat, no compression — this is a
    /// small credential blob, not a media archive) and upload it.
    pub async fn backup(&self, session_id: &str) -> Result<(), String> {
        let dir = self.local_dir(session_id);
        if !dir.is_dir() {
            return Err(format!("no local auth directory for session {session_id}"));
        }
        let archive = tar_directory(&dir)?;
        self.store.put(&self.object_key(session_id), archive).await
    }

    /// Download and unpack the auth directory, if one was ever backed up.
    /// Returns `true` if a backup existed and was restored.
    pub async fn restore(&self, session_id: &str) -> Result<bool, String> {
        let key = self.object_key(session_id);
        match self.store.get(&key).await? {
            Some(archive) => {
                let dir = self.local_dir(session_id);
                untar_directory(&dir, &archive)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn exists(&self, session_id: &str) -> Result<bool, String> {
        self.store.exists(&self.object_key(session_id)).await
    }

    /// Remove both the local auth directory and its durable backup.
    pub async fn delete(&self, session_id: &str) -> Result<(), String> {
        let dir = self.local_dir(session_id);
        if dir.is_dir() {
            std::fs::remove_dir_all(&dir).map_err(|e| e.to_string())?;
        }
        self.store.delete(&self.object_key(session_id)).await
    }
}

/// Minimal, dependency-free tar writer that walks the full directory tree —
/// a real WhatsApp-Web auth directory nests files under subdirectories, so a
/// top-level-only walk would silently drop them and break the byte-identical
/// backup/restore round trip. Entries store a POSIX-style relative path
/// (`/`-separated, independent of the host's path separator) so the archive
/// is portable across platforms; symlinks are skipped, not followed.
fn tar_directory(dir: &Path) -> Result<Vec<u8>, String> {
    let mut out = Vec::new();
    walk_dir(dir, dir, &mut out)?;
    Ok(out)
}

fn walk_dir(root: &Path, dir: &Path, out: &mut Vec<u8>) -> Result<(), String> {
    let mut entries: Vec<_> = std::fs::read_dir(dir).map_err(|e| e.to_string())?.collect::<Result<_, _>>().map_err(|e| e.to_string())?;
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let file_type = entry.file_type().map_err(|e| e.to_string())?;
        let path = entry.path();
        if file_type.is_dir() {
            walk_dir(root, &path, out)?;
        } else if file_type.is_file() {
            let rel = path
                .strip_prefix(root)
                .map_err(|e| e.to_string())?
                .components()
                .map(|c| c.as_os_str().to_string_lossy().to_string())
                .collect::<Vec<_>>()
                .join("/");
            let data = std::fs::read(&path).map_err(|e| e.to_string())?;
            out.extend_from_slice(&(rel.len() as u32).to_le_bytes());
            out.extend_from_slice(rel.as_bytes());
            out.extend_from_slice(&(data.len() as u64).to_le_bytes());
            out.extend_from_slice(&data);
        }
        // symlinks: neither followed nor archived
    }
    Ok(())
}

fn untar_directory(dir: &Path, archive: &[u8]) -> Result<(), String> {
    std::fs::create_dir_all(dir).map_err(|e| e.to_string())?;
    let mut cursor = 0usize;
    while cursor + 4 <= archive.len() {
        let name_len = u32::from_le_bytes(archive[cursor..cursor + 4].try_into().unwrap()) as usize;
        cursor += 4;
        let rel = String::from_utf8_lossy(&archive[cursor..cursor + name_len]).to_string();
        cursor += name_len;
        let data_len = u64::from_le_bytes(archive[cursor..cursor + 8].try_into().unwrap()) as usize;
        cursor += 8;
        let data = &archive[cursor..cursor + data_len];
        cursor += data_len;
        let dest = dir.join(rel.split('/').collect::<PathBuf>());
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        std::fs::write(&dest, data).map_err(|e| e.to_string())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tar_round_trip_preserves_nested_tree_byte_identical() {
        let src = std::env::temp_dir().join(format!("wa-gateway-tar-src-{}", uuid::Uuid::new_v4()));
        let dst = std::env::temp_dir().join(format!("wa-gateway-tar-dst-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(src.join("Default/IndexedDB")).unwrap();
        std::fs::write(src.join("Default/Cookies"), b"cookie-bytes").unwrap();
        std::fs::write(src.join("Default/IndexedDB/db.sqlite"), b"nested-bytes").unwrap();
        std::fs::write(src.join("top-level.json"), b"{}").unwrap();

        let archive = tar_directory(&src).unwrap();
        untar_directory(&dst, &archive).unwrap();

        assert_eq!(std::fs::read(dst.join("Default/Cookies")).unwrap(), b"cookie-bytes");
        assert_eq!(std::fs::read(dst.join("Default/IndexedDB/db.sqlite")).unwrap(), b"nested-bytes");
        assert_eq!(std::fs::read(dst.join("top-level.json")).unwrap(), b"{}");

        std::fs::remove_dir_all(&src).ok();
        std::fs::remove_dir_all(&dst).ok();
    }
}
