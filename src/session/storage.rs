use log::warn;
use std::fs;
use std::io;
use std::path::{ Path, PathBuf };

/// Minimal durable key/value store: one file per key under a state
/// directory. Writes go through a tmp file and a rename so a crash never
/// leaves a half-written value behind.
pub struct SessionStorage {
    root: PathBuf,
}

impl SessionStorage {
    pub fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let path = self.key_path(key);
        match fs::read_to_string(&path) {
            Ok(value) => {
                let value = value.trim().to_string();
                if value.is_empty() { None } else { Some(value) }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!("failed to read state key '{}' from {}: {}", key, path.display(), e);
                None
            }
        }
    }

    pub fn put(&self, key: &str, value: &str) -> io::Result<()> {
        let final_path = self.key_path(key);
        let tmp_path = self.root.join(format!("{}.tmp", key));
        fs::write(&tmp_path, value)?;
        fs::rename(&tmp_path, &final_path)?;
        Ok(())
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

/// Platform state directory for the client, e.g. `~/.local/share/parlor`.
pub fn default_state_dir() -> PathBuf {
    dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join("parlor")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_key_reads_as_none() {
        let dir = tempdir().unwrap();
        let storage = SessionStorage::open(dir.path()).unwrap();
        assert_eq!(storage.get("chat_session_id"), None);
    }

    #[test]
    fn put_then_get_round_trips() {
        let dir = tempdir().unwrap();
        let storage = SessionStorage::open(dir.path()).unwrap();
        storage.put("chat_session_id", "1700000000000-ab12cd34").unwrap();
        assert_eq!(storage.get("chat_session_id").as_deref(), Some("1700000000000-ab12cd34"));
    }

    #[test]
    fn put_overwrites_previous_value() {
        let dir = tempdir().unwrap();
        let storage = SessionStorage::open(dir.path()).unwrap();
        storage.put("chat_session_id", "old").unwrap();
        storage.put("chat_session_id", "new").unwrap();
        assert_eq!(storage.get("chat_session_id").as_deref(), Some("new"));
    }

    #[test]
    fn blank_file_reads_as_none() {
        let dir = tempdir().unwrap();
        let storage = SessionStorage::open(dir.path()).unwrap();
        storage.put("chat_session_id", "  \n").unwrap();
        assert_eq!(storage.get("chat_session_id"), None);
    }
}
