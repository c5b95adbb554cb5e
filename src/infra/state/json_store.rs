use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use crate::core::ctf::{GlobalData, StateStore, StoreError};

/// Single JSON document holding all guild state. Single-writer,
/// single-process; the whole document is rewritten after every mutation.
pub struct JsonStateStore {
    path: PathBuf,
}

impl JsonStateStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl StateStore for JsonStateStore {
    async fn load(&self) -> Result<GlobalData, StoreError> {
        if !self.path.exists() {
            tracing::info!("No state file at {:?}, starting empty", self.path);
            return Ok(GlobalData::default());
        }

        let text = fs::read_to_string(&self.path).await?;
        match serde_json::from_str(&text) {
            Ok(data) => Ok(data),
            Err(e) => {
                tracing::warn!("Could not parse state file {:?}: {}", self.path, e);
                Ok(GlobalData::default())
            }
        }
    }

    async fn save(&self, data: &GlobalData) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let text = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, text).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ctf::{BoardItem, ChallengeBoard, ServerData, Workspace};
    use chrono::{TimeZone, Utc};
    use tempfile::NamedTempFile;

    fn sample_state() -> GlobalData {
        let mut data = GlobalData::default();
        let server = data.servers.entry(42).or_insert_with(ServerData::default);
        server.events.insert(
            12345,
            Workspace {
                join_channel_id: 100,
                logs_channel_id: 101,
                challenges_channel_id: 102,
                general_channel_id: 103,
                join_message_id: Some(900),
                event_start: Some(Utc.with_ymd_and_hms(2022, 7, 30, 17, 0, 0).unwrap()),
            },
        );
        server.archived_events.push(11111);
        server.boards.insert(
            12345,
            ChallengeBoard {
                message_id: Some(901),
                items: vec![
                    BoardItem::Category {
                        name: "pwn".to_string(),
                    },
                    BoardItem::Challenge {
                        name: "heapnote".to_string(),
                        thread_id: 500,
                        solved: true,
                        solver: Some("ada".to_string()),
                    },
                ],
            },
        );
        server
            .reminders
            .insert(100, Utc.with_ymd_and_hms(2022, 7, 30, 16, 0, 0).unwrap());
        server.event_category_id = Some(77);
        data
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_owned();
        drop(tmp);

        let store = JsonStateStore::new(&path);
        let state = sample_state();
        store.save(&state).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, state);
    }

    #[tokio::test]
    async fn missing_file_loads_empty_state() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_owned();
        drop(tmp);

        let store = JsonStateStore::new(&path);
        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, GlobalData::default());
        assert!(loaded.servers.is_empty());
    }

    #[tokio::test]
    async fn corrupt_file_falls_back_to_empty_state() {
        let tmp = NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "{ not json").unwrap();

        let store = JsonStateStore::new(tmp.path());
        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, GlobalData::default());
    }

    #[tokio::test]
    async fn save_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let store = JsonStateStore::new(&path);
        store.save(&sample_state()).await.unwrap();
        assert!(path.exists());
    }
}
