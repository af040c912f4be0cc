//! JSON data files for plugins and framework state.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::DataError;

/// Reads and writes named JSON documents under a data directory.
///
/// A document named `foo` lives at `<root>/foo.json`; the directory is
/// created on first write.
#[derive(Debug, Clone)]
pub struct DataFileSystem {
    root: PathBuf,
}

impl DataFileSystem {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.json"))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.file_path(name).exists()
    }

    pub fn read<T: DeserializeOwned>(&self, name: &str) -> Result<T, DataError> {
        let content = std::fs::read_to_string(self.file_path(name))?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn write<T: Serialize>(&self, name: &str, value: &T) -> Result<(), DataError> {
        std::fs::create_dir_all(&self.root)?;
        let content = serde_json::to_string_pretty(value)?;
        std::fs::write(self.file_path(name), content)?;
        Ok(())
    }
}

/// One remembered player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRecord {
    /// Display name the player last connected with
    pub name: String,
    /// When the player was last observed
    pub last_seen: DateTime<Utc>,
}

const KNOWN_PLAYERS_FILE: &str = "palisade.players";

/// Persistent record of every player the server has ever seen.
///
/// Loaded from the data directory at startup (an absent file means an
/// empty record set) and written back after every change.
pub struct KnownPlayers {
    files: DataFileSystem,
    records: Mutex<HashMap<String, PlayerRecord>>,
}

impl KnownPlayers {
    pub fn load(files: DataFileSystem) -> Self {
        let records = if files.exists(KNOWN_PLAYERS_FILE) {
            match files.read(KNOWN_PLAYERS_FILE) {
                Ok(records) => records,
                Err(err) => {
                    warn!("Failed to load player data, starting fresh: {err}");
                    HashMap::new()
                }
            }
        } else {
            HashMap::new()
        };
        Self {
            files,
            records: Mutex::new(records),
        }
    }

    /// Records that a player was seen under the given display name.
    pub fn observe(&self, id: &str, name: &str) -> Result<(), DataError> {
        let snapshot = {
            let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
            records.insert(
                id.to_string(),
                PlayerRecord {
                    name: name.to_string(),
                    last_seen: Utc::now(),
                },
            );
            records.clone()
        };
        self.files.write(KNOWN_PLAYERS_FILE, &snapshot)
    }

    /// Last display name seen for a player id.
    pub fn name_of(&self, id: &str) -> Option<String> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.get(id).map(|record| record.name.clone())
    }

    pub fn len(&self) -> usize {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for KnownPlayers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnownPlayers")
            .field("root", &self.files.root)
            .field("players", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Homestead {
        owner: String,
        beds: u32,
    }

    #[test]
    fn data_files_round_trip() {
        let dir = tempdir().unwrap();
        let files = DataFileSystem::new(dir.path().join("data"));

        assert!(!files.exists("homestead"));
        let saved = Homestead {
            owner: "ada".to_string(),
            beds: 3,
        };
        files.write("homestead", &saved).unwrap();

        assert!(files.exists("homestead"));
        assert!(dir.path().join("data/homestead.json").exists());
        let loaded: Homestead = files.read("homestead").unwrap();
        assert_eq!(loaded, saved);
    }

    #[test]
    fn reading_missing_file_is_an_io_error() {
        let dir = tempdir().unwrap();
        let files = DataFileSystem::new(dir.path());
        let result: Result<Homestead, _> = files.read("nope");
        assert!(matches!(result, Err(DataError::Io(_))));
    }

    #[test]
    fn known_players_start_empty_without_a_file() {
        let dir = tempdir().unwrap();
        let players = KnownPlayers::load(DataFileSystem::new(dir.path()));
        assert!(players.is_empty());
        assert_eq!(players.name_of("76561197960000001"), None);
    }

    #[test]
    fn observations_persist_across_loads() {
        let dir = tempdir().unwrap();

        let players = KnownPlayers::load(DataFileSystem::new(dir.path()));
        players.observe("76561197960000001", "ada").unwrap();
        players.observe("76561197960000002", "grace").unwrap();

        let reloaded = KnownPlayers::load(DataFileSystem::new(dir.path()));
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.name_of("76561197960000001").as_deref(), Some("ada"));
    }

    #[test]
    fn observing_again_updates_the_name() {
        let dir = tempdir().unwrap();
        let players = KnownPlayers::load(DataFileSystem::new(dir.path()));
        players.observe("76561197960000001", "ada").unwrap();
        players.observe("76561197960000001", "ada_v2").unwrap();

        assert_eq!(players.len(), 1);
        assert_eq!(players.name_of("76561197960000001").as_deref(), Some("ada_v2"));
    }

    #[test]
    fn corrupt_player_data_starts_fresh() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("palisade.players.json"), "{ nope").unwrap();

        let players = KnownPlayers::load(DataFileSystem::new(dir.path()));
        assert!(players.is_empty());
    }
}
