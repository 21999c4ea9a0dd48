use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::{Profile, TrackedUser};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Why a directory mutation was refused.
#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("already exists")]
    AlreadyExists,

    #[error("not found")]
    NotFound,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

struct DirectoryState {
    /// Active IDs in insertion order. An ID appears at most once.
    active: Vec<String>,
    /// Full records, soft-removed ones included.
    complete: Vec<TrackedUser>,
}

/// File-backed directory of tracked user IDs with soft-deleted history.
///
/// Two JSON documents live under the data dir: `users.json` (active ID
/// strings) and `allusers.json` (full [`TrackedUser`] records). Every
/// mutation rewrites the documents in full: the new content is written to a
/// temp file, fsynced, then renamed into place.
///
/// All operations take the one state lock, so the check-then-insert of the
/// add path is atomic against concurrent adds.
pub struct FileDirectory {
    users_file: PathBuf,
    complete_file: PathBuf,
    temp_dir: PathBuf,
    state: Mutex<DirectoryState>,
}

impl FileDirectory {
    /// Open the directory under `data_dir`, creating missing documents.
    /// Corrupt documents are an error, not a silent reset.
    pub fn open(data_dir: &Path) -> Result<Self, StorageError> {
        fs::create_dir_all(data_dir)?;

        let temp_dir = data_dir.join(".temp");
        fs::create_dir_all(&temp_dir)?;
        clean_dir(&temp_dir)?;

        let users_file = data_dir.join("users.json");
        let complete_file = data_dir.join("allusers.json");

        let active: Vec<String> = load_or_init(&users_file)?;
        let complete: Vec<TrackedUser> = load_or_init(&complete_file)?;

        tracing::info!(
            users = active.len(),
            records = complete.len(),
            path = %data_dir.display(),
            "loaded user directory"
        );

        Ok(Self {
            users_file,
            complete_file,
            temp_dir,
            state: Mutex::new(DirectoryState { active, complete }),
        })
    }

    /// Active IDs in insertion order.
    pub async fn list_active(&self) -> Vec<String> {
        self.state.lock().await.active.clone()
    }

    pub async fn is_active(&self, id: &str) -> bool {
        self.state.lock().await.active.iter().any(|u| u == id)
    }

    /// All records, soft-removed ones included. Audit/history view.
    pub async fn complete(&self) -> Vec<TrackedUser> {
        self.state.lock().await.complete.clone()
    }

    /// Track `id`. Fails with `AlreadyExists` if it is already active.
    /// Re-adding a soft-removed ID restores it, clearing the removal
    /// markers and restamping `addedAt`.
    pub async fn add(&self, id: &str, username: &str) -> Result<TrackedUser, DirectoryError> {
        let mut state = self.state.lock().await;

        if state.active.iter().any(|u| u == id) {
            return Err(DirectoryError::AlreadyExists);
        }
        state.active.push(id.to_string());

        let record = TrackedUser {
            id: id.to_string(),
            username: username.to_string(),
            added_at: Utc::now(),
            removed: false,
            removed_at: None,
        };
        match state.complete.iter().position(|u| u.id == id) {
            Some(idx) => state.complete[idx] = record.clone(),
            None => state.complete.push(record.clone()),
        }

        self.persist(&state)?;
        Ok(record)
    }

    /// Mark an active ID as removed. Fails with `NotFound` if the ID is not
    /// active, including IDs that were already removed.
    pub async fn remove(&self, id: &str) -> Result<TrackedUser, DirectoryError> {
        let mut state = self.state.lock().await;

        let before = state.active.len();
        state.active.retain(|u| u != id);
        if state.active.len() == before {
            return Err(DirectoryError::NotFound);
        }

        let now = Utc::now();
        let record = match state.complete.iter().position(|u| u.id == id) {
            Some(idx) => {
                let existing = &mut state.complete[idx];
                existing.removed = true;
                existing.removed_at = Some(now);
                existing.clone()
            }
            None => {
                // The complete document can lag the active list; record a
                // tombstone so the removal still leaves a trace.
                let tombstone = TrackedUser {
                    id: id.to_string(),
                    username: String::new(),
                    added_at: now,
                    removed: true,
                    removed_at: Some(now),
                };
                state.complete.push(tombstone.clone());
                tombstone
            }
        };

        self.persist(&state)?;
        Ok(record)
    }

    /// Refresh cached usernames after a profile fetch. `addedAt` and the
    /// removal markers are left untouched; unknown IDs are ignored.
    pub async fn update_usernames(&self, profiles: &[Profile]) -> Result<(), StorageError> {
        let mut state = self.state.lock().await;
        let mut changed = false;

        for profile in profiles {
            let id = profile.id.to_string();
            if let Some(record) = state.complete.iter_mut().find(|u| u.id == id) {
                if record.username != profile.username {
                    tracing::debug!(
                        id = %id,
                        old = %record.username,
                        new = %profile.username,
                        "username changed upstream"
                    );
                    record.username = profile.username.clone();
                    changed = true;
                }
            }
        }

        if changed {
            self.write_document(&self.complete_file, &state.complete)?;
        }
        Ok(())
    }

    fn persist(&self, state: &DirectoryState) -> Result<(), StorageError> {
        self.write_document(&self.users_file, &state.active)?;
        self.write_document(&self.complete_file, &state.complete)
    }

    fn write_document<T: Serialize>(&self, target: &Path, value: &T) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(value)?;
        let temp_file = self.temp_file_for(target);

        {
            let mut file = fs::File::create(&temp_file)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&temp_file, target)?;

        Ok(())
    }

    fn temp_file_for(&self, target: &Path) -> PathBuf {
        let random_string = Uuid::new_v4().to_string()[..8].to_string();
        let filename = target
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        let temp_filename = filename.replace(".json", &format!(".TEMP-{random_string}.json"));
        self.temp_dir.join(temp_filename)
    }
}

fn load_or_init<T>(path: &Path) -> Result<T, StorageError>
where
    T: serde::de::DeserializeOwned + Serialize + Default,
{
    if path.exists() {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    } else {
        let value = T::default();
        fs::write(path, serde_json::to_string_pretty(&value)?)?;
        Ok(value)
    }
}

fn clean_dir(dir: &Path) -> Result<(), StorageError> {
    for entry in fs::read_dir(dir)? {
        fs::remove_file(entry?.path())?;
    }
    Ok(())
}
