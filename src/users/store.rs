use std::path::Path;

use async_trait::async_trait;
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use tracing::{debug, info};

use super::error::{Result, UserStoreError};
use super::keys::{decode_user_key, encode_user_key};
use super::models::{ProfileUpdate, UserProfile};
use super::UserDirectory;

/// Fjall-backed user directory
#[derive(Clone)]
pub struct FjallUserStore {
    keyspace: Keyspace,
    users: PartitionHandle,
}

impl FjallUserStore {
    /// Open or create a store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening user store at: {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open()?;
        let users = keyspace.open_partition("users", PartitionCreateOptions::default())?;

        Ok(Self { keyspace, users })
    }

    pub fn get(&self, telegram_id: i64) -> Result<Option<UserProfile>> {
        match self.users.get(encode_user_key(telegram_id))? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    fn put(&self, profile: &UserProfile) -> Result<()> {
        let value = serde_json::to_vec(profile)?;
        self.users
            .insert(encode_user_key(profile.telegram_id), value)?;
        Ok(())
    }

    pub fn insert(&self, profile: UserProfile) -> Result<()> {
        if self.users.contains_key(encode_user_key(profile.telegram_id))? {
            return Err(UserStoreError::AlreadyExists(profile.telegram_id));
        }
        self.put(&profile)?;
        debug!(telegram_id = profile.telegram_id, "User created");
        Ok(())
    }

    pub fn update(&self, telegram_id: i64, update: ProfileUpdate) -> Result<UserProfile> {
        let mut profile = self
            .get(telegram_id)?
            .ok_or(UserStoreError::NotFound(telegram_id))?;
        profile.apply(update);
        self.put(&profile)?;
        debug!(telegram_id, "User updated");
        Ok(profile)
    }

    /// Ids of every stored user
    pub fn ids(&self) -> Result<Vec<i64>> {
        let mut ids = Vec::new();
        for item in self.users.keys() {
            if let Some(id) = decode_user_key(&item?) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.ids()?.len())
    }

    /// Persist all pending writes to disk
    pub fn persist(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for FjallUserStore {
    async fn get_user(&self, telegram_id: i64) -> Result<Option<UserProfile>> {
        self.get(telegram_id)
    }

    async fn create_user(&self, profile: UserProfile) -> Result<()> {
        self.insert(profile)
    }

    async fn update_user(&self, telegram_id: i64, update: ProfileUpdate) -> Result<UserProfile> {
        self.update(telegram_id, update)
    }

    async fn user_count(&self) -> Result<usize> {
        self.count()
    }
}
