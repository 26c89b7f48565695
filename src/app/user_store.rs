use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use tokio::fs;
use tokio::sync::Mutex;

use crate::app::model::NovelProgress;
use crate::app::novel_store::read_json;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    pub username: String,
    salt: String,
    password_sha256: String,
    pub created_at: DateTime<Utc>,
    /// Novel name to last chapter read.
    #[serde(default)]
    pub progress: BTreeMap<String, u32>,
}

impl UserAccount {
    pub fn new(username: &str, password: &str) -> Self {
        let salt = uuid::Uuid::new_v4().simple().to_string();
        let password_sha256 = password_digest(&salt, password);
        Self {
            username: username.to_owned(),
            salt,
            password_sha256,
            created_at: Utc::now(),
            progress: BTreeMap::new(),
        }
    }

    pub fn verify_password(&self, password: &str) -> bool {
        password_digest(&self.salt, password) == self.password_sha256
    }

    pub fn progress_list(&self) -> Vec<NovelProgress> {
        self.progress
            .iter()
            .map(|(novel_name, last)| NovelProgress {
                novel_name: novel_name.clone(),
                last_chapter_read: *last,
            })
            .collect()
    }
}

fn password_digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user(&self, username: &str) -> anyhow::Result<Option<UserAccount>>;
    /// Returns `false` when the username is taken.
    async fn create_user(&self, username: &str, password: &str) -> anyhow::Result<bool>;
    /// Upserts one novel's progress. Returns `false` for an unknown user.
    async fn save_progress(
        &self,
        username: &str,
        novel_name: &str,
        last_chapter_read: u32,
    ) -> anyhow::Result<bool>;
}

#[derive(Debug)]
pub struct LocalFsUserStore {
    base_dir: PathBuf,
    lock: Mutex<()>,
}

impl LocalFsUserStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            lock: Mutex::new(()),
        }
    }

    /// File names are digests so arbitrary usernames never reach the path.
    fn user_json_path(&self, username: &str) -> PathBuf {
        let key = hex::encode(Sha256::digest(username.as_bytes()));
        self.base_dir.join("users").join(format!("{key}.json"))
    }

    async fn read_user(&self, username: &str) -> anyhow::Result<Option<UserAccount>> {
        let path = self.user_json_path(username);
        read_json(&path)
            .await
            .with_context(|| format!("read: {}", path.display()))
    }
}

#[async_trait]
impl UserStore for LocalFsUserStore {
    async fn get_user(&self, username: &str) -> anyhow::Result<Option<UserAccount>> {
        self.read_user(username).await
    }

    async fn create_user(&self, username: &str, password: &str) -> anyhow::Result<bool> {
        let _guard = self.lock.lock().await;
        if self.read_user(username).await?.is_some() {
            return Ok(false);
        }
        let account = UserAccount::new(username, password);
        write_json_atomic(&self.user_json_path(username), &account)
            .await
            .context("write user")?;
        tracing::info!(username, "registered user");
        Ok(true)
    }

    async fn save_progress(
        &self,
        username: &str,
        novel_name: &str,
        last_chapter_read: u32,
    ) -> anyhow::Result<bool> {
        let _guard = self.lock.lock().await;
        let Some(mut account) = self.read_user(username).await? else {
            return Ok(false);
        };
        account
            .progress
            .insert(novel_name.to_owned(), last_chapter_read);
        write_json_atomic(&self.user_json_path(username), &account)
            .await
            .context("write user")?;
        tracing::debug!(username, novel_name, last_chapter_read, "saved progress");
        Ok(true)
    }
}

async fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent)
        .await
        .with_context(|| format!("create parent dir: {}", parent.display()))?;

    let tmp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    let data = serde_json::to_vec_pretty(value).context("serialize json")?;
    fs::write(&tmp_path, &data)
        .await
        .with_context(|| format!("write tmp: {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("rename tmp to final: {}", path.display()))?;
    Ok(())
}
