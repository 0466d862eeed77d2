/// User directory
///
/// Remembers who has started the bot. Only the welcome step reads or writes
/// it; downloads never depend on it.
///
/// ## Usage
///
/// ```rust,ignore
/// use mediagrab::users::{FjallUserStore, UserProfile};
///
/// let store = FjallUserStore::open("data/users")?;
/// store.insert(UserProfile::new(42, Some("ali".into()), None))?;
/// ```

pub mod error;
pub mod keys;
pub mod models;
pub mod store;

pub use error::{Result, UserStoreError};
pub use models::{ProfileUpdate, UserProfile};
pub use store::FjallUserStore;

use async_trait::async_trait;

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user(&self, telegram_id: i64) -> Result<Option<UserProfile>>;

    async fn create_user(&self, profile: UserProfile) -> Result<()>;

    async fn update_user(&self, telegram_id: i64, update: ProfileUpdate) -> Result<UserProfile>;

    async fn user_count(&self) -> Result<usize>;
}
