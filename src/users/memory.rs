use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::repo_types::{NewUser, User, UserChanges};
use super::store::{StoreError, UserStore};

/// In-process store with the same uniqueness rules as the `users` table.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<Uuid, User>>,
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == user.email) {
            return Err(StoreError::DuplicateEmail);
        }
        if users.values().any(|u| u.phone == user.phone) {
            return Err(StoreError::DuplicatePhone);
        }
        let now = OffsetDateTime::now_utc();
        let created = User {
            id: Uuid::new_v4(),
            name: user.name,
            email: user.email,
            phone: user.phone,
            password_hash: user.password_hash,
            created_at: now,
            updated_at: now,
        };
        users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update(&self, id: Uuid, changes: UserChanges) -> Result<User, StoreError> {
        let mut users = self.users.write().await;
        let user = users.get_mut(&id).ok_or(StoreError::NotFound)?;
        if let Some(name) = changes.name {
            user.name = name;
        }
        if let Some(hash) = changes.password_hash {
            user.password_hash = hash;
        }
        user.updated_at = OffsetDateTime::now_utc();
        Ok(user.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        self.users
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(email: &str, phone: &str) -> NewUser {
        NewUser {
            name: "Ada".into(),
            email: email.into(),
            phone: phone.into(),
            password_hash: "$argon2id$placeholder".into(),
        }
    }

    #[tokio::test]
    async fn enforces_unique_email_and_phone() {
        let store = MemoryUserStore::default();
        store.create(new_user("a@x.com", "+1")).await.unwrap();

        assert!(matches!(
            store.create(new_user("a@x.com", "+2")).await,
            Err(StoreError::DuplicateEmail)
        ));
        assert!(matches!(
            store.create(new_user("b@x.com", "+1")).await,
            Err(StoreError::DuplicatePhone)
        ));
    }

    #[tokio::test]
    async fn update_and_delete_missing_user() {
        let store = MemoryUserStore::default();
        let id = Uuid::new_v4();
        assert!(matches!(
            store.update(id, UserChanges::default()).await,
            Err(StoreError::NotFound)
        ));
        assert!(matches!(store.delete(id).await, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn delete_frees_email() {
        let store = MemoryUserStore::default();
        let user = store.create(new_user("a@x.com", "+1")).await.unwrap();
        store.delete(user.id).await.unwrap();
        assert!(store.find_by_email("a@x.com").await.unwrap().is_none());
        assert!(store.find_by_id(user.id).await.unwrap().is_none());
        store.create(new_user("a@x.com", "+1")).await.unwrap();
    }
}
