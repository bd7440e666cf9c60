use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::models::{normalize_email, Identity, Role};
use crate::utils::PasswordHashString;

/// Read access to identities plus credential storage, provided by the
/// surrounding entity store.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<Identity>>;

    async fn find_by_id(&self, identity_id: &str) -> anyhow::Result<Option<Identity>>;

    async fn credential_for(&self, identity_id: &str)
        -> anyhow::Result<Option<PasswordHashString>>;

    async fn update_credential(
        &self,
        identity_id: &str,
        password_hash: PasswordHashString,
    ) -> anyhow::Result<()>;
}

/// DashMap-backed directory for development, bootstrap and tests.
#[derive(Default)]
pub struct InMemoryIdentityDirectory {
    identities: DashMap<String, Identity>,
    by_email: DashMap<String, String>,
    credentials: DashMap<String, PasswordHashString>,
}

impl InMemoryIdentityDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an identity with an already hashed password. Replaces any identity
    /// registered under the same email.
    pub fn register(
        &self,
        display_name: &str,
        email: &str,
        role: Role,
        password_hash: PasswordHashString,
    ) -> Identity {
        let email = normalize_email(email);
        let identity = Identity {
            id: Uuid::new_v4().to_string(),
            display_name: display_name.to_string(),
            email: email.clone(),
            role,
            active: true,
        };

        if let Some((_, previous)) = self.by_email.remove(&email) {
            self.identities.remove(&previous);
            self.credentials.remove(&previous);
        }

        self.by_email.insert(email, identity.id.clone());
        self.credentials.insert(identity.id.clone(), password_hash);
        self.identities.insert(identity.id.clone(), identity.clone());
        identity
    }

    pub fn set_active(&self, identity_id: &str, active: bool) -> bool {
        match self.identities.get_mut(identity_id) {
            Some(mut identity) => {
                identity.active = active;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

#[async_trait]
impl IdentityDirectory for InMemoryIdentityDirectory {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<Identity>> {
        let email = normalize_email(email);
        let identity = self
            .by_email
            .get(&email)
            .and_then(|id| self.identities.get(id.value()).map(|i| i.clone()));
        Ok(identity)
    }

    async fn find_by_id(&self, identity_id: &str) -> anyhow::Result<Option<Identity>> {
        Ok(self.identities.get(identity_id).map(|i| i.clone()))
    }

    async fn credential_for(
        &self,
        identity_id: &str,
    ) -> anyhow::Result<Option<PasswordHashString>> {
        Ok(self.credentials.get(identity_id).map(|h| h.clone()))
    }

    async fn update_credential(
        &self,
        identity_id: &str,
        password_hash: PasswordHashString,
    ) -> anyhow::Result<()> {
        if !self.identities.contains_key(identity_id) {
            anyhow::bail!("Unknown identity {}", identity_id);
        }
        self.credentials
            .insert(identity_id.to_string(), password_hash);
        Ok(())
    }
}
