//! In-memory token storage implementation.

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{GatewayToken, InsertOutcome, NewGatewayToken, StoreError, TokenOwner, TokenStore};

#[derive(Debug, Clone)]
struct OwnerRow {
    owner: TokenOwner,
    deleted: bool,
}

#[derive(Debug, Clone)]
struct TokenRow {
    token: GatewayToken,
    unlimited_quota: bool,
    created_time: i64,
    deleted: bool,
}

#[derive(Debug, Default)]
struct Tables {
    owners: Vec<OwnerRow>,
    tokens: Vec<TokenRow>,
}

/// In-memory token store for testing and development.
///
/// This store is not persistent; data is lost when the process exits.
///
/// # Thread Safety
///
/// The conditional insert runs under a single write lock, which makes it
/// atomic for all callers sharing this instance.
#[derive(Default)]
pub struct MemoryTokenStore {
    tables: RwLock<Tables>,
}

impl MemoryTokenStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a live user and return its ID.
    pub fn add_owner(&self, external_subject_id: impl Into<String>) -> i64 {
        let mut tables = self.tables.write();
        let id = tables.owners.len() as i64 + 1;
        let external_subject_id = external_subject_id.into();
        tables.owners.push(OwnerRow {
            owner: TokenOwner {
                id,
                username: Some(format!("user{}", id)),
                external_subject_id,
            },
            deleted: false,
        });
        id
    }

    /// Soft-delete a user.
    pub fn delete_owner(&self, owner_id: i64) {
        let mut tables = self.tables.write();
        for row in tables.owners.iter_mut().filter(|r| r.owner.id == owner_id) {
            row.deleted = true;
        }
    }

    /// Soft-delete a token, as an external revocation would.
    pub fn revoke_token(&self, token_id: i64) {
        let mut tables = self.tables.write();
        for row in tables.tokens.iter_mut().filter(|r| r.token.id == token_id) {
            row.deleted = true;
        }
    }

    /// Number of live tokens for an owner and name.
    pub fn live_token_count(&self, owner_id: i64, name: &str) -> usize {
        self.tables
            .read()
            .tokens
            .iter()
            .filter(|r| !r.deleted && r.token.owner_id == owner_id && r.token.name == name)
            .count()
    }

    /// Whether the live token was stored with unlimited quota, and its creation time.
    pub fn token_attributes(&self, token_id: i64) -> Option<(bool, i64)> {
        self.tables
            .read()
            .tokens
            .iter()
            .find(|r| r.token.id == token_id)
            .map(|r| (r.unlimited_quota, r.created_time))
    }
}

impl std::fmt::Debug for MemoryTokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tables = self.tables.read();
        f.debug_struct("MemoryTokenStore")
            .field("owners_count", &tables.owners.len())
            .field("tokens_count", &tables.tokens.len())
            .finish()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn find_owner(
        &self,
        external_subject_id: &str,
    ) -> Result<Option<TokenOwner>, StoreError> {
        Ok(self
            .tables
            .read()
            .owners
            .iter()
            .find(|r| !r.deleted && r.owner.external_subject_id == external_subject_id)
            .map(|r| r.owner.clone()))
    }

    async fn insert_token_if_absent(
        &self,
        token: &NewGatewayToken,
    ) -> Result<InsertOutcome, StoreError> {
        let mut tables = self.tables.write();
        let exists = tables
            .tokens
            .iter()
            .any(|r| !r.deleted && r.token.owner_id == token.owner_id && r.token.name == token.name);
        if exists {
            return Ok(InsertOutcome::AlreadyExists);
        }

        let id = tables.tokens.len() as i64 + 1;
        tables.tokens.push(TokenRow {
            token: GatewayToken {
                id,
                owner_id: token.owner_id,
                name: token.name.clone(),
                group: Some(token.group.clone()),
                secret: token.secret.clone(),
            },
            unlimited_quota: token.unlimited_quota,
            created_time: token.created_time,
            deleted: false,
        });
        Ok(InsertOutcome::Created)
    }

    async fn find_token(
        &self,
        owner_id: i64,
        name: &str,
    ) -> Result<Option<GatewayToken>, StoreError> {
        Ok(self
            .tables
            .read()
            .tokens
            .iter()
            .find(|r| !r.deleted && r.token.owner_id == owner_id && r.token.name == name)
            .map(|r| r.token.clone()))
    }
}
