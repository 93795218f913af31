//! Persistence of finished scopes and their sessions
//!
//! A [`FinishedScope`] is stored without its session data; every finished
//! session is stored separately as a [`StoredSession`] indexed by scope id.
//! Loading "with data" reassembles the scope from both.

use crate::scope::FinishedScope;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tcov_model::FinishedSession;
use tcov_store::{Record, StoreClient, StoreResult};

/// A finished session persisted under its scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    /// Record id
    pub id: String,
    /// Owning scope id
    pub scope_id: String,
    /// Session data
    pub data: FinishedSession,
}

impl Record for StoredSession {
    const COLLECTION: &'static str = "stored_session";

    fn id(&self) -> String {
        self.id.clone()
    }

    fn secondary_key(&self) -> Option<String> {
        Some(self.scope_id.clone())
    }
}

/// Store-backed access to finished scopes
#[derive(Debug, Clone)]
pub struct ScopeManager {
    client: StoreClient,
}

impl ScopeManager {
    /// Create manager over a store
    #[inline]
    #[must_use]
    pub fn new(client: StoreClient) -> Self {
        Self { client }
    }

    /// Underlying store
    #[inline]
    #[must_use]
    pub fn client(&self) -> &StoreClient {
        &self.client
    }

    /// Finished scopes of a build, optionally with their sessions
    ///
    /// # Errors
    /// Returns error if the store fails.
    pub async fn by_version(&self, build_version: &str, with_data: bool) -> StoreResult<Vec<FinishedScope>> {
        let scopes: Vec<FinishedScope> = self.client.find_by(build_version).await?;
        if !with_data {
            return Ok(scopes);
        }
        let mut loaded = Vec::with_capacity(scopes.len());
        for scope in scopes {
            loaded.push(self.with_sessions(scope).await?);
        }
        Ok(loaded)
    }

    /// Finished scope by id, with its sessions
    ///
    /// # Errors
    /// Returns error if the store fails.
    pub async fn by_id(&self, scope_id: &str) -> StoreResult<Option<FinishedScope>> {
        match self.client.find_by_id::<FinishedScope>(scope_id).await? {
            Some(scope) => Ok(Some(self.with_sessions(scope).await?)),
            None => Ok(None),
        }
    }

    /// Store a scope record
    ///
    /// Session data carried by `scope` is not written; sessions are stored
    /// one by one with [`store_session`](Self::store_session) as they finish.
    ///
    /// # Errors
    /// Returns error if the store fails.
    pub async fn store(&self, scope: &FinishedScope) -> StoreResult<()> {
        self.client.store(&scope.without_data()).await?;
        tracing::debug!(scope = %scope.id, build = %scope.build_version, "Scope stored");
        Ok(())
    }

    /// Store a finished session of a scope
    ///
    /// # Errors
    /// Returns error if the store fails.
    pub async fn store_session(&self, scope_id: &str, session: &FinishedSession) -> StoreResult<()> {
        let record = StoredSession {
            id: uuid::Uuid::new_v4().to_string(),
            scope_id: scope_id.to_string(),
            data: session.clone(),
        };
        self.client.store(&record).await?;
        tracing::debug!(scope = scope_id, session = %session.id, "Session stored");
        Ok(())
    }

    /// Sessions stored for a scope
    ///
    /// # Errors
    /// Returns error if the store fails.
    pub async fn load_sessions(&self, scope_id: &str) -> StoreResult<Vec<FinishedSession>> {
        let stored: Vec<StoredSession> = self.client.find_by(scope_id).await?;
        Ok(stored.into_iter().map(|s| s.data).collect())
    }

    /// Delete the stored sessions of a scope that is not kept
    ///
    /// # Errors
    /// Returns error if the store fails.
    pub async fn delete_sessions(&self, scope_id: &str) -> StoreResult<usize> {
        self.client.delete_by::<StoredSession>(scope_id).await
    }

    /// Delete a scope and its sessions, returning the scope if it existed
    ///
    /// # Errors
    /// Returns error if the store fails.
    pub async fn delete_by_id(&self, scope_id: &str) -> StoreResult<Option<FinishedScope>> {
        let Some(scope) = self.client.find_by_id::<FinishedScope>(scope_id).await? else {
            return Ok(None);
        };
        let sessions = self.client.delete_by::<StoredSession>(scope_id).await?;
        self.client.delete::<FinishedScope>(scope_id).await?;
        tracing::info!(scope = scope_id, sessions, "Scope deleted");
        Ok(Some(scope))
    }

    /// Delete every scope of a build
    ///
    /// # Errors
    /// Returns error if the store fails.
    pub async fn delete_by_version(&self, build_version: &str) -> StoreResult<usize> {
        let scopes = self.by_version(build_version, false).await?;
        for scope in &scopes {
            self.delete_by_id(&scope.id).await?;
        }
        Ok(scopes.len())
    }

    async fn with_sessions(&self, mut scope: FinishedScope) -> StoreResult<FinishedScope> {
        let mut probes: BTreeMap<String, Vec<FinishedSession>> = BTreeMap::new();
        for session in self.load_sessions(&scope.id).await? {
            probes.entry(session.test_type.clone()).or_default().push(session);
        }
        scope.probes = probes;
        Ok(scope)
    }
}
