//! Shared application state (§4.0's `Root`): one `Arc`-wrapped struct handed
//! to every Axum handler via `State` and to every background worker's
//! constructor, instead of a global singleton — the explicit-injection shape
//! the teacher's `main.rs` already uses for its `PgPool`/chain clients.

use crate::chain::ChainClient;
use crate::clock::Clock;
use crate::config::{Config, JwtConfig, MasterKey, SecurityConfig};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState(Arc<Inner>);

struct Inner {
    db: PgPool,
    jwt: JwtConfig,
    master_key: MasterKey,
    security: SecurityConfig,
    clock: Arc<dyn Clock>,
    chain_clients: HashMap<Uuid, Arc<dyn ChainClient>>,
}

impl AppState {
    pub fn new(
        config: &Config,
        db: PgPool,
        clock: Arc<dyn Clock>,
        chain_clients: HashMap<Uuid, Arc<dyn ChainClient>>,
    ) -> Self {
        Self(Arc::new(Inner {
            db,
            jwt: config.jwt.clone(),
            master_key: config.master_key.clone(),
            security: config.security.clone(),
            clock,
            chain_clients,
        }))
    }

    pub fn db(&self) -> &PgPool {
        &self.0.db
    }

    pub fn jwt(&self) -> &JwtConfig {
        &self.0.jwt
    }

    pub fn master_key(&self) -> &MasterKey {
        &self.0.master_key
    }

    pub fn security(&self) -> &SecurityConfig {
        &self.0.security
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.0.clock
    }

    pub fn chain_client(&self, chain_id: Uuid) -> Option<Arc<dyn ChainClient>> {
        self.0.chain_clients.get(&chain_id).cloned()
    }
}
