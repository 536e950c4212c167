// src/state.rs

use crate::config::Config;
use axum::extract::FromRef;
use sqlx::PgPool;

/// Shared application state: the Postgres pool all session, grading and
/// analytics queries run through, plus the runtime configuration the auth
/// middleware reads the JWT secret from.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
}

// FromRef lets handlers extract `State<PgPool>` or `State<Config>` directly
// instead of taking the whole state.
impl FromRef<AppState> for PgPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
