//! Volley server - task delegation for group chats
//!
//! Routes a "someone, do X" request to one teammate at a time until
//! somebody accepts it.

pub mod chat;
pub mod engine;
pub mod error;
pub mod messages;
pub mod models;
pub mod scheduler;
pub mod server;
pub mod slack;
pub mod store;

use std::sync::Arc;

use crate::engine::Engine;

/// Application state shared across handlers
pub struct AppState {
    pub engine: Arc<Engine>,
    pub verification_token: String,
}

impl AppState {
    pub fn new(engine: Arc<Engine>, verification_token: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            engine,
            verification_token: verification_token.into(),
        })
    }
}
