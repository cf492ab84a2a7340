//! HTTP API for the menu bot

mod handlers;
mod sse;
mod types;

pub use handlers::create_router;

use crate::llm::LlmService;
use crate::runtime::{ActionDispatcher, ChatStore, DispatchConfig, OrderService, SessionRegistry};
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub dispatcher: Arc<ActionDispatcher>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn ChatStore>,
        llm: Arc<dyn LlmService>,
        orders: Arc<dyn OrderService>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new(store)),
            dispatcher: Arc::new(ActionDispatcher::new(llm, orders, config)),
        }
    }
}
