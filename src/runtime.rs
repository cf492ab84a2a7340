//! Orchestration runtime: sessions, actions and their collaborators

mod dispatcher;
mod session;
pub mod traits;

#[cfg(test)]
pub mod testing;

#[cfg(test)]
mod scenarios;

pub use dispatcher::{ActionDispatcher, DispatchConfig, DispatchError, PurchaseOrder};
pub use session::{SessionContext, SessionRegistry};
pub use traits::*;
