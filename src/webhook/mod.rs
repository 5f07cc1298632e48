//! Webhook receiver for GitLab system and push hooks.

pub mod dispatch;
pub mod event;
pub mod server;

pub use dispatch::{Dispatcher, Outcome};
pub use event::{Event, EventKind};
pub use server::router;
