//! Session handling for the switcher.
//!
//! [`SessionLayer`] loads the caller's session from a
//! [`SessionStore`](crate::traits::session::SessionStore), exposes it to the
//! rest of the stack as a [`SessionHandle`] request extension and persists it
//! once the response has been produced.

mod config;
mod handle;
mod in_memory;
mod layer;

pub use config::SessionConfig;
pub use handle::{Session, SessionHandle};
pub use in_memory::InMemorySessionStore;
pub use layer::{SessionLayer, SessionService};
