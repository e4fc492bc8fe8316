//! Switchable users.
//!
//! Applications plug their user store in through [`UserSource`]; the
//! switcher only ever sees users through the [`SwitchableUser`] trait and
//! projects them into [`UserSummary`] values for display.

mod directory;
mod source;

pub use directory::{UserDirectory, UserSummary};
pub use source::{InMemoryUserSource, SwitchableUser, UserRecord, UserSource};
