//! Trait definitions for extensible components
//!
//! Session persistence is pluggable so applications can keep switcher
//! state in whatever backend already holds their sessions.

pub mod session;
