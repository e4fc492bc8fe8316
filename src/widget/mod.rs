//! The user selection widget.
//!
//! [`WidgetRenderer`] turns a [`WidgetContext`] into markup: a container with
//! `id="user-switcher"`, one list item per switchable user, the acting user
//! marked `user-switcher-item-active`, and a stop link while impersonating.
//! Rendering never mutates state.
//!
//! [`InjectWidgetLayer`] places the markup into HTML responses; templates can
//! instead call [`UserSwitcher::render_widget`](crate::UserSwitcher::render_widget).

mod inject;
mod render;

pub use inject::{InjectWidgetLayer, InjectWidgetService, inject_before_body_end};
pub use render::{WidgetContext, WidgetRenderer};
