//! linkbot-sdk: the host side of linkbot.
//!
//! A small async IRC client plus the hook registry plugins are dispatched
//! from. Plugins live in `linkbot-plugins` and only see the types exported
//! here.

pub mod bot;
pub mod client;
pub mod event;
pub mod hooks;
pub mod irc;
