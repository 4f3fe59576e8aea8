//! linkbot-plugins: chat plugins for linkbot.
//!
//! - `urlnazi`: page titles for posted URLs, plus repost call-outs
//! - `pagetitle`: page titles only
//! - `weather`: current weather from OpenWeatherMap

pub mod config;
pub mod conflict;
pub mod links;
pub mod pagetitle;
pub mod registry;
pub mod reply;
pub mod urlnazi;
pub mod weather;
