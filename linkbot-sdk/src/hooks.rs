//! Regex hook registry and the active handler directory.
//!
//! Every regex hook is identified by a [`HookId`]. Plugins that need to know
//! which other hooks would react to a piece of text depend only on the
//! [`HandlerDirectory`] trait, never on the registry itself.

use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::bot::{Context, HandlerFuture};

/// Identity of a registered hook: the plugin that owns it plus a hook name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HookId {
    pub plugin: String,
    pub name: String,
}

impl HookId {
    pub fn new(plugin: &str, name: &str) -> Self {
        Self {
            plugin: plugin.to_string(),
            name: name.to_string(),
        }
    }

    /// Whether both hooks come from the same plugin.
    pub fn same_origin(&self, other: &HookId) -> bool {
        self.plugin == other.plugin
    }
}

impl fmt::Display for HookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.plugin, self.name)
    }
}

/// Live view of the URL-reactive hooks currently registered with the host.
pub trait HandlerDirectory: Send + Sync {
    /// Every hook whose pattern matches `text`.
    fn matching_handlers(&self, text: &str) -> Vec<HookId>;
}

pub(crate) type RegexHandler = Arc<dyn Fn(Context) -> HandlerFuture + Send + Sync>;

pub(crate) struct RegexHook {
    pub(crate) id: HookId,
    pub(crate) pattern: Regex,
    pub(crate) handler: RegexHandler,
}

/// All regex hooks registered with a bot.
#[derive(Default)]
pub struct RegexHooks {
    hooks: Vec<RegexHook>,
}

impl RegexHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, hook: RegexHook) {
        self.hooks.push(hook);
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &RegexHook> {
        self.hooks.iter()
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub fn ids(&self) -> Vec<HookId> {
        self.hooks.iter().map(|h| h.id.clone()).collect()
    }
}

impl HandlerDirectory for RegexHooks {
    fn matching_handlers(&self, text: &str) -> Vec<HookId> {
        self.hooks
            .iter()
            .filter(|h| h.pattern.is_match(text))
            .map(|h| h.id.clone())
            .collect()
    }
}

/// A fixed list of `(pattern, id)` pairs.
///
/// Useful for embedders that keep their own handler table, and for tests.
#[derive(Debug, Default, Clone)]
pub struct StaticDirectory {
    entries: Vec<(Regex, HookId)>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, pattern: &str, id: HookId) -> Result<Self, regex::Error> {
        self.entries.push((Regex::new(pattern)?, id));
        Ok(self)
    }
}

impl HandlerDirectory for StaticDirectory {
    fn matching_handlers(&self, text: &str) -> Vec<HookId> {
        self.entries
            .iter()
            .filter(|(re, _)| re.is_match(text))
            .map(|(_, id)| id.clone())
            .collect()
    }
}
