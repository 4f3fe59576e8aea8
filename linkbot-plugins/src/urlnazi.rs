//! URL repost tracker.
//!
//! Replies to URLs with the page title (or content type) and a short link
//! for long URLs. Remembers who posted each URL first on a channel and calls
//! out reposts by other users. URLs another plugin has a hook for are still
//! remembered but not answered, so reposts get flagged once that plugin is
//! gone.

use std::sync::Arc;

use chrono::Utc;
use linkbot_sdk::bot::{Bot, Context};
use linkbot_sdk::hooks::{HandlerDirectory, HookId};

use crate::conflict;
use crate::links::{Classifier, Shortener, URL_PATTERN};
use crate::registry::{FirstSeenStore, UrlRecord};
use crate::reply::{OutboundReply, RepostAnnotation};

pub const PLUGIN: &str = "urlnazi";

/// A matched URL and where it was posted.
#[derive(Debug, Clone, Copy)]
pub struct UrlMessage<'a> {
    pub network: &'a str,
    pub channel: &'a str,
    pub nick: &'a str,
    pub url: &'a str,
}

pub struct UrlNazi {
    id: HookId,
    classifier: Classifier,
    shortener: Shortener,
    registry: Arc<dyn FirstSeenStore>,
    fallback_to_long_url: bool,
}

impl UrlNazi {
    pub fn new(
        classifier: Classifier,
        shortener: Shortener,
        registry: Arc<dyn FirstSeenStore>,
        fallback_to_long_url: bool,
    ) -> Self {
        Self {
            id: hook_id(),
            classifier,
            shortener,
            registry,
            fallback_to_long_url,
        }
    }

    pub fn id(&self) -> &HookId {
        &self.id
    }

    /// Handle one URL. `None` means nothing should be said.
    pub async fn handle(&self, msg: UrlMessage<'_>, directory: &dyn HandlerDirectory) -> Option<String> {
        let classification = match self.classifier.classify(msg.url).await {
            Ok(c) => c,
            Err(e) => {
                tracing::info!(url = %msg.url, error = %e, "Classification failed");
                return Some(e.reply(msg.url));
            }
        };

        let repost = self
            .remember(msg)
            .and_then(|record| RepostAnnotation::for_repost(&record, msg.nick));

        // Checked after recording so the URL is remembered either way.
        if let Some(owner) = conflict::claimed_by(directory, msg.url, &self.id) {
            tracing::debug!(url = %msg.url, hook = %owner, "URL belongs to another plugin");
            return None;
        }

        let display_url = match self.shortener.display_url(msg.url).await {
            Ok(u) => u,
            Err(e) if self.fallback_to_long_url => {
                tracing::warn!(url = %msg.url, error = %e, "Shortening failed, using long URL");
                msg.url.to_string()
            }
            Err(e) => {
                tracing::warn!(url = %msg.url, error = %e, "Shortening failed");
                return Some(format!("{}: failed to shorten URL", msg.url));
            }
        };

        let reply = OutboundReply::new(classification.label(), display_url, repost);
        Some(reply.to_string())
    }

    /// The earlier record for this URL, recording this post if it is the first.
    fn remember(&self, msg: UrlMessage<'_>) -> Option<UrlRecord> {
        let existing = match self.registry.find(msg.network, msg.channel, msg.url) {
            Ok(found) => found,
            Err(e) => {
                tracing::error!(url = %msg.url, error = %e, "Registry lookup failed");
                return None;
            }
        };
        if existing.is_some() {
            return existing;
        }

        match self
            .registry
            .insert_if_absent(msg.network, msg.channel, msg.nick, msg.url, Utc::now())
        {
            Ok(true) => None,
            // Lost a race with a concurrent first post: report the winner.
            Ok(false) => self.registry.find(msg.network, msg.channel, msg.url).ok().flatten(),
            Err(e) => {
                tracing::warn!(url = %msg.url, error = %e, "Could not record URL");
                None
            }
        }
    }
}

pub fn hook_id() -> HookId {
    HookId::new(PLUGIN, "urls")
}

/// Register the URL hook with the bot.
pub fn register(bot: &mut Bot, plugin: Arc<UrlNazi>) -> Result<(), regex::Error> {
    let id = plugin.id().clone();
    bot.regex(id, URL_PATTERN, move |ctx: Context| {
        let plugin = plugin.clone();
        Box::pin(async move {
            let msg = UrlMessage {
                network: &ctx.network,
                channel: &ctx.target,
                nick: &ctx.sender,
                url: &ctx.args,
            };
            Ok(plugin.handle(msg, ctx.directory.as_ref()).await)
        })
    })
}
