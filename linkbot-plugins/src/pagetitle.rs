//! Page title announcer: `"{title} - {url}"` for every URL, with long URLs
//! shortened. No memory of earlier posts; see `urlnazi` for that.

use std::sync::Arc;

use linkbot_sdk::bot::{Bot, Context};
use linkbot_sdk::hooks::{HandlerDirectory, HookId};

use crate::conflict;
use crate::links::{Classifier, Shortener, URL_PATTERN};
use crate::reply::OutboundReply;

pub const PLUGIN: &str = "pagetitle";

pub struct PageTitle {
    id: HookId,
    classifier: Classifier,
    shortener: Shortener,
}

impl PageTitle {
    pub fn new(classifier: Classifier, shortener: Shortener) -> Self {
        Self {
            id: HookId::new(PLUGIN, "urls"),
            classifier,
            shortener,
        }
    }

    pub fn id(&self) -> &HookId {
        &self.id
    }

    /// Failures are logged and answered with silence.
    pub async fn handle(&self, url: &str, directory: &dyn HandlerDirectory) -> Option<String> {
        if let Some(owner) = conflict::claimed_by(directory, url, &self.id) {
            tracing::debug!(url, hook = %owner, "URL belongs to another plugin");
            return None;
        }

        let classification = match self.classifier.classify(url).await {
            Ok(c) => c,
            Err(e) => {
                tracing::info!(url, error = %e, "Page title lookup failed");
                return None;
            }
        };

        let display_url = match self.shortener.display_url(url).await {
            Ok(u) => u,
            Err(e) => {
                tracing::warn!(url, error = %e, "Shortening failed");
                return None;
            }
        };

        Some(OutboundReply::new(classification.label(), display_url, None).to_string())
    }
}

/// Register the URL hook with the bot.
pub fn register(bot: &mut Bot, plugin: Arc<PageTitle>) -> Result<(), regex::Error> {
    let id = plugin.id().clone();
    bot.regex(id, URL_PATTERN, move |ctx: Context| {
        let plugin = plugin.clone();
        Box::pin(async move { Ok(plugin.handle(&ctx.args, ctx.directory.as_ref()).await) })
    })
}
