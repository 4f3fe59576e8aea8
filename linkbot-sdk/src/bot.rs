//! Bot framework: command hooks and regex hooks over an IRC connection.
//!
//! ```rust,no_run
//! use linkbot_sdk::bot::Bot;
//! use linkbot_sdk::hooks::HookId;
//!
//! let mut bot = Bot::new(".", "linkbot", "libera");
//! bot.command("ping", "Check if the bot is alive", |_ctx| {
//!     Box::pin(async move { Ok(Some("pong".to_string())) })
//! });
//! bot.regex(HookId::new("shout", "caps"), r"^[A-Z ]{10,}$", |ctx| {
//!     Box::pin(async move { Ok(Some(format!("{}: inside voice please", ctx.sender))) })
//! })
//! .unwrap();
//! ```
//!
//! Each matching hook runs in its own task; a returned `Some(reply)` is sent
//! to the channel (or back to the sender for private commands).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::RwLock;
use regex::Regex;
use tokio::task::JoinHandle;

use crate::client::ClientHandle;
use crate::event::Event;
use crate::hooks::{HandlerDirectory, HookId, RegexHook, RegexHooks};

/// Boxed future returned by hook handlers. `Ok(None)` means "stay quiet".
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Option<String>>> + Send>>;

type CommandHandler = Arc<dyn Fn(Context) -> HandlerFuture + Send + Sync>;

/// Everything a hook handler gets to see about the triggering message.
#[derive(Clone)]
pub struct Context {
    pub handle: ClientHandle,
    /// Configured name of the network this connection belongs to.
    pub network: String,
    /// Channel the message was sent to, or our nick for private messages.
    pub target: String,
    pub sender: String,
    /// Full message text.
    pub text: String,
    /// Command arguments (command hooks) or the first pattern match (regex hooks).
    pub args: String,
    /// The host's active handler directory at call time.
    pub directory: Arc<dyn HandlerDirectory>,
}

impl Context {
    pub fn is_channel(&self) -> bool {
        is_channel(&self.target)
    }

    /// Where replies should go.
    pub fn reply_target(&self) -> &str {
        if self.is_channel() {
            &self.target
        } else {
            &self.sender
        }
    }
}

fn is_channel(target: &str) -> bool {
    target.starts_with('#') || target.starts_with('&')
}

struct CommandHook {
    name: String,
    help: String,
    handler: CommandHandler,
}

/// A bot: a prefix, a set of commands, and a set of regex hooks.
pub struct Bot {
    prefix: String,
    network: String,
    nick: RwLock<String>,
    commands: Vec<CommandHook>,
    regex_hooks: RegexHooks,
}

impl Bot {
    pub fn new(prefix: &str, nick: &str, network: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            network: network.to_string(),
            nick: RwLock::new(nick.to_string()),
            commands: Vec::new(),
            regex_hooks: RegexHooks::new(),
        }
    }

    pub fn nick(&self) -> String {
        self.nick.read().clone()
    }

    /// Register `<prefix><name> [args]`.
    pub fn command<F>(&mut self, name: &str, help: &str, handler: F)
    where
        F: Fn(Context) -> HandlerFuture + Send + Sync + 'static,
    {
        self.commands.push(CommandHook {
            name: name.to_lowercase(),
            help: help.to_string(),
            handler: Arc::new(handler),
        });
    }

    /// Register a hook that fires on channel messages matching `pattern`.
    pub fn regex<F>(&mut self, id: HookId, pattern: &str, handler: F) -> Result<(), regex::Error>
    where
        F: Fn(Context) -> HandlerFuture + Send + Sync + 'static,
    {
        let pattern = Regex::new(pattern)?;
        tracing::debug!(hook = %id, pattern = %pattern, "Registered regex hook");
        self.regex_hooks.push(RegexHook {
            id,
            pattern,
            handler: Arc::new(handler),
        });
        Ok(())
    }

    pub fn regex_hooks(&self) -> &RegexHooks {
        &self.regex_hooks
    }

    /// Feed one client event to the bot.
    ///
    /// Returns the tasks spawned for matching hooks so callers may await them.
    pub fn handle_event(self: &Arc<Self>, handle: &ClientHandle, event: &Event) -> Vec<JoinHandle<()>> {
        match event {
            Event::Registered { nick } => {
                *self.nick.write() = nick.clone();
                Vec::new()
            }
            Event::Message { from, target, text } => self.dispatch(handle, from, target, text),
            _ => Vec::new(),
        }
    }

    fn dispatch(
        self: &Arc<Self>,
        handle: &ClientHandle,
        from: &str,
        target: &str,
        text: &str,
    ) -> Vec<JoinHandle<()>> {
        if from.eq_ignore_ascii_case(&self.nick.read()) {
            return Vec::new();
        }

        let base = Context {
            handle: handle.clone(),
            network: self.network.clone(),
            target: target.to_string(),
            sender: from.to_string(),
            text: text.to_string(),
            args: String::new(),
            directory: self.clone(),
        };

        let mut tasks = Vec::new();

        if let Some(cmd_text) = text.strip_prefix(&self.prefix) {
            let (name, args) = cmd_text.split_once(' ').unwrap_or((cmd_text, ""));
            let name = name.to_lowercase();
            let ctx = Context { args: args.trim().to_string(), ..base.clone() };
            if name == "help" {
                tasks.push(spawn_hook("help".to_string(), ctx, self.help_handler()));
            } else if let Some(cmd) = self.commands.iter().find(|c| c.name == name) {
                tasks.push(spawn_hook(cmd.name.clone(), ctx, cmd.handler.clone()));
            }
        }

        if is_channel(target) {
            for hook in self.regex_hooks.iter() {
                if let Some(m) = hook.pattern.find(text) {
                    let ctx = Context { args: m.as_str().to_string(), ..base.clone() };
                    tasks.push(spawn_hook(hook.id.to_string(), ctx, hook.handler.clone()));
                }
            }
        }

        tasks
    }

    fn help_handler(&self) -> CommandHandler {
        let mut lines: Vec<String> = self
            .commands
            .iter()
            .map(|c| format!("{}{} - {}", self.prefix, c.name, c.help))
            .collect();
        lines.sort();
        let text = if lines.is_empty() {
            "No commands registered".to_string()
        } else {
            lines.join(" | ")
        };
        Arc::new(move |_ctx: Context| -> HandlerFuture {
            let text = text.clone();
            Box::pin(async move { Ok(Some(text)) })
        })
    }
}

impl HandlerDirectory for Bot {
    fn matching_handlers(&self, text: &str) -> Vec<HookId> {
        self.regex_hooks.matching_handlers(text)
    }
}

fn spawn_hook(name: String, ctx: Context, handler: CommandHandler) -> JoinHandle<()> {
    tokio::spawn(async move {
        let handle = ctx.handle.clone();
        let reply_to = ctx.reply_target().to_string();
        match handler(ctx).await {
            Ok(Some(reply)) => {
                if let Err(e) = handle.privmsg(&reply_to, &reply).await {
                    tracing::warn!(hook = %name, error = %e, "Failed to send reply");
                }
            }
            Ok(None) => {}
            Err(e) => tracing::error!(hook = %name, error = %e, "Hook failed"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Command;

    fn message(from: &str, target: &str, text: &str) -> Event {
        Event::Message {
            from: from.into(),
            target: target.into(),
            text: text.into(),
        }
    }

    fn echo_bot() -> Bot {
        let mut bot = Bot::new(".", "linkbot", "testnet");
        bot.command("echo", "Echo arguments", |ctx| {
            Box::pin(async move { Ok(Some(ctx.args)) })
        });
        bot.regex(HookId::new("links", "any"), r"https?://\S+", |ctx| {
            Box::pin(async move { Ok(Some(format!("{} on {} saw {}", ctx.sender, ctx.network, ctx.args))) })
        })
        .unwrap();
        bot
    }

    async fn run(bot: &Arc<Bot>, event: Event) -> Vec<Command> {
        let (handle, mut rx) = ClientHandle::detached(16);
        for task in bot.handle_event(&handle, &event) {
            task.await.unwrap();
        }
        drop(handle);
        let mut sent = Vec::new();
        while let Some(cmd) = rx.recv().await {
            sent.push(cmd);
        }
        sent
    }

    #[tokio::test]
    async fn command_reply_goes_to_channel() {
        let bot = Arc::new(echo_bot());
        let sent = run(&bot, message("alice", "#chan", ".echo hello world")).await;
        assert_eq!(
            sent,
            vec![Command::Privmsg { target: "#chan".into(), text: "hello world".into() }]
        );
    }

    #[tokio::test]
    async fn private_command_replies_to_sender() {
        let bot = Arc::new(echo_bot());
        let sent = run(&bot, message("alice", "linkbot", ".ECHO hi")).await;
        assert_eq!(
            sent,
            vec![Command::Privmsg { target: "alice".into(), text: "hi".into() }]
        );
    }

    #[tokio::test]
    async fn regex_hook_gets_first_match_only() {
        let bot = Arc::new(echo_bot());
        let sent = run(&bot, message("bob", "#chan", "see http://a.example and http://b.example")).await;
        assert_eq!(
            sent,
            vec![Command::Privmsg {
                target: "#chan".into(),
                text: "bob on testnet saw http://a.example".into(),
            }]
        );
    }

    #[tokio::test]
    async fn regex_hooks_ignore_private_messages() {
        let bot = Arc::new(echo_bot());
        assert!(run(&bot, message("bob", "linkbot", "http://a.example")).await.is_empty());
    }

    #[tokio::test]
    async fn own_messages_are_ignored_after_nick_change() {
        let bot = Arc::new(echo_bot());
        let (handle, _rx) = ClientHandle::detached(1);
        bot.handle_event(&handle, &Event::Registered { nick: "linkbot1".into() });
        assert_eq!(bot.nick(), "linkbot1");
        assert!(run(&bot, message("LinkBot1", "#chan", ".echo x")).await.is_empty());
    }

    #[tokio::test]
    async fn help_lists_commands() {
        let bot = Arc::new(echo_bot());
        let sent = run(&bot, message("alice", "#chan", ".help")).await;
        assert_eq!(
            sent,
            vec![Command::Privmsg { target: "#chan".into(), text: ".echo - Echo arguments".into() }]
        );
    }

    #[tokio::test]
    async fn quiet_and_failing_hooks_send_nothing() {
        let mut bot = Bot::new("!", "linkbot", "testnet");
        bot.regex(HookId::new("a", "quiet"), "x", |_ctx| Box::pin(async { Ok(None) }))
            .unwrap();
        bot.regex(HookId::new("b", "boom"), "x", |_ctx| {
            Box::pin(async { anyhow::bail!("boom") })
        })
        .unwrap();
        let bot = Arc::new(bot);
        assert!(run(&bot, message("alice", "#chan", "x")).await.is_empty());
    }

    #[test]
    fn bot_is_a_handler_directory() {
        let bot = echo_bot();
        assert_eq!(
            bot.matching_handlers("https://example.com"),
            vec![HookId::new("links", "any")]
        );
        assert!(bot.matching_handlers("nothing").is_empty());
    }
}
