//! Events emitted by the IRC client for the bot layer to consume.

/// Events that the client emits to the consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// TCP (and TLS, if enabled) connection established.
    Connected,

    /// IRC registration complete. `nick` is our confirmed nick.
    Registered {
        nick: String,
    },

    /// Someone (possibly us) joined a channel.
    Joined {
        channel: String,
        nick: String,
    },

    /// Someone left a channel.
    Parted {
        channel: String,
        nick: String,
    },

    /// A PRIVMSG to a channel or to us.
    Message {
        from: String,
        target: String,
        text: String,
    },

    /// A NOTICE from the server or another user.
    Notice {
        from: Option<String>,
        text: String,
    },

    /// Connection was closed.
    Disconnected {
        reason: String,
    },

    /// Raw server line (for debugging).
    RawLine(String),
}
