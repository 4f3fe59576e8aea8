//! Async IRC client.
//!
//! Manages the TCP (optionally TLS) connection, IRC registration, keep-alive
//! and emits [`Event`]s. Consumers talk back through a cloneable
//! [`ClientHandle`].
//!
//! Use [`run_with_reconnect`] for long-running bots: it re-establishes the
//! connection with exponential backoff and rejoins channels.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls;
use tokio_util::codec::{AnyDelimiterCodec, FramedRead};

use crate::event::Event;
use crate::irc::Message;

/// Configuration for connecting to an IRC server.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// Server address (host:port).
    pub server_addr: String,
    /// Desired nickname.
    pub nick: String,
    /// Username (ident).
    pub user: String,
    /// Real name.
    pub realname: String,
    /// Use TLS.
    pub tls: bool,
    /// Server password (PASS), if the network needs one.
    pub password: Option<String>,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:6667".to_string(),
            nick: "linkbot".to_string(),
            user: "linkbot".to_string(),
            realname: "linkbot".to_string(),
            tls: false,
            password: None,
        }
    }
}

/// Commands the consumer can send to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Join(String),
    Privmsg { target: String, text: String },
    Notice { target: String, text: String },
    Raw(String),
    Quit(Option<String>),
}

impl Command {
    /// Render as a single protocol line (without CRLF).
    fn to_line(&self) -> String {
        match self {
            Command::Join(channel) => Message::new("JOIN", vec![channel.clone()]).to_string(),
            Command::Privmsg { target, text } => {
                Message::new("PRIVMSG", vec![target.clone(), single_line(text)]).to_string()
            }
            Command::Notice { target, text } => {
                Message::new("NOTICE", vec![target.clone(), single_line(text)]).to_string()
            }
            Command::Raw(line) => single_line(line),
            Command::Quit(Some(reason)) => {
                Message::new("QUIT", vec![single_line(reason)]).to_string()
            }
            Command::Quit(None) => "QUIT".to_string(),
        }
    }
}

/// CR/LF inside a payload would smuggle extra protocol lines.
fn single_line(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}

/// A handle to a running IRC client connection.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    cmd_tx: mpsc::Sender<Command>,
}

impl ClientHandle {
    /// A handle wired to a plain channel instead of a connection.
    ///
    /// Lets callers observe what would have been sent (used by tests and by
    /// embedders that drive their own transport).
    pub fn detached(buffer: usize) -> (Self, mpsc::Receiver<Command>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(buffer);
        (Self { cmd_tx }, cmd_rx)
    }

    pub async fn join(&self, channel: &str) -> Result<()> {
        self.send(Command::Join(channel.to_string())).await
    }

    pub async fn privmsg(&self, target: &str, text: &str) -> Result<()> {
        self.send(Command::Privmsg {
            target: target.to_string(),
            text: text.to_string(),
        })
        .await
    }

    pub async fn notice(&self, target: &str, text: &str) -> Result<()> {
        self.send(Command::Notice {
            target: target.to_string(),
            text: text.to_string(),
        })
        .await
    }

    pub async fn quit(&self, message: Option<&str>) -> Result<()> {
        self.send(Command::Quit(message.map(|s| s.to_string()))).await
    }

    pub async fn raw(&self, line: &str) -> Result<()> {
        self.send(Command::Raw(line.to_string())).await
    }

    async fn send(&self, cmd: Command) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .context("IRC connection task has stopped")
    }
}

/// A connected transport, before the IRC protocol starts.
pub enum EstablishedConnection {
    Plain(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

/// Open the TCP connection (and TLS session if configured).
///
/// Kept separate from [`connect_with_stream`] so connection errors surface
/// before any task is spawned.
pub async fn establish_connection(config: &ConnectConfig) -> Result<EstablishedConnection> {
    let tcp = TcpStream::connect(&config.server_addr)
        .await
        .with_context(|| format!("Failed to connect to {}", config.server_addr))?;

    if !config.tls {
        return Ok(EstablishedConnection::Plain(tcp));
    }

    let host = config
        .server_addr
        .rsplit_once(':')
        .map_or(config.server_addr.as_str(), |(host, _)| host)
        .to_string();
    let server_name = rustls::pki_types::ServerName::try_from(host)
        .context("Invalid TLS server name")?;
    let connector = TlsConnector::from(Arc::new(rustls_default_config()));
    let tls = connector
        .connect(server_name, tcp)
        .await
        .context("TLS handshake failed")?;
    Ok(EstablishedConnection::Tls(Box::new(tls)))
}

fn rustls_default_config() -> rustls::ClientConfig {
    let _ = rustls::crypto::ring::default_provider().install_default();
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth()
}

/// Run the IRC protocol over an already-established connection.
///
/// Returns a handle for sending commands and a receiver for events.
/// The protocol runs in a spawned task.
pub fn connect_with_stream(
    conn: EstablishedConnection,
    config: ConnectConfig,
) -> (ClientHandle, mpsc::Receiver<Event>) {
    let (event_tx, event_rx) = mpsc::channel(4096);
    let (cmd_tx, cmd_rx) = mpsc::channel(256);

    let handle = ClientHandle { cmd_tx };

    tokio::spawn(async move {
        let _ = event_tx.send(Event::Connected).await;
        let result = match conn {
            EstablishedConnection::Plain(tcp) => {
                let (reader, writer) = tokio::io::split(tcp);
                run_irc(reader, writer, &config, event_tx.clone(), cmd_rx).await
            }
            EstablishedConnection::Tls(tls) => {
                let (reader, writer) = tokio::io::split(*tls);
                run_irc(reader, writer, &config, event_tx.clone(), cmd_rx).await
            }
        };
        if let Err(e) = result {
            let _ = event_tx
                .send(Event::Disconnected {
                    reason: e.to_string(),
                })
                .await;
        }
    });

    (handle, event_rx)
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> Result<()> {
    tracing::trace!(line, ">>");
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\r\n").await?;
    Ok(())
}

/// Longest line accepted from the server: 8191 bytes of tags plus a 512 byte message.
const MAX_LINE_BYTES: usize = 8191 + 512;

async fn run_irc<R, W>(
    reader: R,
    mut writer: W,
    config: &ConnectConfig,
    event_tx: mpsc::Sender<Event>,
    mut cmd_rx: mpsc::Receiver<Command>,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if let Some(password) = &config.password {
        write_line(&mut writer, &format!("PASS {password}")).await?;
    }
    write_line(&mut writer, &format!("NICK {}", config.nick)).await?;
    write_line(
        &mut writer,
        &format!("USER {} 0 * :{}", config.user, config.realname),
    )
    .await?;

    let mut registered = false;
    let mut nick_tries: u32 = 0;
    let mut pending_commands: Vec<Command> = Vec::new();
    let mut lines = FramedRead::new(
        reader,
        AnyDelimiterCodec::new_with_max_length(b"\n".to_vec(), Vec::new(), MAX_LINE_BYTES),
    );
    let mut last_activity = tokio::time::Instant::now();
    let mut ping_sent = false;
    let ping_interval = Duration::from_secs(60);
    let ping_timeout = Duration::from_secs(120);

    loop {
        tokio::select! {
            frame = lines.next() => {
                let Some(frame) = frame else {
                    let _ = event_tx.send(Event::Disconnected { reason: "EOF".to_string() }).await;
                    break;
                };
                let bytes = frame.context("Failed to read from server")?;

                last_activity = tokio::time::Instant::now();
                ping_sent = false;
                // Servers relay whatever bytes clients send; not every line is UTF-8.
                let raw = String::from_utf8_lossy(&bytes).trim_end().to_string();
                tracing::trace!(line = %raw, "<<");
                let _ = event_tx.send(Event::RawLine(raw.clone())).await;

                let Some(msg) = Message::parse(&raw) else { continue };
                match msg.command.as_str() {
                    "PING" => {
                        let token = msg.params.first().cloned().unwrap_or_default();
                        write_line(&mut writer, &Message::new("PONG", vec![token]).to_string()).await?;
                    }
                    // RPL_WELCOME
                    "001" => {
                        registered = true;
                        let nick = msg.params.first().cloned().unwrap_or_else(|| config.nick.clone());
                        let _ = event_tx.send(Event::Registered { nick }).await;
                        for cmd in pending_commands.drain(..) {
                            write_line(&mut writer, &cmd.to_line()).await?;
                        }
                    }
                    // ERR_NICKNAMEINUSE
                    "433" if !registered => {
                        nick_tries += 1;
                        if nick_tries > 5 {
                            let _ = event_tx.send(Event::Disconnected { reason: "Nick in use".to_string() }).await;
                            break;
                        }
                        let alt = format!("{}{}", config.nick, nick_tries);
                        write_line(&mut writer, &format!("NICK {alt}")).await?;
                    }
                    "JOIN" => {
                        if let (Some(nick), Some(channel)) = (msg.nick(), msg.params.first()) {
                            let _ = event_tx.send(Event::Joined {
                                channel: channel.clone(),
                                nick: nick.to_string(),
                            }).await;
                        }
                    }
                    "PART" => {
                        if let (Some(nick), Some(channel)) = (msg.nick(), msg.params.first()) {
                            let _ = event_tx.send(Event::Parted {
                                channel: channel.clone(),
                                nick: nick.to_string(),
                            }).await;
                        }
                    }
                    "PRIVMSG" => {
                        if let (Some(from), [target, text, ..]) = (msg.nick(), msg.params.as_slice()) {
                            let _ = event_tx.send(Event::Message {
                                from: from.to_string(),
                                target: target.clone(),
                                text: text.clone(),
                            }).await;
                        }
                    }
                    "NOTICE" => {
                        let _ = event_tx.send(Event::Notice {
                            from: msg.nick().map(str::to_string),
                            text: msg.params.last().cloned().unwrap_or_default(),
                        }).await;
                    }
                    "ERROR" => {
                        let reason = msg.params.last().cloned().unwrap_or_default();
                        let _ = event_tx.send(Event::Disconnected { reason }).await;
                        break;
                    }
                    _ => {}
                }
            }

            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else { break };
                let quitting = matches!(cmd, Command::Quit(_));
                // JOINs sent before registration are dropped by most servers.
                if !registered && matches!(cmd, Command::Join(_) | Command::Privmsg { .. } | Command::Notice { .. }) {
                    pending_commands.push(cmd);
                    continue;
                }
                write_line(&mut writer, &cmd.to_line()).await?;
                if quitting {
                    writer.flush().await?;
                    let _ = event_tx.send(Event::Disconnected { reason: "Quit".to_string() }).await;
                    break;
                }
            }

            _ = tokio::time::sleep_until(keepalive_deadline(last_activity, ping_sent, ping_interval, ping_timeout)) => {
                if last_activity.elapsed() >= ping_timeout {
                    let _ = event_tx.send(Event::Disconnected { reason: "Ping timeout".to_string() }).await;
                    break;
                }
                write_line(&mut writer, "PING :keepalive").await?;
                ping_sent = true;
            }
        }
    }

    Ok(())
}

/// Next wake-up for the keep-alive timer: the ping deadline until a PING is
/// outstanding, the disconnect deadline after.
fn keepalive_deadline(
    last_activity: tokio::time::Instant,
    ping_sent: bool,
    ping_interval: Duration,
    ping_timeout: Duration,
) -> tokio::time::Instant {
    if ping_sent {
        last_activity + ping_timeout
    } else {
        last_activity + ping_interval
    }
}

// ── Reconnect helper ──

/// Configuration for automatic reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Initial delay before first reconnect attempt.
    pub initial_delay: Duration,
    /// Maximum delay between reconnect attempts.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_factor: f64,
    /// Channels to rejoin after reconnecting.
    pub channels: Vec<String>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
            channels: Vec::new(),
        }
    }
}

impl ReconnectConfig {
    fn next_delay(&self, delay: Duration) -> Duration {
        let next = (delay.as_millis() as f64 * self.backoff_factor) as u64;
        Duration::from_millis(next.min(self.max_delay.as_millis() as u64))
    }
}

/// Boxed future returned by event handlers.
pub type EventFuture = std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send>>;

/// Run an event loop with automatic reconnection.
///
/// The `handler` is called for each event. When disconnected, the loop
/// reconnects with exponential backoff and rejoins configured channels.
/// Handler errors are logged and do not stop the loop.
pub async fn run_with_reconnect<F>(
    config: ConnectConfig,
    reconnect_config: ReconnectConfig,
    handler: F,
) -> Result<()>
where
    F: Fn(ClientHandle, Event) -> EventFuture + Send + Sync,
{
    let mut delay = reconnect_config.initial_delay;
    let mut consecutive_failures = 0u32;

    loop {
        let conn = match establish_connection(&config).await {
            Ok(c) => {
                consecutive_failures = 0;
                delay = reconnect_config.initial_delay;
                c
            }
            Err(e) => {
                consecutive_failures += 1;
                tracing::warn!(
                    error = %e,
                    attempt = consecutive_failures,
                    delay_secs = delay.as_secs(),
                    "Connection failed, retrying"
                );
                tokio::time::sleep(delay).await;
                delay = reconnect_config.next_delay(delay);
                continue;
            }
        };

        let (handle, mut events) = connect_with_stream(conn, config.clone());

        while let Some(event) = events.recv().await {
            if matches!(&event, Event::Registered { .. }) {
                for ch in &reconnect_config.channels {
                    let _ = handle.join(ch).await;
                }
            }
            let disconnected = matches!(&event, Event::Disconnected { .. });
            if let Err(e) = handler(handle.clone(), event).await {
                tracing::error!(error = %e, "Handler error");
            }
            if disconnected {
                break;
            }
        }

        tracing::info!(delay_secs = delay.as_secs(), "Disconnected, will reconnect");
        tokio::time::sleep(delay).await;
        delay = reconnect_config.next_delay(delay);
    }
}
