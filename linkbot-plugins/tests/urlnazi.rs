//! End-to-end tests for the URL repost tracker.
//!
//! Each test runs a local wiremock server standing in for both the linked
//! site and the shortening service, with an in-memory registry.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use linkbot_plugins::config::{HttpConfig, ShortenerConfig};
use linkbot_plugins::links::{self, Classifier, URL_PATTERN, Shortener};
use linkbot_plugins::registry::{FirstSeenStore, RegistryError, SqliteRegistry, UrlRecord};
use linkbot_plugins::reply::strip_formatting;
use linkbot_plugins::urlnazi::{self, UrlMessage, UrlNazi};
use linkbot_sdk::bot::Bot;
use linkbot_sdk::client::{ClientHandle, Command};
use linkbot_sdk::event::Event;
use linkbot_sdk::hooks::{HookId, StaticDirectory};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const EXAMPLE_HTML: &str =
    "<!doctype html><html><head><title>Example Domain</title></head><body>hi</body></html>";

struct Setup {
    server: MockServer,
    registry: Arc<SqliteRegistry>,
}

impl Setup {
    async fn new() -> Self {
        Self {
            server: MockServer::start().await,
            registry: Arc::new(SqliteRegistry::open_memory().unwrap()),
        }
    }

    fn url(&self, p: &str) -> String {
        format!("{}{p}", self.server.uri())
    }

    fn plugin(&self, threshold: usize, fallback: bool) -> UrlNazi {
        let http = links::http_client(&HttpConfig::default()).unwrap();
        let shortener_config = ShortenerConfig {
            endpoint: self.url("/create.php"),
            threshold,
            fallback_to_long_url: fallback,
        };
        UrlNazi::new(
            Classifier::new(http.clone(), 1024 * 1024),
            Shortener::new(http, &shortener_config),
            self.registry.clone(),
            fallback,
        )
    }

    async fn serve_html(&self, p: &str, html: &str) {
        Mock::given(method("GET"))
            .and(path(p))
            .respond_with(ResponseTemplate::new(200).set_body_raw(html.to_string(), "text/html"))
            .mount(&self.server)
            .await;
    }
}

fn only_self() -> StaticDirectory {
    StaticDirectory::new().with(URL_PATTERN, urlnazi::hook_id()).unwrap()
}

fn msg<'a>(nick: &'a str, url: &'a str) -> UrlMessage<'a> {
    UrlMessage {
        network: "net1",
        channel: "#chan",
        nick,
        url,
    }
}

#[tokio::test]
async fn first_post_is_recorded_and_titled() {
    let s = Setup::new().await;
    s.serve_html("/a", EXAMPLE_HTML).await;
    let url = s.url("/a");

    let before = Utc::now();
    let reply = s.plugin(50, false).handle(msg("alice", &url), &only_self()).await;
    assert_eq!(reply.as_deref(), Some(format!("Example Domain - {url}").as_str()));

    let rec = s.registry.find("net1", "#chan", &url).unwrap().unwrap();
    assert_eq!(rec.user, "alice");
    assert!(rec.first_seen_at >= before - Duration::seconds(1));
}

#[tokio::test]
async fn repost_by_other_user_names_original_poster() {
    let s = Setup::new().await;
    s.serve_html("/a", EXAMPLE_HTML).await;
    let url = s.url("/a");
    let t1 = Utc.with_ymd_and_hms(2024, 3, 5, 9, 0, 0).unwrap();
    s.registry.insert_if_absent("net1", "#chan", "alice", &url, t1).unwrap();

    let reply = s.plugin(50, false).handle(msg("bob", &url), &only_self()).await.unwrap();
    assert_eq!(
        strip_formatting(&reply),
        format!("Example Domain - {url} - OLD! Originally posted by alice on 05.03.2024")
    );
    assert!(reply.contains("\x0304OLD!"));

    // The original record is untouched.
    let rec = s.registry.find("net1", "#chan", &url).unwrap().unwrap();
    assert_eq!((rec.user.as_str(), rec.first_seen_at), ("alice", t1));
}

#[tokio::test]
async fn repost_flow_uses_first_post_date() {
    let s = Setup::new().await;
    s.serve_html("/a", EXAMPLE_HTML).await;
    let url = s.url("/a");
    let plugin = s.plugin(50, false);

    plugin.handle(msg("alice", &url), &only_self()).await.unwrap();
    let reply = plugin.handle(msg("bob", &url), &only_self()).await.unwrap();

    let rec = s.registry.find("net1", "#chan", &url).unwrap().unwrap();
    let date = rec.first_seen_at.format("%d.%m.%Y").to_string();
    assert!(strip_formatting(&reply).ends_with(&format!("Originally posted by alice on {date}")));
}

#[tokio::test]
async fn self_repost_is_not_flagged() {
    let s = Setup::new().await;
    s.serve_html("/a", EXAMPLE_HTML).await;
    let url = s.url("/a");
    let plugin = s.plugin(50, false);

    plugin.handle(msg("alice", &url), &only_self()).await.unwrap();
    let reply = plugin.handle(msg("alice", &url), &only_self()).await.unwrap();
    assert_eq!(reply, format!("Example Domain - {url}"));
}

#[tokio::test]
async fn channel_and_network_case_do_not_matter() {
    let s = Setup::new().await;
    s.serve_html("/a", EXAMPLE_HTML).await;
    let url = s.url("/a");
    let plugin = s.plugin(50, false);

    let first = UrlMessage { network: "Net1", channel: "#Chan", nick: "alice", url: &url };
    plugin.handle(first, &only_self()).await.unwrap();

    let second = UrlMessage { network: "NET1", channel: "#CHAN", nick: "bob", url: &url };
    let reply = plugin.handle(second, &only_self()).await.unwrap();
    assert!(strip_formatting(&reply).contains("OLD! Originally posted by alice"));
    assert_eq!(s.registry.len().unwrap(), 1);
}

#[tokio::test]
async fn http_error_is_reported_and_not_recorded() {
    let s = Setup::new().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&s.server)
        .await;
    let url = s.url("/missing");

    let reply = s.plugin(50, false).handle(msg("alice", &url), &only_self()).await;
    assert_eq!(reply, Some(format!("{url}: error - HTTP status code 404")));
    assert!(s.registry.is_empty().unwrap());
}

#[tokio::test]
async fn connection_failure_is_reported_and_not_recorded() {
    let s = Setup::new().await;
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let url = format!("http://127.0.0.1:{port}/gone");

    let reply = s.plugin(50, false).handle(msg("alice", &url), &only_self()).await;
    assert_eq!(reply, Some(format!("{url}: failed to connect")));
    assert!(s.registry.is_empty().unwrap());
}

#[tokio::test]
async fn non_html_is_labelled_with_content_type() {
    let s = Setup::new().await;
    Mock::given(method("GET"))
        .and(path("/cat.png"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0x89, b'P', b'N', b'G'], "image/png"))
        .mount(&s.server)
        .await;
    let url = s.url("/cat.png");

    let reply = s.plugin(50, false).handle(msg("alice", &url), &only_self()).await;
    assert_eq!(reply, Some(format!("image/png - {url}")));
    assert!(s.registry.find("net1", "#chan", &url).unwrap().is_some());
}

#[tokio::test]
async fn untitled_html_gets_placeholder() {
    let s = Setup::new().await;
    s.serve_html("/untitled", "<html><body>nothing</body></html>").await;
    let url = s.url("/untitled");

    let reply = s.plugin(50, false).handle(msg("alice", &url), &only_self()).await;
    assert_eq!(reply, Some(format!("(no title) - {url}")));
}

#[tokio::test]
async fn latin1_title_is_decoded() {
    let s = Setup::new().await;
    Mock::given(method("GET"))
        .and(path("/fi"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(b"<html><title>P\xe4\xe4sivu</title></html>".to_vec(), "text/html; charset=iso-8859-1"),
        )
        .mount(&s.server)
        .await;
    let url = s.url("/fi");

    let reply = s.plugin(50, false).handle(msg("alice", &url), &only_self()).await;
    assert_eq!(reply, Some(format!("P\u{e4}\u{e4}sivu - {url}")));
}

#[tokio::test]
async fn long_url_is_shortened_once() {
    let s = Setup::new().await;
    let mut long_path = "/long/".to_string();
    while s.url(&long_path).len() < 80 {
        long_path.push('x');
    }
    let url = s.url(&long_path);
    assert_eq!(url.len(), 80);
    s.serve_html(&long_path, EXAMPLE_HTML).await;

    Mock::given(method("GET"))
        .and(path("/create.php"))
        .and(query_param("format", "simple"))
        .and(query_param("url", url.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_string("https://is.gd/AbCdEf"))
        .expect(1)
        .mount(&s.server)
        .await;

    let reply = s.plugin(50, false).handle(msg("alice", &url), &only_self()).await.unwrap();
    assert_eq!(reply, "Example Domain - https://is.gd/AbCdEf");
    assert!(!reply.contains(&url));
    // The registry keeps the full URL, not the short one.
    assert!(s.registry.find("net1", "#chan", &url).unwrap().is_some());
}

#[tokio::test]
async fn threshold_boundary_controls_shortening() {
    let s = Setup::new().await;
    let at_limit = s.url("/p");
    let threshold = at_limit.len();
    let one_over = s.url("/pq");
    s.serve_html("/p", EXAMPLE_HTML).await;
    s.serve_html("/pq", EXAMPLE_HTML).await;

    Mock::given(method("GET"))
        .and(path("/create.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string("https://is.gd/x"))
        .expect(1)
        .mount(&s.server)
        .await;

    let plugin = s.plugin(threshold, false);
    let reply = plugin.handle(msg("alice", &at_limit), &only_self()).await.unwrap();
    assert_eq!(reply, format!("Example Domain - {at_limit}"));

    let reply = plugin.handle(msg("alice", &one_over), &only_self()).await.unwrap();
    assert_eq!(reply, "Example Domain - https://is.gd/x");
}

#[tokio::test]
async fn shortening_failure_surfaces_an_error() {
    let s = Setup::new().await;
    s.serve_html("/page", EXAMPLE_HTML).await;
    Mock::given(method("GET"))
        .and(path("/create.php"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&s.server)
        .await;
    let url = s.url("/page");

    let reply = s.plugin(5, false).handle(msg("alice", &url), &only_self()).await;
    assert_eq!(reply, Some(format!("{url}: failed to shorten URL")));
}

#[tokio::test]
async fn shortening_failure_can_fall_back_to_long_url() {
    let s = Setup::new().await;
    s.serve_html("/page", EXAMPLE_HTML).await;
    Mock::given(method("GET"))
        .and(path("/create.php"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&s.server)
        .await;
    let url = s.url("/page");

    let reply = s.plugin(5, true).handle(msg("alice", &url), &only_self()).await;
    assert_eq!(reply, Some(format!("Example Domain - {url}")));
}

#[tokio::test]
async fn claimed_url_is_silent_but_remembered() {
    let s = Setup::new().await;
    s.serve_html("/watch", EXAMPLE_HTML).await;
    let url = s.url("/watch");
    let directory = only_self()
        .with(r"/watch", HookId::new("youtube", "video"))
        .unwrap();
    let plugin = s.plugin(50, false);

    assert_eq!(plugin.handle(msg("alice", &url), &directory).await, None);
    let rec = s.registry.find("net1", "#chan", &url).unwrap().unwrap();
    assert_eq!(rec.user, "alice");

    // Once the other plugin is gone, the repost is called out.
    let reply = plugin.handle(msg("bob", &url), &only_self()).await.unwrap();
    assert!(strip_formatting(&reply).contains("Originally posted by alice"));
}

#[tokio::test]
async fn other_hooks_from_the_same_plugin_do_not_suppress() {
    let s = Setup::new().await;
    s.serve_html("/a", EXAMPLE_HTML).await;
    let url = s.url("/a");
    let directory = only_self()
        .with(URL_PATTERN, HookId::new(urlnazi::PLUGIN, "second-pattern"))
        .unwrap();

    let reply = s.plugin(50, false).handle(msg("alice", &url), &directory).await;
    assert_eq!(reply, Some(format!("Example Domain - {url}")));
}

/// A store whose first lookup misses a record another writer just added.
struct LostRace {
    inner: SqliteRegistry,
    finds: std::sync::atomic::AtomicUsize,
}

impl FirstSeenStore for LostRace {
    fn find(&self, network: &str, channel: &str, url: &str) -> Result<Option<UrlRecord>, RegistryError> {
        if self.finds.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
            return Ok(None);
        }
        self.inner.find(network, channel, url)
    }

    fn insert_if_absent(
        &self,
        network: &str,
        channel: &str,
        user: &str,
        url: &str,
        first_seen_at: chrono::DateTime<Utc>,
    ) -> Result<bool, RegistryError> {
        self.inner.insert_if_absent(network, channel, user, url, first_seen_at)
    }
}

#[tokio::test]
async fn losing_an_insert_race_reports_the_winner() {
    let s = Setup::new().await;
    s.serve_html("/a", EXAMPLE_HTML).await;
    let url = s.url("/a");

    let inner = SqliteRegistry::open_memory().unwrap();
    let t1 = Utc.with_ymd_and_hms(2024, 3, 5, 9, 0, 0).unwrap();
    inner.insert_if_absent("net1", "#chan", "alice", &url, t1).unwrap();
    let store = Arc::new(LostRace { inner, finds: Default::default() });

    let http = links::http_client(&HttpConfig::default()).unwrap();
    let plugin = UrlNazi::new(
        Classifier::new(http.clone(), 1024 * 1024),
        Shortener::new(http, &ShortenerConfig { threshold: 500, ..Default::default() }),
        store.clone(),
        false,
    );

    let reply = plugin.handle(msg("bob", &url), &only_self()).await.unwrap();
    assert!(strip_formatting(&reply).ends_with("Originally posted by alice on 05.03.2024"));
    assert_eq!(store.inner.len().unwrap(), 1);
}

#[tokio::test]
async fn bot_dispatches_channel_urls_to_the_plugin() {
    let s = Setup::new().await;
    s.serve_html("/a", EXAMPLE_HTML).await;
    let url = s.url("/a");

    let mut bot = Bot::new(".", "linkbot", "net1");
    urlnazi::register(&mut bot, Arc::new(s.plugin(50, false))).unwrap();
    let bot = Arc::new(bot);

    let (handle, mut rx) = ClientHandle::detached(8);
    let event = Event::Message {
        from: "alice".into(),
        target: "#chan".into(),
        text: format!("look at this {url} and http://other.invalid/"),
    };
    for task in bot.handle_event(&handle, &event) {
        task.await.unwrap();
    }
    drop(handle);

    assert_eq!(
        rx.recv().await,
        Some(Command::Privmsg {
            target: "#chan".into(),
            text: format!("Example Domain - {url}"),
        })
    );
    assert_eq!(rx.recv().await, None);
    assert_eq!(s.registry.find("net1", "#chan", &url).unwrap().unwrap().user, "alice");
}
