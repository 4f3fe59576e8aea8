//! Link handling shared by the URL plugins: finding URLs in chat text,
//! classifying what they point at, and shortening long ones.

pub mod classify;
pub mod extract;
pub mod shorten;

pub use classify::{Classification, ClassifyError, Classifier};
pub use extract::{URL_PATTERN, first_url, urls};
pub use shorten::{ShortenError, Shortener};

/// Build the HTTP client every link component shares.
pub fn http_client(config: &crate::config::HttpConfig) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.timeout())
        .user_agent(config.user_agent.clone())
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
}
