use regex::Regex;
use std::sync::LazyLock;

/// `http://` or `https://` followed by a run of URL characters: letters,
/// digits, the printable punctuation between `$` and `_`, `!`, and
/// percent-encoded octets.
pub const URL_PATTERN: &str =
    r"https?://(?:[a-zA-Z0-9!$%&'()*+,\-./:;<=>?@\[\\\]^_]|%[0-9a-fA-F]{2})+";

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(URL_PATTERN).expect("URL_PATTERN is a valid regex"));

/// Every URL in `text`, left to right. Calling again restarts the scan.
pub fn urls(text: &str) -> impl Iterator<Item = &str> + '_ {
    URL_RE.find_iter(text).map(|m| m.as_str())
}

/// The URL the plugins act on: the first one in the line.
pub fn first_url(text: &str) -> Option<&str> {
    urls(text).next()
}
