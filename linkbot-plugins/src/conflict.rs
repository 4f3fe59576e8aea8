//! Stay quiet when another plugin has a hook for the same URL.
//!
//! Plugins with dedicated URL handling (video sites, issue trackers, ...)
//! give better replies than a generic title lookup.

use linkbot_sdk::hooks::{HandlerDirectory, HookId};

/// The first hook from another plugin that matches `url`, if any.
///
/// Hooks are compared by origin, so every hook `own` shares a plugin with
/// is ignored whatever its pattern.
pub fn claimed_by(directory: &dyn HandlerDirectory, url: &str, own: &HookId) -> Option<HookId> {
    directory
        .matching_handlers(url)
        .into_iter()
        .find(|id| !id.same_origin(own))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::links::URL_PATTERN;
    use linkbot_sdk::hooks::StaticDirectory;

    fn own() -> HookId {
        HookId::new("urlnazi", "urls")
    }

    #[test]
    fn own_hook_does_not_suppress() {
        let dir = StaticDirectory::new().with(URL_PATTERN, own()).unwrap();
        assert_eq!(claimed_by(&dir, "https://example.com/", &own()), None);
    }

    #[test]
    fn same_pattern_from_another_plugin_suppresses() {
        let dir = StaticDirectory::new()
            .with(URL_PATTERN, own())
            .unwrap()
            .with(URL_PATTERN, HookId::new("pagetitle", "urls"))
            .unwrap();
        assert_eq!(
            claimed_by(&dir, "https://example.com/", &own()),
            Some(HookId::new("pagetitle", "urls"))
        );
    }

    #[test]
    fn only_matching_patterns_count() {
        let dir = StaticDirectory::new()
            .with(URL_PATTERN, own())
            .unwrap()
            .with(r"youtube\.com/watch|youtu\.be/", HookId::new("youtube", "video"))
            .unwrap();
        assert_eq!(claimed_by(&dir, "https://example.com/", &own()), None);
        assert_eq!(
            claimed_by(&dir, "https://youtu.be/abc", &own()),
            Some(HookId::new("youtube", "video"))
        );
    }
}
