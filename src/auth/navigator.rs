//! The visible-address collaborator.
//!
//! In the browser this is `window.location` plus the history API. The session
//! flows only need three things from it: read the current address, rewrite it
//! in place without a reload, and leave the application.

use parking_lot::Mutex;

/// A parsed address: `path?query#hash`.
///
/// `query` is stored without the leading `?` and `hash` without the `#`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    pub path: String,
    pub query: String,
    pub hash: String,
}

impl Location {
    pub fn parse(href: &str) -> Self {
        let (rest, hash) = href.split_once('#').unwrap_or((href, ""));
        let (path, query) = rest.split_once('?').unwrap_or((rest, ""));
        Self {
            path: path.to_string(),
            query: query.to_string(),
            hash: hash.to_string(),
        }
    }

    /// The query with its leading `?`, or an empty string.
    pub fn search(&self) -> String {
        if self.query.is_empty() {
            String::new()
        } else {
            format!("?{}", self.query)
        }
    }

    pub fn href(&self) -> String {
        let mut href = format!("{}{}", self.path, self.search());
        if !self.hash.is_empty() {
            href.push('#');
            href.push_str(&self.hash);
        }
        href
    }

    /// Same path and hash, with every occurrence of `name` removed from the query.
    pub fn without_param(&self, name: &str) -> Self {
        Self {
            path: self.path.clone(),
            query: super::carrier::remove_param(&self.search(), name),
            hash: self.hash.clone(),
        }
    }
}

/// Browser location and history operations used by the session flows.
pub trait Navigator: Send + Sync {
    /// The address currently shown.
    fn location(&self) -> Location;

    /// Rewrite the visible address without navigating (`history.replaceState`).
    fn replace(&self, location: Location);

    /// Leave the application for `url`. Nothing after a redirect is
    /// guaranteed to run.
    fn redirect(&self, url: &str);
}

/// In-process [`Navigator`]: holds the current address and records redirects.
///
/// Backs the CLI and the tests.
#[derive(Debug, Default)]
pub struct AddressBar {
    current: Mutex<Location>,
    redirects: Mutex<Vec<String>>,
}

impl AddressBar {
    pub fn new(href: &str) -> Self {
        Self {
            current: Mutex::new(Location::parse(href)),
            redirects: Mutex::new(Vec::new()),
        }
    }

    pub fn href(&self) -> String {
        self.current.lock().href()
    }

    /// The most recent redirect target, if the application was left.
    pub fn redirected_to(&self) -> Option<String> {
        self.redirects.lock().last().cloned()
    }

    pub fn redirects(&self) -> Vec<String> {
        self.redirects.lock().clone()
    }
}

impl Navigator for AddressBar {
    fn location(&self) -> Location {
        self.current.lock().clone()
    }

    fn replace(&self, location: Location) {
        tracing::debug!(path = %location.path, "Address replaced");
        *self.current.lock() = location;
    }

    fn redirect(&self, url: &str) {
        tracing::info!(target_url = url, "Redirecting");
        self.redirects.lock().push(url.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_path_query_and_hash() {
        let loc = Location::parse("https://partner.example/orders?token=abc&x=1#top");
        assert_eq!(loc.path, "https://partner.example/orders");
        assert_eq!(loc.query, "token=abc&x=1");
        assert_eq!(loc.hash, "top");
        assert_eq!(loc.search(), "?token=abc&x=1");
        assert_eq!(loc.href(), "https://partner.example/orders?token=abc&x=1#top");
    }

    #[test]
    fn parse_without_query_or_hash() {
        let loc = Location::parse("/docs");
        assert_eq!(loc, Location {
            path: "/docs".into(),
            ..Location::default()
        });
        assert_eq!(loc.href(), "/docs");
    }

    #[test]
    fn without_param_keeps_other_parameters_and_hash() {
        let loc = Location::parse("/facture?token=abc&id=7#print");
        assert_eq!(loc.without_param("token").href(), "/facture?id=7#print");

        let only = Location::parse("/facture?token=abc");
        assert_eq!(only.without_param("token").href(), "/facture");
    }

    #[test]
    fn address_bar_records_replacements_and_redirects() {
        let bar = AddressBar::new("/orders?token=abc");
        bar.replace(Location::parse("/orders"));
        assert_eq!(bar.href(), "/orders");
        assert!(bar.redirected_to().is_none());

        bar.redirect("https://admin.example");
        bar.redirect("https://admin.example?logout=true");
        assert_eq!(bar.redirected_to().as_deref(), Some("https://admin.example?logout=true"));
        assert_eq!(bar.redirects().len(), 2);
    }
}
