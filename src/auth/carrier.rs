//! Moving the encrypted token through URLs.
//!
//! Receiving side: [`extract_from_location`] reads the `token` parameter,
//! [`strip_token_from_current_url`] hides it again. Sending side:
//! [`build_redirect_url`] / [`secure_redirect_url`] produce
//! `origin?token=<url-encoded blob>`.
//!
//! Query strings are decoded the way `URLSearchParams` does it: `+` is a
//! space, percent escapes are UTF-8.

use super::navigator::Navigator;
use super::token::Token;
use crate::security::{CipherError, EncodedBlob, HandoffCipher};
use std::borrow::Cow;

/// Query parameter carrying the encrypted token.
pub const TOKEN_PARAM: &str = "token";

/// Query parameter signalling an explicit logout.
pub const LOGOUT_PARAM: &str = "logout";

fn form_decode(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => String::from_utf8_lossy(&urlencoding::decode_binary(spaced.as_bytes()))
            .into_owned(),
    }
}

/// Drop one leading `?`, as `URLSearchParams` does. A second `?` belongs to
/// the first parameter name.
fn bare_query(search: &str) -> &str {
    search.strip_prefix('?').unwrap_or(search)
}

/// Decoded `(name, value)` pairs of a query, with or without the leading `?`.
pub fn query_pairs(query: &str) -> impl Iterator<Item = (String, String)> + '_ {
    bare_query(query)
        .split('&')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let (name, value) = segment.split_once('=').unwrap_or((segment, ""));
            (form_decode(name), form_decode(value))
        })
}

/// First value of `name` in `query`.
pub fn query_param(query: &str, name: &str) -> Option<String> {
    query_pairs(query).find(|(key, _)| key == name).map(|(_, value)| value)
}

/// The encrypted token carried by `query`, if any. Empty values count as absent.
pub fn extract_from_location(query: &str) -> Option<EncodedBlob> {
    query_param(query, TOKEN_PARAM)
        .filter(|value| !value.is_empty())
        .map(EncodedBlob::new)
}

/// True when `query` carries `logout=true`.
pub fn is_logout_request(query: &str) -> bool {
    query_param(query, LOGOUT_PARAM).as_deref() == Some("true")
}

/// `query` without any occurrence of `name`, returned without a leading `?`.
/// Other segments are kept verbatim.
pub fn remove_param(query: &str, name: &str) -> String {
    bare_query(query)
        .split('&')
        .filter(|segment| !segment.is_empty())
        .filter(|segment| {
            let key = segment.split_once('=').map_or(*segment, |(key, _)| key);
            form_decode(key) != name
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Prefix `https://` when `origin` has no scheme (a bare subdomain).
fn with_scheme(origin: &str) -> Cow<'_, str> {
    let origin = origin.trim();
    if origin.contains("://") {
        Cow::Borrowed(origin)
    } else {
        Cow::Owned(format!("https://{origin}"))
    }
}

/// The identity authority's entry page, used when a login is required.
pub fn login_redirect_url(origin: &str) -> String {
    with_scheme(origin).into_owned()
}

fn append_param(url: &str, name: &str, encoded_value: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{name}={encoded_value}")
}

/// `base_origin?token=<url-encoded blob>`. No I/O.
pub fn build_redirect_url(base_origin: &str, blob: &EncodedBlob) -> String {
    append_param(
        &with_scheme(base_origin),
        TOKEN_PARAM,
        &urlencoding::encode(blob.as_str()),
    )
}

/// `origin?logout=true`, which tells the identity authority to drop its session.
pub fn build_logout_url(origin: &str) -> String {
    append_param(&with_scheme(origin), LOGOUT_PARAM, "true")
}

/// Encrypt `token` and build the handoff URL for `target_origin`.
pub fn secure_redirect_url(
    cipher: &HandoffCipher,
    target_origin: &str,
    token: &Token,
) -> Result<String, CipherError> {
    let blob = cipher.encrypt(token.as_str())?;
    Ok(build_redirect_url(target_origin, &blob))
}

/// Remove the `token` parameter from the visible address without reloading.
/// Returns whether anything was removed.
pub fn strip_token_from_current_url(navigator: &dyn Navigator) -> bool {
    let location = navigator.location();
    if query_param(&location.search(), TOKEN_PARAM).is_none() {
        return false;
    }
    navigator.replace(location.without_param(TOKEN_PARAM));
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::navigator::AddressBar;

    #[test]
    fn extracts_token_parameter() {
        assert_eq!(
            extract_from_location("?token=abc&x=1"),
            Some(EncodedBlob::from("abc"))
        );
        assert_eq!(extract_from_location("x=1&token=abc"), Some(EncodedBlob::from("abc")));
        assert_eq!(extract_from_location("?x=1"), None);
        assert_eq!(extract_from_location(""), None);
    }

    #[test]
    fn empty_token_counts_as_absent() {
        assert_eq!(extract_from_location("?token=&x=1"), None);
        assert_eq!(extract_from_location("?token"), None);
    }

    #[test]
    fn first_occurrence_wins() {
        assert_eq!(
            extract_from_location("?token=first&token=second"),
            Some(EncodedBlob::from("first"))
        );
    }

    #[test]
    fn values_are_form_decoded() {
        assert_eq!(
            extract_from_location("?token=ab%2Bc%2F%3D%3D"),
            Some(EncodedBlob::from("ab+c/=="))
        );
        assert_eq!(query_param("?q=a+b", "q").as_deref(), Some("a b"));
        assert_eq!(query_param("?bad=%FF", "bad").as_deref(), Some("\u{FFFD}"));
    }

    #[test]
    fn redirect_url_roundtrips_through_extraction() {
        let blob = EncodedBlob::from("q+/9Zm9v=");
        let url = build_redirect_url("https://partner.example", &blob);
        assert_eq!(url, "https://partner.example?token=q%2B%2F9Zm9v%3D");

        let query = url.split_once('?').unwrap().1;
        assert_eq!(extract_from_location(query), Some(blob));
    }

    #[test]
    fn redirect_url_handles_bare_subdomain_and_existing_query() {
        let blob = EncodedBlob::from("abc");
        assert_eq!(
            build_redirect_url("partner.example", &blob),
            "https://partner.example?token=abc"
        );
        assert_eq!(
            build_redirect_url("https://partner.example/app?lang=fr", &blob),
            "https://partner.example/app?lang=fr&token=abc"
        );
    }

    #[test]
    fn logout_flag_detection() {
        assert!(is_logout_request("?logout=true"));
        assert!(is_logout_request("a=1&logout=true"));
        assert!(!is_logout_request("?logout=false"));
        assert!(!is_logout_request("?logout"));
        assert!(!is_logout_request(""));
        assert_eq!(
            build_logout_url("https://admin.example"),
            "https://admin.example?logout=true"
        );
        assert_eq!(login_redirect_url("admin.example"), "https://admin.example");
    }

    #[test]
    fn remove_param_keeps_other_segments_verbatim() {
        assert_eq!(remove_param("?token=abc&id=7&q=a%20b", "token"), "id=7&q=a%20b");
        assert_eq!(remove_param("token=a&token=b", "token"), "");
        assert_eq!(remove_param("id=7", "token"), "id=7");
    }

    #[test]
    fn only_one_leading_question_mark_is_dropped() {
        assert_eq!(extract_from_location("??token=x"), None);
        assert_eq!(query_param("??token=x", "?token").as_deref(), Some("x"));
        assert_eq!(extract_from_location("&?token=x"), None);
        assert_eq!(remove_param("??token=x", "token"), "?token=x");
    }

    #[test]
    fn removed_param_stays_removed() {
        for query in ["&?token=x", "??token=x", "?token=x&a=1", "token&token=", "?%74oken=x"] {
            let stripped = remove_param(query, TOKEN_PARAM);
            assert_eq!(
                extract_from_location(&format!("?{stripped}")),
                None,
                "{query} -> {stripped}"
            );
        }
    }

    #[test]
    fn secure_redirect_url_carries_decryptable_blob() {
        let cipher = HandoffCipher::new("carrier-test");
        let token = Token::new("bearer-123").unwrap();
        let url = secure_redirect_url(&cipher, "partner.example", &token).unwrap();
        assert!(url.starts_with("https://partner.example?token="));

        let query = url.split_once('?').unwrap().1;
        let blob = extract_from_location(query).unwrap();
        assert_eq!(cipher.decrypt(&blob).unwrap(), "bearer-123");
    }

    #[test]
    fn strip_token_reads_query_like_the_browser() {
        let bar = AddressBar::new("/orders??token=abc");
        assert!(!strip_token_from_current_url(&bar));
        assert_eq!(bar.href(), "/orders??token=abc");
    }

    #[test]
    fn strip_token_rewrites_visible_address() {
        let bar = AddressBar::new("/orders?token=abc&tab=open#list");
        assert!(strip_token_from_current_url(&bar));
        assert_eq!(bar.href(), "/orders?tab=open#list");
        assert!(bar.redirected_to().is_none());

        assert!(!strip_token_from_current_url(&bar));
        assert_eq!(bar.href(), "/orders?tab=open#list");
    }
}
