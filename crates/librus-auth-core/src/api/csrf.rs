use std::sync::LazyLock;

use regex::Regex;

/// Name of the meta tag the login page uses for its CSRF token
const CSRF_META_NAME: &str = "csrf-token";

static META_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<meta\b[^>]*>").expect("meta tag pattern is valid")
});

static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)([a-z][a-z0-9_:-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
        .expect("attribute pattern is valid")
});

/// Extract the `content` of `<meta name="csrf-token">` from the login page.
pub fn extract_csrf_token(html: &str) -> Option<String> {
    META_TAG.find_iter(html).find_map(|tag| {
        let mut name = None;
        let mut content = None;
        for caps in ATTRIBUTE.captures_iter(tag.as_str()) {
            let value = caps.get(2).or_else(|| caps.get(3)).map(|m| m.as_str());
            match caps[1].to_ascii_lowercase().as_str() {
                "name" => name = value,
                "content" => content = value,
                _ => {}
            }
        }
        match (name, content) {
            (Some(n), Some(c)) if n.eq_ignore_ascii_case(CSRF_META_NAME) => Some(c.to_string()),
            _ => None,
        }
    })
}
