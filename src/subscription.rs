//! Subscription bodies: the base64 line lists served by proxy providers.

use tracing::{debug, warn};

use crate::error::Result;
use crate::types::Node;
use crate::uri::{decode_base64_utf8, encode_base64, generate, percent_decode};

/// Fetches a subscription body. Transport is up to the caller.
pub trait Fetcher {
    fn fetch(&self, url: &str) -> Result<String>;
}

/// Split a subscription body into share-link lines.
///
/// The body is base64 in the common case; plain text is accepted too. A
/// body that is percent-encoded as a whole is decoded first.
pub fn decode_subscription(body: &str) -> Vec<String> {
    let body = body.trim();
    let mut text = if body.contains("://") {
        body.to_string()
    } else {
        decode_base64_utf8(body).unwrap_or_else(|| body.to_string())
    };
    if !text.contains("://") && text.contains('%') {
        let decoded = percent_decode(&text);
        if decoded.contains("://") {
            text = decoded;
        }
    }
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// Encode lines as a base64 subscription body.
pub fn encode_subscription<I, S>(lines: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let joined = lines
        .into_iter()
        .map(|l| l.as_ref().to_string())
        .collect::<Vec<_>>()
        .join("\n");
    encode_base64(joined)
}

/// Encode nodes as a base64 subscription body of share links.
pub fn encode_nodes<'a, I>(nodes: I) -> String
where
    I: IntoIterator<Item = &'a Node>,
{
    encode_subscription(nodes.into_iter().map(generate))
}

fn is_remote(input: &str) -> bool {
    let lower = input.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Expand user input into share-link lines.
///
/// `http(s)://` entries are fetched one after another and decoded; a source
/// that fails is logged and contributes nothing. Every other entry passes
/// through as-is.
pub fn collect_lines<I, S>(inputs: I, fetcher: &dyn Fetcher) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut lines = Vec::new();
    for input in inputs {
        for entry in input.as_ref().lines().map(str::trim).filter(|l| !l.is_empty()) {
            if !is_remote(entry) {
                lines.push(entry.to_string());
                continue;
            }
            match fetcher.fetch(entry) {
                Ok(body) => {
                    let decoded = decode_subscription(&body);
                    debug!(url = entry, lines = decoded.len(), "fetched subscription");
                    lines.extend(decoded);
                }
                Err(e) => warn!(url = entry, error = %e, "skipping subscription source"),
            }
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SublinkError;
    use std::collections::HashMap;

    struct MapFetcher(HashMap<&'static str, &'static str>);

    impl Fetcher for MapFetcher {
        fn fetch(&self, url: &str) -> Result<String> {
            self.0
                .get(url)
                .map(|body| body.to_string())
                .ok_or_else(|| SublinkError::Fetch {
                    url: url.to_string(),
                    message: "404".to_string(),
                })
        }
    }

    #[test]
    fn test_decode_base64_body() {
        let body = encode_subscription(["trojan://a@a.com:443#A", "", "trojan://b@b.com:443#B"]);
        assert_eq!(
            decode_subscription(&body),
            ["trojan://a@a.com:443#A", "trojan://b@b.com:443#B"]
        );
    }

    #[test]
    fn test_decode_plain_and_percent_encoded_bodies() {
        assert_eq!(
            decode_subscription("trojan://a@a.com:443#A\r\n"),
            ["trojan://a@a.com:443#A"]
        );
        assert_eq!(
            decode_subscription("trojan%3A%2F%2Fa%40a.com%3A443%23A"),
            ["trojan://a@a.com:443#A"]
        );
    }

    #[test]
    fn test_collect_lines_is_best_effort() {
        let body = encode_subscription(["hy2://p@h.com:443#H"]);
        let body: &'static str = Box::leak(body.into_boxed_str());
        let fetcher = MapFetcher(HashMap::from([("https://good.example/sub", body)]));

        let lines = collect_lines(
            [
                "https://good.example/sub",
                "https://bad.example/sub\ntrojan://a@a.com:443#A",
            ],
            &fetcher,
        );
        assert_eq!(lines, ["hy2://p@h.com:443#H", "trojan://a@a.com:443#A"]);
    }

    #[test]
    fn test_encode_nodes() {
        let node = crate::uri::parse("trojan://pw@t.com:443?security=tls#T").unwrap();
        let body = encode_nodes([&node]);
        let lines = decode_subscription(&body);
        assert_eq!(lines.len(), 1);
        assert_eq!(crate::uri::parse(&lines[0]).unwrap(), node);
    }
}
