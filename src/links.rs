// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Link metadata discovery.
//!
//! Targets and topics prove that they designate this hub by publishing
//! `Link` headers (RFC 8288). This module fetches a resource once and turns
//! those headers into a relation map:
//!
//! ```text
//! Link: <https://hub.example/hub>; rel="hub", <https://example.org/res/1>; rel="self"
//! ```

use crate::error::{HubError, Result};
use reqwest::header::LINK;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;
use url::Url;

/// A single link target with its parameters (`rel` included).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub url: String,
    pub params: BTreeMap<String, String>,
}

/// A link together with every relation it was declared under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLink {
    pub rels: Vec<String>,
    pub link: Link,
}

/// Links of a resource grouped by relation name.
///
/// Relation names are stored lowercased; URLs are kept verbatim.
#[derive(Debug, Clone, Default)]
pub struct LinkMap {
    links: HashMap<String, Vec<Link>>,
}

impl LinkMap {
    /// Build a map from raw `Link` header values.
    pub fn from_headers<'a, I>(values: I, base: Option<&Url>) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut map = Self::default();
        for value in values {
            for parsed in parse_link_header(value, base) {
                for rel in parsed.rels {
                    map.links.entry(rel).or_default().push(parsed.link.clone());
                }
            }
        }
        map
    }

    /// All links declared under `rel`.
    pub fn get(&self, rel: &str) -> &[Link] {
        self.links
            .get(&rel.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Whether some link under `rel` points exactly at `url`.
    pub fn contains(&self, rel: &str, url: &str) -> bool {
        self.get(rel).iter().any(|link| link.url == url)
    }

    /// URLs declared under `rel`, for diagnostics.
    pub fn urls(&self, rel: &str) -> Vec<&str> {
        self.get(rel).iter().map(|link| link.url.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Number of distinct relations.
    pub fn len(&self) -> usize {
        self.links.len()
    }
}

/// Parse one `Link` header value into its links.
///
/// Links without a `rel` parameter are dropped. Relative references are
/// resolved against `base`; absolute ones are returned untouched.
pub fn parse_link_header(value: &str, base: Option<&Url>) -> Vec<ParsedLink> {
    let mut links = Vec::new();
    let mut rest = value;

    loop {
        rest = rest.trim_start_matches(|c: char| c == ',' || c.is_whitespace());
        if rest.is_empty() {
            break;
        }

        if !rest.starts_with('<') {
            // Not a link-value; resynchronise on the next separator.
            match rest.find(',') {
                Some(idx) => {
                    rest = &rest[idx + 1..];
                    continue;
                }
                None => break,
            }
        }

        let Some(end) = rest.find('>') else {
            break;
        };
        let reference = rest[1..end].trim();
        let (params, remaining) = parse_params(&rest[end + 1..]);
        rest = remaining;

        let rels: Vec<String> = params
            .get("rel")
            .map(|rel| rel.split_whitespace().map(str::to_ascii_lowercase).collect())
            .unwrap_or_default();
        if rels.is_empty() {
            continue;
        }

        links.push(ParsedLink {
            rels,
            link: Link {
                url: resolve(reference, base),
                params,
            },
        });
    }

    links
}

/// Parse `; name=value` pairs up to the next link separator.
///
/// Returns the parameters and the unconsumed input. The first occurrence
/// of a parameter wins.
fn parse_params(mut input: &str) -> (BTreeMap<String, String>, &str) {
    let mut params = BTreeMap::new();

    loop {
        input = input.trim_start();
        match input.strip_prefix(';') {
            Some(after) => input = after.trim_start(),
            None => return (params, input),
        }

        let name_end = input
            .find(|c: char| c == '=' || c == ';' || c == ',')
            .unwrap_or(input.len());
        let name = input[..name_end].trim().to_ascii_lowercase();
        input = &input[name_end..];

        let value = match input.strip_prefix('=') {
            Some(after_eq) => {
                let after_eq = after_eq.trim_start();
                if let Some(quoted) = after_eq.strip_prefix('"') {
                    let (value, remaining) = read_quoted(quoted);
                    input = remaining;
                    value
                } else {
                    let end = after_eq
                        .find(|c: char| c == ';' || c == ',')
                        .unwrap_or(after_eq.len());
                    input = &after_eq[end..];
                    after_eq[..end].trim().to_string()
                }
            }
            None => String::new(),
        };

        if !name.is_empty() {
            params.entry(name).or_insert(value);
        }
    }
}

/// Read a quoted-string body (opening quote already consumed).
fn read_quoted(input: &str) -> (String, &str) {
    let mut value = String::new();
    let mut escaped = false;

    for (idx, c) in input.char_indices() {
        if escaped {
            value.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '"' {
            return (value, &input[idx + 1..]);
        } else {
            value.push(c);
        }
    }

    // Unterminated quote swallows the remainder.
    (value, "")
}

fn resolve(reference: &str, base: Option<&Url>) -> String {
    if Url::parse(reference).is_ok() {
        return reference.to_string();
    }
    base.and_then(|base| base.join(reference).ok())
        .map(|url| url.to_string())
        .unwrap_or_else(|| reference.to_string())
}

/// Fetches resources and extracts their link metadata.
#[derive(Debug, Clone)]
pub struct LinkFetcher {
    client: reqwest::Client,
}

impl LinkFetcher {
    /// Create a fetcher on top of a configured client (timeouts included).
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// GET `url` once and return its links.
    ///
    /// Fails with [`HubError::FetchError`] when the URL is not http(s), the
    /// request fails, the status is not a success, or no `Link` header with
    /// a relation is present.
    pub async fn fetch(&self, url: &str) -> Result<LinkMap> {
        let parsed = Url::parse(url).map_err(|e| fetch_error(url, format!("not a URL: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return Err(fetch_error(url, "only http(s) URLs with a host can be fetched"));
        }

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| fetch_error(url, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_error(url, format!("responded with {status}")));
        }

        let base = response.url().clone();
        let links = LinkMap::from_headers(
            response
                .headers()
                .get_all(LINK)
                .iter()
                .filter_map(|value| value.to_str().ok()),
            Some(&base),
        );

        if links.is_empty() {
            return Err(fetch_error(url, "no Link header"));
        }

        debug!(url = %url, relations = links.len(), "Fetched link metadata");
        Ok(links)
    }
}

fn fetch_error(url: &str, reason: impl Into<String>) -> HubError {
    HubError::FetchError {
        url: url.to_string(),
        reason: reason.into(),
    }
}
