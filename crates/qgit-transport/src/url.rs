//! Remote URL parsing.
//!
//! The helper accepts exactly one URL shape:
//!
//! ```text
//! qrexec://<peer>/<repo>[?keyring=<path>&...&list_head_only=<bool>]
//! ```
//!
//! The grammar is closed: unknown query keys, URL fragments, empty
//! components, and slashes inside the repo argument are all errors.

use crate::TransportError;

/// Parsed remote specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSpec {
    /// The peer (qrexec domain) the services are invoked on.
    pub peer: String,
    /// The repository argument appended to every service name.
    pub repo: String,
    /// Keyring paths handed to the signature verifier, unparsed.
    pub keyrings: Vec<String>,
    /// Whether listing asks only for tags on the remote head.
    pub list_head_only: bool,
}

impl RemoteSpec {
    /// Parse a `qrexec://` URL string.
    pub fn parse(url: &str) -> Result<Self, TransportError> {
        let invalid = |reason: &str| TransportError::InvalidUrl(format!("{reason}: {url}"));

        let rest = url
            .strip_prefix("qrexec://")
            .ok_or_else(|| invalid("scheme must be qrexec"))?;

        if rest.contains('#') {
            return Err(invalid("URL fragments are not allowed"));
        }

        let (location, query) = match rest.split_once('?') {
            Some((location, query)) => (location, Some(query)),
            None => (rest, None),
        };

        let (peer, repo) = location
            .split_once('/')
            .ok_or_else(|| invalid("missing repository path"))?;
        if peer.is_empty() {
            return Err(invalid("empty peer name"));
        }
        if repo.is_empty() {
            return Err(invalid("empty repository name"));
        }
        if repo.contains('/') {
            return Err(invalid("repository name may not contain '/'"));
        }

        let mut keyrings = Vec::new();
        let mut list_head_only: Option<bool> = None;

        if let Some(query) = query {
            for pair in query.split('&') {
                let (key, value) = pair
                    .split_once('=')
                    .ok_or_else(|| invalid("query entries must be key=value"))?;
                match key {
                    "keyring" => {
                        if value.is_empty() {
                            return Err(invalid("empty keyring path"));
                        }
                        keyrings.push(value.to_string());
                    }
                    "list_head_only" => {
                        if list_head_only.is_some() {
                            return Err(invalid("duplicate list_head_only"));
                        }
                        list_head_only = Some(
                            parse_bool(value)
                                .ok_or_else(|| invalid("invalid list_head_only value"))?,
                        );
                    }
                    _ => return Err(invalid("unrecognized query key")),
                }
            }
        }

        Ok(Self {
            peer: peer.to_string(),
            repo: repo.to_string(),
            keyrings,
            list_head_only: list_head_only.unwrap_or(true),
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}
