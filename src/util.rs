//! Small helpers shared by the pipeline, the dispatcher and the handlers.

use axum::http::HeaderMap;
use once_cell::sync::Lazy;
use regex::Regex;
use std::net::SocketAddr;

/// Identity used when neither a peer address nor a trusted forwarded header
/// is available (e.g. requests driven directly through the router in tests).
pub const UNKNOWN_IDENTITY: &str = "unknown";

/// Resolve the rate-limit identity of a request. With `trust_proxy` the
/// last `X-Forwarded-For` hop wins: it is the one appended by the single
/// trusted reverse proxy, while earlier hops are client-supplied. Otherwise
/// the socket peer address is used.
pub fn client_identity(headers: &HeaderMap, peer: Option<SocketAddr>, trust_proxy: bool) -> String {
    if trust_proxy {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|raw| raw.rsplit(',').next())
            .map(str::trim)
            .filter(|hop| !hop.is_empty());
        if let Some(hop) = forwarded {
            return hop.to_string();
        }
    }
    match peer {
        Some(addr) => addr.ip().to_string(),
        None => UNKNOWN_IDENTITY.to_string(),
    }
}

/// Keep at most `max_chars` characters, appending `...` when cut.
pub fn truncate_for_log(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

static CODE_FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^\s*```[A-Za-z0-9_-]*[ \t]*\n?(.*?)\s*```\s*$").unwrap());

/// Models frequently wrap JSON answers in a Markdown code fence. Return the
/// fenced content if the whole reply is one fence, otherwise the trimmed reply.
pub fn strip_code_fence(raw: &str) -> &str {
    match CODE_FENCE_RE.captures(raw).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => raw.trim(),
    }
}
