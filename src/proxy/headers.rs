//! Outbound header construction.
//!
//! [`build_outbound_headers`] clones the inbound headers unchanged and
//! rewrites `host` to the upstream authority. Hop-by-hop headers are
//! forwarded as-is unless stripping was requested at startup.

use std::sync::LazyLock;

use http::{header, HeaderMap, HeaderName, HeaderValue};

static HOP_BY_HOP: LazyLock<Vec<HeaderName>> = LazyLock::new(|| {
    [
        "connection",
        "keep-alive",
        "transfer-encoding",
        "te",
        "trailer",
        "upgrade",
        "proxy-authorization",
        "proxy-authenticate",
    ]
    .iter()
    .filter_map(|name| name.parse::<HeaderName>().ok())
    .collect()
});

pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
}

pub fn build_outbound_headers(
    original: &HeaderMap,
    authority: &HeaderValue,
    strip: bool,
) -> HeaderMap {
    let mut headers = original.clone();
    if strip {
        strip_hop_by_hop(&mut headers);
    }
    headers.insert(header::HOST, authority.clone());
    headers
}
