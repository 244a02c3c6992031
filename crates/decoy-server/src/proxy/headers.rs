//! Header names and filters used when relaying traffic.

/// Marks a synthetic response produced because the upstream could not be reached.
pub const X_DECOY_PROXY_ERROR: &str = "x-decoy-proxy-error";

/// Connection-scoped headers that must not be forwarded by a proxy (RFC 9110 7.6.1).
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// Headers the HTTP client recomputes for every message.
pub fn is_transport_header(name: &str) -> bool {
    is_hop_by_hop(name)
        || name.eq_ignore_ascii_case("host")
        || name.eq_ignore_ascii_case("content-length")
}
