//! Client key extraction.

use axum::http::HeaderMap;
use std::net::SocketAddr;

/// Header set by proxies with the chain of client addresses.
pub const FORWARDED_FOR: &str = "x-forwarded-for";
/// Header set by proxies with the single originating address.
pub const REAL_IP: &str = "x-real-ip";

/// Resolve the key a request is rate limited under.
///
/// Prefers the first `X-Forwarded-For` entry, then `X-Real-IP`, then the
/// transport peer with its port stripped. Never fails: a peer that does not
/// parse is used verbatim and a request with no peer at all gets the empty
/// key. Clients behind one proxy share a key.
pub fn client_key(headers: &HeaderMap, peer: Option<&str>) -> String {
    if let Some(first) = header_str(headers, FORWARDED_FOR)
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
    {
        return first.to_string();
    }

    if let Some(real_ip) = header_str(headers, REAL_IP)
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
    {
        return real_ip.to_string();
    }

    peer.map(peer_host).unwrap_or_default()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Strip the port from a `host:port` or `[host]:port` peer address.
///
/// Anything that cannot be split (no port, or a bare IPv6 address) is
/// returned unchanged.
pub fn peer_host(raw: &str) -> String {
    if let Ok(addr) = raw.parse::<SocketAddr>() {
        return addr.ip().to_string();
    }

    let Some((host, _port)) = raw.rsplit_once(':') else {
        return raw.to_string();
    };
    if let Some(inner) = host.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
        return inner.to_string();
    }
    if host.contains([':', '[', ']']) {
        return raw.to_string();
    }
    host.to_string()
}
