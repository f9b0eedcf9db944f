//! Endpoint address sanitization and normalization
//!
//! Profile configuration carries remote endpoints as free-form strings
//! (`host`, `host:port`, `[v6]:port`, bare IPv6). These helpers turn them
//! into a stable form used as connection keys and in logs. Nothing here
//! fails: anything that does not parse degrades to a plain host without port.

use std::net::IpAddr;

/// Maximum number of characters kept from an untrusted host string
pub const MAX_HOST_LEN: usize = 256;

/// Port omitted from normalized addresses
pub const DEFAULT_TLS_PORT: u16 = 443;

fn is_host_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | ':' | '[' | ']')
}

/// Truncate `input` to `max_len` characters, then drop every character
/// outside `[A-Za-z0-9-.:\[\]]`
pub fn filter_host(input: &str, max_len: usize) -> String {
    input
        .chars()
        .take(max_len)
        .filter(|c| is_host_char(*c))
        .collect()
}

/// Parse a port suffix. Malformed, empty and out of range values become 0.
fn parse_port(s: &str) -> u16 {
    s.parse().unwrap_or(0)
}

fn push_port(addr: &mut String, port: u16) {
    if port != 0 && port != DEFAULT_TLS_PORT {
        addr.push(':');
        addr.push_str(&port.to_string());
    }
}

fn bracket_ip(s: &str) -> Option<String> {
    s.parse::<IpAddr>().ok().map(|ip| format!("[{}]", ip))
}

/// Canonicalize an endpoint string
///
/// The input is filtered with [`filter_host`] first. IPv6 literals are
/// rewritten in canonical form inside brackets, and a port is kept only when
/// it is non-zero and not [`DEFAULT_TLS_PORT`].
pub fn normalize_address(input: &str) -> String {
    let input = filter_host(input, MAX_HOST_LEN);

    if input.starts_with('[') {
        if let Some(end) = input.rfind(']') {
            let inner = &input[1..end];
            let mut addr = if inner.contains(':') {
                bracket_ip(inner).unwrap_or_else(|| inner.to_string())
            } else {
                inner.to_string()
            };

            if let Some(colon) = input.rfind(':') {
                if colon > end {
                    push_port(&mut addr, parse_port(&input[colon + 1..]));
                }
            }

            return addr;
        }
    }

    if let Some(colon) = input.rfind(':') {
        // Bare IPv6 without brackets carries no port
        if let Some(addr) = bracket_ip(&input) {
            return addr;
        }

        let host = &input[..colon];
        let mut addr = if host.contains(':') {
            bracket_ip(host).unwrap_or_else(|| host.to_string())
        } else {
            host.to_string()
        };
        push_port(&mut addr, parse_port(&input[colon + 1..]));

        return addr;
    }

    input
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_host() {
        assert_eq!(filter_host("vpn.example.com", MAX_HOST_LEN), "vpn.example.com");
        assert_eq!(filter_host("", MAX_HOST_LEN), "");
        assert_eq!(filter_host("  \"vpn.example.com\" ", MAX_HOST_LEN), "vpn.example.com");
        assert_eq!(filter_host("host;rm -rf /", MAX_HOST_LEN), "hostrm-rf");
        assert_eq!(filter_host("[2001:db8::1]:1194", MAX_HOST_LEN), "[2001:db8::1]:1194");
        assert_eq!(filter_host("héllo_wörld", MAX_HOST_LEN), "hllowrld");
    }

    #[test]
    fn test_filter_host_truncates_before_filtering() {
        assert_eq!(filter_host("abcdef", 3), "abc");
        // Disallowed characters still count toward the cap
        assert_eq!(filter_host("a b c d", 4), "ab");
        assert_eq!(filter_host("abc", 0), "");
    }

    #[test]
    fn test_filter_host_output_bounds() {
        let inputs = [
            "x".repeat(1000),
            "\u{0}\u{1}\t\n".to_string(),
            "[::1]:443 ; `id`".to_string(),
            "ünïcödé".repeat(50),
        ];
        for input in &inputs {
            for cap in [0, 1, 16, MAX_HOST_LEN] {
                let out = filter_host(input, cap);
                assert!(out.chars().count() <= cap);
                assert!(out.chars().all(is_host_char));
            }
        }
    }

    #[test]
    fn test_normalize_ipv4() {
        assert_eq!(normalize_address("192.0.2.10"), "192.0.2.10");
        assert_eq!(normalize_address("192.0.2.10:443"), "192.0.2.10");
        assert_eq!(normalize_address("192.0.2.10:1194"), "192.0.2.10:1194");
        assert_eq!(normalize_address("192.0.2.10:0"), "192.0.2.10");
    }

    #[test]
    fn test_normalize_ipv6() {
        assert_eq!(normalize_address("[2001:db8::1]:1194"), "[2001:db8::1]:1194");
        assert_eq!(normalize_address("[2001:db8::1]:443"), "[2001:db8::1]");
        assert_eq!(normalize_address("[2001:db8::1]"), "[2001:db8::1]");
        assert_eq!(normalize_address("2001:db8::1"), "[2001:db8::1]");
        assert_eq!(normalize_address("[2001:0db8:0000::0001]:51820"), "[2001:db8::1]:51820");
        assert_eq!(normalize_address("2001:0DB8::0001"), "[2001:db8::1]");
    }

    #[test]
    fn test_normalize_hostnames() {
        assert_eq!(normalize_address("vpn.example.com"), "vpn.example.com");
        assert_eq!(normalize_address("vpn.example.com:443"), "vpn.example.com");
        assert_eq!(normalize_address("vpn.example.com:8443"), "vpn.example.com:8443");
        // Brackets around a non-IP are stripped
        assert_eq!(normalize_address("[vpn.example.com]:1194"), "vpn.example.com:1194");
    }

    #[test]
    fn test_normalize_malformed_ports() {
        assert_eq!(normalize_address("192.0.2.10:abc"), "192.0.2.10");
        assert_eq!(normalize_address("192.0.2.10:"), "192.0.2.10");
        assert_eq!(normalize_address("192.0.2.10:99999"), "192.0.2.10");
        assert_eq!(normalize_address("[2001:db8::1]:x"), "[2001:db8::1]");
    }

    #[test]
    fn test_normalize_strips_and_truncates() {
        assert_eq!(normalize_address(" 192.0.2.10 : 1194 "), "192.0.2.10:1194");
        assert_eq!(normalize_address("\"vpn.example.com\""), "vpn.example.com");

        let long = format!("{}:1194", "a".repeat(300));
        assert_eq!(normalize_address(&long), "a".repeat(MAX_HOST_LEN));

        let exact = format!("{}:1194", "a".repeat(MAX_HOST_LEN - 5));
        assert_eq!(normalize_address(&exact), exact);
    }

    #[test]
    fn test_normalize_edge_cases() {
        assert_eq!(normalize_address(""), "");
        assert_eq!(normalize_address("[]"), "");
        assert_eq!(normalize_address("["), "[");
        assert_eq!(normalize_address(":1194"), ":1194");
    }

    #[test]
    fn test_normalize_idempotent() {
        let inputs = [
            "192.0.2.10",
            "192.0.2.10:443",
            "192.0.2.10:1194",
            "[2001:db8::1]:1194",
            "2001:db8::1",
            "[2001:0db8::0001]:443",
            "vpn.example.com:8443",
            "[vpn.example.com]:1194",
            "::ffff:192.0.2.1",
        ];
        for input in inputs {
            let once = normalize_address(input);
            assert_eq!(normalize_address(&once), once, "input {:?}", input);
        }
    }
}
