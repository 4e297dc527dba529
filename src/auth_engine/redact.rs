//! Log-redaction helpers for GDPR/SOX-sensitive fields: usernames, client
//! IPs, identity-provider ids, and anything that looks like a bearer token.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

/// Hash a username for privacy-safe logging: `user_{first 12 hex chars of sha256}`.
#[must_use]
pub fn hash_username(username: &str) -> String {
    if username.is_empty() {
        return "anonymous".to_string();
    }
    let digest = Sha256::digest(username.as_bytes());
    format!("user_{}", &hex::encode(digest)[..12])
}

/// Mask a sensitive identifier, keeping only the first and last 4 characters.
#[must_use]
pub fn mask_sensitive_id(value: &str) -> String {
    if value.len() <= 8 {
        return "***MASKED***".to_string();
    }
    format!("{}...{}", &value[..4], &value[value.len() - 4..])
}

/// Anonymize a client IP: mask the last IPv4 octet, or the last IPv6 segment.
#[must_use]
pub fn anonymize_ip(ip: &str) -> String {
    if ip.is_empty() || ip == "unknown" {
        return ip.to_string();
    }
    if ip.contains('.') {
        let parts: Vec<&str> = ip.split('.').collect();
        if parts.len() == 4 {
            return format!("{}.xxx", parts[..3].join("."));
        }
    } else if ip.contains(':') {
        let mut parts: Vec<&str> = ip.split(':').collect();
        if parts.len() > 1 {
            let last = parts.len() - 1;
            parts[last] = "xxxx";
            return parts.join(":");
        }
    }
    ip.to_string()
}

/// Mask a bearer token for logging, showing only its last 4 characters if
/// long enough to be a real token.
#[must_use]
pub fn mask_token(token: &str) -> String {
    if token.is_empty() {
        return "***EMPTY***".to_string();
    }
    if token.len() > 20 {
        format!("...{}", &token[token.len() - 4..])
    } else {
        "***MASKED***".to_string()
    }
}

/// Mask a header map's sensitive values before logging: `X-Authorization`,
/// `Authorization`, and `Cookie` are token-masked (preserving a `Bearer `
/// prefix); `X-User-Pool-Id`/`X-Client-Id` are id-masked; everything else
/// passes through unchanged.
#[must_use]
pub fn mask_headers(headers: &HashMap<String, String>) -> HashMap<String, String> {
    let mut masked = HashMap::with_capacity(headers.len());
    for (key, value) in headers {
        let key_lower = key.to_lowercase();
        let masked_value = match key_lower.as_str() {
            "x-authorization" | "authorization" | "cookie" => {
                if value.to_lowercase().contains("bearer") {
                    match value.split_once(' ') {
                        Some((_, token)) => format!("Bearer {}", mask_token(token)),
                        None => mask_token(value),
                    }
                } else {
                    "***MASKED***".to_string()
                }
            }
            "x-user-pool-id" | "x-client-id" => mask_sensitive_id(value),
            _ => value.clone(),
        };
        masked.insert(key.clone(), masked_value);
    }
    masked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_username_to_twelve_hex_chars() {
        let hashed = hash_username("alice");
        assert!(hashed.starts_with("user_"));
        assert_eq!(hashed.len(), "user_".len() + 12);
    }

    #[test]
    fn empty_username_hashes_to_anonymous() {
        assert_eq!(hash_username(""), "anonymous");
    }

    #[test]
    fn masks_short_ids_entirely() {
        assert_eq!(mask_sensitive_id("short"), "***MASKED***");
    }

    #[test]
    fn masks_long_ids_to_first_and_last_four() {
        assert_eq!(mask_sensitive_id("us-east-1_ABCDEFGH"), "us-e...EFGH");
    }

    #[test]
    fn anonymizes_ipv4_last_octet() {
        assert_eq!(anonymize_ip("203.0.113.42"), "203.0.113.xxx");
    }

    #[test]
    fn anonymizes_ipv6_last_segment() {
        assert_eq!(anonymize_ip("2001:db8::1"), "2001:db8::xxxx");
    }

    #[test]
    fn passes_through_unknown_ip() {
        assert_eq!(anonymize_ip("unknown"), "unknown");
    }

    #[test]
    fn masks_long_tokens_by_suffix() {
        let token = "a".repeat(30);
        assert_eq!(mask_token(&token), "...aaaa");
    }

    #[test]
    fn masks_short_tokens_entirely() {
        assert_eq!(mask_token("short-token"), "***MASKED***");
    }

    #[test]
    fn masks_bearer_authorization_header_preserving_scheme() {
        let mut headers = HashMap::new();
        headers.insert("Authorization".to_string(), format!("Bearer {}", "x".repeat(40)));
        let masked = mask_headers(&headers);
        assert!(masked["Authorization"].starts_with("Bearer ..."));
    }

    #[test]
    fn masks_cookie_header_entirely_when_not_bearer_shaped() {
        let mut headers = HashMap::new();
        headers.insert("Cookie".to_string(), "mcp_gateway_session=abc123".to_string());
        let masked = mask_headers(&headers);
        assert_eq!(masked["Cookie"], "***MASKED***");
    }

    #[test]
    fn passes_through_unrelated_headers() {
        let mut headers = HashMap::new();
        headers.insert("X-Region".to_string(), "us-east-1".to_string());
        let masked = mask_headers(&headers);
        assert_eq!(masked["X-Region"], "us-east-1");
    }
}
