//! Minimal JSON-RPC request introspection: enough to pull a method name and,
//! for `tools/call`, the actual tool name out of a proxied request body.

use serde::Deserialize;
use serde_json::Value;

/// The pieces of a JSON-RPC request the Authorization Engine cares about.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RpcEnvelope {
    /// JSON-RPC method name (doubles as the "tool name" for non-`tools/call` methods)
    pub method: Option<String>,
    /// Method parameters, if any
    #[serde(default)]
    pub params: Value,
}

impl RpcEnvelope {
    /// Parse a JSON-RPC body. Returns `None` if it isn't a JSON object, or a
    /// default (empty) envelope if a `method` field is simply absent.
    #[must_use]
    pub fn parse(body: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(body).ok()?;
        if !value.is_object() {
            return None;
        }
        serde_json::from_value(value).ok()
    }

    /// For `tools/call`, the actual tool name from `params.name` (falling
    /// back to `params.tool`). For any other method, `None`.
    #[must_use]
    pub fn tool_name(&self) -> Option<String> {
        if self.method.as_deref() != Some("tools/call") {
            return None;
        }
        self.params
            .get("name")
            .or_else(|| self.params.get("tool"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

/// First path segment of a proxied URL, used as the server name
/// (`/{server_name}/...`). Strips scheme and host when present, so
/// `https://gw/fininfo/mcp` and `/fininfo/mcp` both yield `fininfo`.
#[must_use]
pub fn server_name_from_path(original_url: &str) -> Option<String> {
    let path = match url::Url::parse(original_url) {
        Ok(url) => url.path().to_string(),
        Err(_) => original_url.split(['?', '#']).next().unwrap_or(original_url).to_string(),
    };
    path.trim_matches('/').split('/').next().filter(|s| !s.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_method_and_tool_name_from_tools_call() {
        let body = r#"{"jsonrpc":"2.0","method":"tools/call","params":{"name":"search_docs"}}"#;
        let envelope = RpcEnvelope::parse(body).unwrap();
        assert_eq!(envelope.method.as_deref(), Some("tools/call"));
        assert_eq!(envelope.tool_name().as_deref(), Some("search_docs"));
    }

    #[test]
    fn non_tools_call_method_has_no_tool_name() {
        let body = r#"{"jsonrpc":"2.0","method":"tools/list"}"#;
        let envelope = RpcEnvelope::parse(body).unwrap();
        assert_eq!(envelope.tool_name(), None);
    }

    #[test]
    fn non_object_body_does_not_parse() {
        assert!(RpcEnvelope::parse("[1,2,3]").is_none());
        assert!(RpcEnvelope::parse("not json").is_none());
    }

    #[test]
    fn extracts_server_name_from_original_url() {
        assert_eq!(server_name_from_path("/fininfo/mcp?x=1"), Some("fininfo".to_string()));
        assert_eq!(server_name_from_path("/"), None);
        assert_eq!(server_name_from_path(""), None);
    }

    #[test]
    fn extracts_server_name_from_scheme_qualified_url() {
        assert_eq!(server_name_from_path("https://gw/fininfo/mcp"), Some("fininfo".to_string()));
        assert_eq!(server_name_from_path("https://gw.example.com/currencydata/mcp?x=1"), Some("currencydata".to_string()));
    }
}
