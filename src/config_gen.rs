//! Regenerates downstream MCP client config files (`mcp.json`,
//! `vscode_mcp.json`) describing every server the vault currently holds a
//! credential for, composing ingress headers with each server's egress
//! headers.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::json;
use tracing::warn;

use crate::error::Result;
use crate::token::vault::TokenVault;

/// One entry under `mcpServers` in the generated config.
#[derive(Debug, Clone, Serialize)]
pub struct ServerEntry {
    /// MCP endpoint URL for this server
    pub url: String,
    /// Headers to send on every request to this server
    pub headers: HashMap<String, String>,
    /// Whether VS Code/Roo-style clients should treat this server as disabled
    pub disabled: bool,
    /// Tool names pre-approved without a confirmation prompt
    #[serde(rename = "alwaysAllow")]
    pub always_allow: Vec<String>,
}

/// Regenerate every configured output directory's `mcp.json` and
/// `vscode_mcp.json` from the vault's current contents.
pub fn regenerate(vault: &TokenVault, output_dirs: &[std::path::PathBuf]) -> Result<()> {
    if output_dirs.is_empty() {
        return Ok(());
    }

    let servers = build_server_map(vault)?;
    let document = json!({ "mcpServers": servers });

    for dir in output_dirs {
        std::fs::create_dir_all(dir)?;
        for filename in ["mcp.json", "vscode_mcp.json"] {
            let path = dir.join(filename);
            std::fs::write(&path, serde_json::to_vec_pretty(&document)?)?;
        }
    }

    Ok(())
}

fn build_server_map(vault: &TokenVault) -> Result<HashMap<String, ServerEntry>> {
    let ingress_headers = ingress_headers(vault)?;
    let mut servers = HashMap::new();

    for path in vault.list()? {
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if stem == "ingress" || !stem.ends_with("-egress") {
            continue;
        }

        let Some(record) = vault.read(&path)? else {
            continue;
        };

        let (server_key, provider) = match parse_egress_stem(stem) {
            Some(parts) => parts,
            None => {
                warn!(path = %path.display(), "could not derive a server name from egress filename");
                continue;
            }
        };

        let mut headers = ingress_headers.clone();
        headers.insert("Authorization".to_string(), format!("Bearer {}", record.access_token));

        servers.insert(
            server_key,
            ServerEntry {
                url: format!("/{provider}/mcp"),
                headers,
                disabled: false,
                always_allow: Vec::new(),
            },
        );
    }

    Ok(servers)
}

/// `{provider}-egress.json` -> `(provider, provider)`;
/// `{provider}-{server}-egress.json` -> `(server, provider)`.
fn parse_egress_stem(stem: &str) -> Option<(String, String)> {
    let base = stem.strip_suffix("-egress")?;
    let mut parts = base.splitn(2, '-');
    let provider = parts.next()?.to_string();
    match parts.next() {
        Some(server) => Some((server.to_string(), provider)),
        None => Some((provider.clone(), provider)),
    }
}

fn ingress_headers(vault: &TokenVault) -> Result<HashMap<String, String>> {
    let mut headers = HashMap::new();
    if let Some(record) = vault.read(&vault.ingress_path())? {
        headers.insert("X-Authorization".to_string(), format!("Bearer {}", record.access_token));
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::vault::StoredTokenRecord;

    fn record() -> StoredTokenRecord {
        StoredTokenRecord {
            access_token: "tok".to_string(),
            refresh_token: None,
            expires_at: 9_999_999_999,
            scope: None,
            updated_at: 0,
        }
    }

    #[test]
    fn parses_provider_only_egress_stem() {
        assert_eq!(parse_egress_stem("cognito-egress"), Some(("cognito".to_string(), "cognito".to_string())));
    }

    #[test]
    fn parses_provider_and_server_egress_stem() {
        assert_eq!(
            parse_egress_stem("cognito-fininfo-egress"),
            Some(("fininfo".to_string(), "cognito".to_string()))
        );
    }

    #[test]
    fn builds_server_map_from_vault_contents() {
        let dir = tempfile::tempdir().unwrap();
        let vault = TokenVault::open(dir.path().to_path_buf()).unwrap();
        vault.write(&vault.ingress_path(), &record()).unwrap();
        vault.write(&vault.server_egress_path("cognito", "fininfo"), &record()).unwrap();

        let servers = build_server_map(&vault).unwrap();
        assert!(servers.contains_key("fininfo"));
        assert_eq!(servers["fininfo"].url, "/cognito/mcp");
        assert!(servers["fininfo"].headers.contains_key("X-Authorization"));
    }

    #[test]
    fn regenerate_is_a_no_op_with_no_output_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let vault = TokenVault::open(dir.path().to_path_buf()).unwrap();
        assert!(regenerate(&vault, &[]).is_ok());
    }
}
