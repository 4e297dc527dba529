//! Scope policy document and the authorization algorithm that resolves a
//! principal's scopes against a requested `(server, method, tool)` triple.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One server-scoped grant within a named scope: the set of JSON-RPC
/// methods and/or tool names a scope unlocks on a given MCP server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerGrant {
    /// MCP server name this grant applies to
    pub server: String,
    /// JSON-RPC methods allowed outright (e.g. `initialize`,
    /// `tools/list`) — `tools/call` is deliberately never satisfied by this
    /// list alone, see [`Policy::validate_server_tool_access`].
    #[serde(default)]
    pub methods: Vec<String>,
    /// Tool names allowed for `tools/call`
    #[serde(default)]
    pub tools: Vec<String>,
}

/// The full scope policy document: named scopes, each a list of
/// [`ServerGrant`]s, plus a mapping from identity-provider group name to the
/// scopes that group confers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyDocument {
    /// group name -> scopes granted
    #[serde(default)]
    pub group_mappings: HashMap<String, Vec<String>>,
    /// scope name -> server grants, via a flattened top-level map (every
    /// other key besides `group_mappings` is a scope name)
    #[serde(flatten)]
    pub scopes: HashMap<String, Vec<ServerGrant>>,
}

impl PolicyDocument {
    /// Load from a YAML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&text)?)
    }

    /// Map identity-provider groups to scopes via `group_mappings`,
    /// de-duplicating while preserving first-seen order.
    #[must_use]
    pub fn map_groups_to_scopes(&self, groups: &[String]) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut scopes = Vec::new();

        for group in groups {
            let Some(group_scopes) = self.group_mappings.get(group) else {
                continue;
            };
            for scope in group_scopes {
                if seen.insert(scope.clone()) {
                    scopes.push(scope.clone());
                }
            }
        }

        scopes
    }
}

/// Live-reloadable policy: an [`ArcSwap`] pointer to the current
/// [`PolicyDocument`], refreshed by re-reading the backing file.
///
/// Mirrors the guarded atomic-pointer-swap pattern used for the Tool Index:
/// readers never block on a reload, and a reload replaces the whole
/// document atomically so a reader never observes a half-updated policy.
pub struct Policy {
    path: PathBuf,
    current: ArcSwap<PolicyDocument>,
    /// Whether the backing file existed the last time it was (re)loaded.
    /// Tracked separately from `current.scopes` being empty: a file that
    /// exists but only defines `group_mappings` must still fail closed.
    file_present: std::sync::atomic::AtomicBool,
}

impl Policy {
    /// Load the policy document from `path`. If the file is missing
    /// entirely, the policy starts empty — callers must still fail closed
    /// on an empty-scopes principal; an empty *document* at startup simply
    /// means no scope grants any access yet, not "allow everything".
    pub fn load(path: PathBuf) -> Result<Self> {
        let file_present = path.exists();
        let document = if file_present {
            PolicyDocument::load(&path)?
        } else {
            PolicyDocument::default()
        };

        Ok(Self {
            path,
            current: ArcSwap::new(Arc::new(document)),
            file_present: std::sync::atomic::AtomicBool::new(file_present),
        })
    }

    /// Re-read the backing file and atomically swap it in.
    pub fn reload(&self) -> Result<()> {
        let file_present = self.path.exists();
        let document = if file_present {
            PolicyDocument::load(&self.path)?
        } else {
            PolicyDocument::default()
        };
        self.current.store(Arc::new(document));
        self.file_present.store(file_present, std::sync::atomic::Ordering::Relaxed);
        Ok(())
    }

    /// Current policy document snapshot.
    #[must_use]
    pub fn current(&self) -> Arc<PolicyDocument> {
        self.current.load_full()
    }

    /// Map groups to scopes against the current snapshot.
    #[must_use]
    pub fn map_groups_to_scopes(&self, groups: &[String]) -> Vec<String> {
        self.current().map_groups_to_scopes(groups)
    }

    /// Whether a set of user scopes grants access to `server.method`
    /// (and, for `tools/call`, to `tool_name`).
    ///
    /// Access is permissive only when the backing file is wholly absent,
    /// matching the original server's bootstrap behavior of allowing
    /// everything until a scopes file is written. A file that exists but
    /// defines no scope grants (or only `group_mappings`) fails closed,
    /// same as an empty `user_scopes`.
    #[must_use]
    pub fn validate_server_tool_access(&self, server_name: &str, method: &str, tool_name: Option<&str>, user_scopes: &[String]) -> bool {
        if !self.file_present.load(std::sync::atomic::Ordering::Relaxed) {
            return true;
        }

        let document = self.current();

        if user_scopes.is_empty() {
            return false;
        }

        for scope in user_scopes {
            let Some(server_grants) = document.scopes.get(scope) else {
                continue;
            };

            for grant in server_grants {
                if grant.server != server_name {
                    continue;
                }

                // for all methods except tools/call we are good if the method is allowed;
                // tools/call additionally requires the specific tool to be listed
                if method != "tools/call" && grant.methods.iter().any(|m| m == method) {
                    return true;
                }

                if method == "tools/call" {
                    if let Some(tool_name) = tool_name
                        && grant.tools.iter().any(|t| t == tool_name)
                    {
                        return true;
                    }
                } else if grant.tools.iter().any(|t| t == method) {
                    // backward-compatible: some grants list non-call methods in `tools`
                    return true;
                }
            }
        }

        false
    }

    /// Whether `requested_scopes` is a subset of `user_scopes` (used when
    /// minting a narrower self-signed token than the caller's own scopes).
    /// An empty request is always valid — it means "whatever I already have".
    #[must_use]
    pub fn validate_scope_subset(user_scopes: &[String], requested_scopes: &[String]) -> bool {
        if requested_scopes.is_empty() {
            return true;
        }
        let user: std::collections::HashSet<&String> = user_scopes.iter().collect();
        requested_scopes.iter().all(|s| user.contains(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_document() -> PolicyDocument {
        let mut scopes = HashMap::new();
        scopes.insert(
            "mcp-servers-unrestricted/read".to_string(),
            vec![ServerGrant {
                server: "fininfo".to_string(),
                methods: vec!["initialize".to_string(), "tools/list".to_string()],
                tools: vec!["get_stock_price".to_string()],
            }],
        );
        let mut group_mappings = HashMap::new();
        group_mappings.insert(
            "mcp-registry-readonly".to_string(),
            vec!["mcp-servers-unrestricted/read".to_string()],
        );
        PolicyDocument { group_mappings, scopes }
    }

    /// A policy backed by a document that was loaded from a real (present)
    /// file — as opposed to [`Policy::load`] against a missing path.
    fn policy_with(document: PolicyDocument) -> Policy {
        Policy {
            path: PathBuf::from("/nonexistent/scopes.yml"),
            current: ArcSwap::new(Arc::new(document)),
            file_present: std::sync::atomic::AtomicBool::new(true),
        }
    }

    #[test]
    fn maps_group_to_scopes_and_dedupes() {
        let document = sample_document();
        let scopes = document.map_groups_to_scopes(&["mcp-registry-readonly".to_string(), "mcp-registry-readonly".to_string()]);
        assert_eq!(scopes, vec!["mcp-servers-unrestricted/read".to_string()]);
    }

    #[test]
    fn unknown_group_contributes_nothing() {
        let document = sample_document();
        let scopes = document.map_groups_to_scopes(&["no-such-group".to_string()]);
        assert!(scopes.is_empty());
    }

    #[test]
    fn allows_plain_method_via_methods_list() {
        let policy = policy_with(sample_document());
        assert!(policy.validate_server_tool_access(
            "fininfo",
            "tools/list",
            None,
            &["mcp-servers-unrestricted/read".to_string()]
        ));
    }

    #[test]
    fn allows_tools_call_only_for_listed_tool() {
        let policy = policy_with(sample_document());
        assert!(policy.validate_server_tool_access(
            "fininfo",
            "tools/call",
            Some("get_stock_price"),
            &["mcp-servers-unrestricted/read".to_string()]
        ));
        assert!(!policy.validate_server_tool_access(
            "fininfo",
            "tools/call",
            Some("delete_everything"),
            &["mcp-servers-unrestricted/read".to_string()]
        ));
    }

    #[test]
    fn denies_when_server_does_not_match() {
        let policy = policy_with(sample_document());
        assert!(!policy.validate_server_tool_access(
            "other-server",
            "tools/list",
            None,
            &["mcp-servers-unrestricted/read".to_string()]
        ));
    }

    #[test]
    fn fails_closed_on_empty_scopes_once_a_policy_exists() {
        let policy = policy_with(sample_document());
        assert!(!policy.validate_server_tool_access("fininfo", "tools/list", None, &[]));
    }

    #[test]
    fn missing_policy_file_is_the_sole_permissive_case() {
        let policy = Policy::load(PathBuf::from("/nonexistent/path/scopes.yml")).unwrap();
        assert!(policy.validate_server_tool_access("fininfo", "tools/list", None, &["anything".to_string()]));
    }

    #[test]
    fn present_file_with_only_group_mappings_fails_closed() {
        let mut group_mappings = HashMap::new();
        group_mappings.insert("mcp-registry-readonly".to_string(), vec!["mcp-servers-unrestricted/read".to_string()]);
        let document = PolicyDocument {
            group_mappings,
            scopes: HashMap::new(),
        };
        let policy = policy_with(document);
        assert!(!policy.validate_server_tool_access("fininfo", "tools/list", None, &["mcp-servers-unrestricted/read".to_string()]));
    }

    #[test]
    fn reload_picks_up_a_file_created_after_startup() {
        let dir = std::env::temp_dir().join(format!("mcp-auth-registry-policy-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("scopes.yml");
        let _ = std::fs::remove_file(&path);

        let policy = Policy::load(path.clone()).unwrap();
        assert!(policy.validate_server_tool_access("fininfo", "tools/list", None, &["anything".to_string()]));

        std::fs::write(&path, "mcp-servers-unrestricted/read:\n  - server: fininfo\n    methods: [tools/list]\n    tools: []\n").unwrap();
        policy.reload().unwrap();
        assert!(!policy.validate_server_tool_access("fininfo", "tools/list", None, &[]));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn scope_subset_validation() {
        let user = vec!["a".to_string(), "b".to_string()];
        assert!(Policy::validate_scope_subset(&user, &[]));
        assert!(Policy::validate_scope_subset(&user, &["a".to_string()]));
        assert!(!Policy::validate_scope_subset(&user, &["c".to_string()]));
    }
}
