//! On-disk shape of the Tool Index metadata document: `service_path ->
//! { id, text, full_server_info }`, mirroring the vector index position via
//! `id` so the two files stay in lockstep.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One tool entry in a service's `tool_list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Tool name as exposed over MCP
    pub name: String,
    /// Parsed/structured description, at minimum a `main` summary line
    pub parsed_description: ParsedDescription,
    /// The tool's JSON schema, opaque to the index
    #[serde(default)]
    pub schema: serde_json::Value,
}

/// A tool's description, split into the one-line summary used for
/// candidate-string construction and any extra structured fields upstream
/// tooling attaches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedDescription {
    /// One-sentence summary used when building the ranking candidate string
    pub main: String,
    /// Any other parsed fields (parameters, examples, ...), passed through
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// The full metadata blob for one registered service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Human-readable service name
    pub server_name: String,
    /// Whether this service currently participates in discovery
    pub is_enabled: bool,
    /// Every tool this service exposes
    #[serde(default)]
    pub tool_list: Vec<ToolInfo>,
}

/// One entry in the metadata document, keyed by `service_path` in the
/// document's top-level map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceMetadata {
    /// Position of this service's vector inside the index file — the
    /// bijection between index position and `service_path`
    pub id: usize,
    /// Text that was embedded to produce this service's vector
    pub text: String,
    /// The service's full descriptive record
    pub full_server_info: ServerInfo,
}

/// The metadata document's on-disk shape: `{ "metadata": { service_path:
/// ServiceMetadata } }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataDocument {
    /// `service_path -> ServiceMetadata`
    pub metadata: HashMap<String, ServiceMetadata>,
}

impl MetadataDocument {
    /// Reverse-lookup: which `service_path` sits at vector position `id`.
    #[must_use]
    pub fn service_path_for_id(&self, id: usize) -> Option<&str> {
        self.metadata
            .iter()
            .find(|(_, meta)| meta.id == id)
            .map(|(path, _)| path.as_str())
    }
}
