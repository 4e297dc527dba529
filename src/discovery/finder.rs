//! Two-stage tool finder: a cheap service-level vector search narrows the
//! fleet down to a handful of candidates, then a per-tool cosine re-ranking
//! pass picks the best matches among just those services' tools.

use serde::Serialize;
use serde_json::Value;

use crate::discovery::embedding::Embedder;
use crate::discovery::index::{cosine_similarity, VectorIndex};
use crate::discovery::metadata::MetadataDocument;
use crate::error::Result;

/// One ranked tool returned by [`find`].
#[derive(Debug, Clone, Serialize)]
pub struct ToolMatch {
    pub tool_name: String,
    pub tool_parsed_description: String,
    pub tool_schema: Value,
    pub service_path: String,
    pub service_name: String,
    pub overall_similarity_score: f32,
}

/// Run the two-stage search described by the module: service-level nearest
/// neighbors first, then cosine re-ranking over just those services' tools.
pub fn find(
    index: &VectorIndex,
    metadata: &MetadataDocument,
    embedder: &Embedder,
    query: &str,
    top_k_services: usize,
    top_n_tools: usize,
) -> Result<Vec<ToolMatch>> {
    let query_vector = embedder.embed_one(query)?;
    let service_hits = index.search(&query_vector, top_k_services);

    struct Candidate {
        text: String,
        description: String,
        service_path: String,
        service_name: String,
        schema: Value,
        tool_name: String,
    }

    let mut candidates: Vec<Candidate> = Vec::new();

    for hit in service_hits {
        let Some(service_path) = metadata.service_path_for_id(hit.id) else {
            continue;
        };
        let Some(service_meta) = metadata.metadata.get(service_path) else {
            continue;
        };
        let info = &service_meta.full_server_info;
        if !info.is_enabled {
            continue;
        }

        for tool in &info.tool_list {
            candidates.push(Candidate {
                text: format!(
                    "Service: {}. Tool: {}. Description: {}",
                    info.server_name, tool.name, tool.parsed_description.main
                ),
                description: tool.parsed_description.main.clone(),
                service_path: service_path.to_string(),
                service_name: info.server_name.clone(),
                schema: tool.schema.clone(),
                tool_name: tool.name.clone(),
            });
        }
    }

    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let candidate_texts: Vec<&str> = candidates.iter().map(|c| c.text.as_str()).collect();
    let candidate_vectors = embedder.embed_many(&candidate_texts)?;

    let mut ranked: Vec<ToolMatch> = candidates
        .into_iter()
        .zip(candidate_vectors.iter())
        .map(|(candidate, vector)| ToolMatch {
            tool_name: candidate.tool_name,
            tool_parsed_description: candidate.description,
            tool_schema: candidate.schema,
            service_path: candidate.service_path,
            service_name: candidate.service_name,
            overall_similarity_score: cosine_similarity(&query_vector, vector),
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.overall_similarity_score
            .partial_cmp(&a.overall_similarity_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked.truncate(top_n_tools);

    Ok(ranked)
}
