//! Turns analysis entries into knowledge facts.

use graphbridge_store::{AnalysisEntry, Relationship};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Default namespace facts are filed under.
pub const DEFAULT_GROUP_ID: &str = "market_signals";

/// One atomic statement submitted to the knowledge graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeFact {
    /// Human-readable statement.
    pub content: String,
    /// Namespace in the graph.
    pub group_id: String,
}

impl KnowledgeFact {
    /// Tool arguments for submitting this fact.
    pub fn to_arguments(&self) -> Value {
        json!({
            "content": self.content,
            "group_id": self.group_id,
        })
    }
}

/// Stateless fact extractor.
///
/// For each entry it emits one primary fact, then one fact per relationship
/// that has both a target and a type. Nothing here can fail: missing fields
/// shrink the output instead.
#[derive(Debug, Clone)]
pub struct FactExtractor {
    group_id: String,
}

impl FactExtractor {
    /// Create an extractor filing facts under `group_id`.
    pub fn new(group_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
        }
    }

    /// The namespace facts are filed under.
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// Extract facts in entry order, primary fact first within each entry.
    pub fn extract(&self, entries: &[AnalysisEntry]) -> Vec<KnowledgeFact> {
        let mut facts = Vec::with_capacity(entries.len());

        for entry in entries {
            facts.push(self.fact(primary_content(entry)));
            facts.extend(
                entry
                    .relationships
                    .iter()
                    .filter_map(|rel| relationship_content(&entry.summary, rel))
                    .map(|content| self.fact(content)),
            );
        }

        facts
    }

    fn fact(&self, content: String) -> KnowledgeFact {
        KnowledgeFact {
            content,
            group_id: self.group_id.clone(),
        }
    }
}

impl Default for FactExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_GROUP_ID)
    }
}

fn primary_content(entry: &AnalysisEntry) -> String {
    format!("MARKET SIGNAL: {}. Detail: {}", entry.summary, entry.detail)
}

fn relationship_content(summary: &str, rel: &Relationship) -> Option<String> {
    let target = rel.target.as_deref()?;
    let kind = rel.kind.as_deref()?;
    Some(format!(
        "RELATIONSHIP: {} {} {}. Context: {}",
        summary, kind, target, rel.description
    ))
}
