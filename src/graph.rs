//! Graph loader (component C6).
//!
//! Parses a pipeline document — a top-level JSON object whose reserved
//! `var_global` key holds process-wide variable definitions, and whose
//! every other key names a [`Node`]. Load fails only on malformed JSON
//! (§4.6) — anything else (missing recognition/action, unknown fields,
//! dangling successor references) degrades gracefully at parse or run
//! time rather than here.

use ahash::AHashMap;
use serde_json::Value as Json;

use crate::error::LoadError;
use crate::node::Node;

/// The result of loading a pipeline document: a name-indexed node map plus
/// the raw `var_global` definition strings, ready for
/// [`crate::variable::VariableStore::parse_definitions`].
#[derive(Debug, Clone, Default)]
pub struct Graph {
    pub nodes: AHashMap<String, Node>,
    pub var_global: Vec<String>,
}

impl Graph {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }
}

/// Parses a pipeline document from its JSON text.
pub fn load(document: &str) -> Result<Graph, LoadError> {
    let parsed: Json = serde_json::from_str(document)?;
    load_value(&parsed)
}

/// As [`load`], from an already-parsed [`serde_json::Value`].
pub fn load_value(parsed: &Json) -> Result<Graph, LoadError> {
    let Some(top) = parsed.as_object() else {
        return Ok(Graph::default());
    };

    let var_global = match top.get("var_global") {
        None => Vec::new(),
        Some(Json::String(s)) => vec![s.clone()],
        Some(Json::Array(items)) => items
            .iter()
            .map(|item| item.as_str().map(str::to_owned).ok_or_else(|| {
                LoadError::MalformedVarGlobal(format!("non-string entry: {item}"))
            }))
            .collect::<Result<Vec<_>, _>>()?,
        Some(other) => return Err(LoadError::MalformedVarGlobal(other.to_string())),
    };

    let nodes = top
        .iter()
        .filter(|(key, _)| key.as_str() != "var_global")
        .map(|(name, config)| (name.clone(), Node::parse(name, config)))
        .collect();

    Ok(Graph { nodes, var_global })
}
