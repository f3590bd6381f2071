use serde_json::{json, Value};

use super::handler::ToolDef;
use crate::error::RegistryError;

/// Catalog of available tools. Built once at startup, then shared read-only
/// (usually behind an `Arc`) by every concurrent dispatch.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDef>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Register a tool. Names are unique within a registry.
    pub fn register(&mut self, def: ToolDef) -> Result<(), RegistryError> {
        if self.lookup(&def.name).is_some() {
            return Err(RegistryError::DuplicateTool(def.name));
        }
        self.tools.push(def);
        Ok(())
    }

    /// Builder form of `register`.
    pub fn with(mut self, def: ToolDef) -> Result<Self, RegistryError> {
        self.register(def)?;
        Ok(self)
    }

    pub fn lookup(&self, name: &str) -> Option<&ToolDef> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// Tool declarations for the model, in registration order.
    pub fn declarations(&self) -> Vec<Value> {
        self.tools.iter().map(ToolDef::declaration).collect()
    }

    /// Find tools whose name or description contains any query term,
    /// best match first. Ties keep registration order. Summaries carry only
    /// `name` and `description`.
    pub fn search(&self, query: &str) -> Vec<Value> {
        let terms: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();

        let mut scored: Vec<(usize, &ToolDef)> = self
            .tools
            .iter()
            .filter_map(|t| {
                let name = t.name.to_lowercase();
                let description = t.description.to_lowercase();
                let score: usize = terms
                    .iter()
                    .map(|term| {
                        let term = term.as_str();
                        2 * usize::from(name.contains(term)) + usize::from(description.contains(term))
                    })
                    .sum();
                (score > 0).then_some((score, t))
            })
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        scored
            .into_iter()
            .map(|(_, t)| json!({ "name": t.name, "description": t.description }))
            .collect()
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}
