//! The fixed set of tools the assistant may call, and their dispatch.
//!
//! The model names a tool and passes JSON arguments; [`ToolRegistry::parse`] turns that into
//! a [`ToolCall`] variant or a [`ToolError`], and [`ToolRegistry::dispatch`] runs it.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::search::{SearchHit, SearchRequest, SemanticSearch};

/// Search settings the chat tool always uses.
pub const SEARCH_TOOL_LIMIT: usize = 10;
pub const SEARCH_TOOL_MIN_SCORE: f32 = 0.1;

/// Name, description and JSON-schema input of a tool, as sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Search,
}

impl Tool {
    pub const ALL: [Tool; 1] = [Tool::Search];

    pub fn name(self) -> &'static str {
        match self {
            Tool::Search => "search",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    pub fn definition(self) -> ToolDefinition {
        match self {
            Tool::Search => ToolDefinition {
                name: self.name().to_string(),
                description: "Search for products in the database".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "query": { "type": "string", "description": "The search query" }
                    },
                    "required": ["query"]
                }),
            },
        }
    }
}

/// A validated tool invocation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "name", content = "arguments", rename_all = "lowercase")]
pub enum ToolCall {
    Search { query: String },
}

/// What a tool hands back to the model, serialized as the tool message content.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ToolOutput {
    Search(Vec<SearchHit>),
    Error { error: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("invalid arguments for {tool}: {source}")]
    InvalidArguments {
        tool: &'static str,
        source: serde_json::Error,
    },
}

#[derive(Clone)]
pub struct ToolRegistry {
    search: SemanticSearch,
}

impl ToolRegistry {
    pub fn new(search: SemanticSearch) -> Self {
        Self { search }
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        Tool::ALL.into_iter().map(Tool::definition).collect()
    }

    /// Match a model-requested tool against the registry and decode its arguments.
    /// Arguments may arrive as an object or as a JSON-encoded string.
    pub fn parse(&self, name: &str, arguments: Value) -> Result<ToolCall, ToolError> {
        let tool = Tool::from_name(name).ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        let arguments = match arguments {
            Value::String(s) => serde_json::from_str(&s)
                .map_err(|source| ToolError::InvalidArguments { tool: tool.name(), source })?,
            other => other,
        };
        serde_json::from_value(json!({ "name": tool.name(), "arguments": arguments }))
            .map_err(|source| ToolError::InvalidArguments { tool: tool.name(), source })
    }

    pub async fn dispatch(&self, call: ToolCall) -> ToolOutput {
        match call {
            ToolCall::Search { query } => ToolOutput::Search(self.search_products(&query).await),
        }
    }

    /// Parse and dispatch. Problems are reported to the model, never raised.
    pub async fn execute(&self, name: &str, arguments: Value) -> ToolOutput {
        match self.parse(name, arguments) {
            Ok(call) => self.dispatch(call).await,
            Err(e) => {
                tracing::warn!(tool = name, error = %e, "rejected tool call");
                ToolOutput::Error { error: e.to_string() }
            }
        }
    }

    /// The chat-facing search. A failed search reads as no results.
    pub async fn search_products(&self, query: &str) -> Vec<SearchHit> {
        tracing::info!(query, "search tool called");
        let request = SearchRequest::new(query)
            .with_limit(SEARCH_TOOL_LIMIT)
            .with_min_score(SEARCH_TOOL_MIN_SCORE);
        match self.search.search(&request).await {
            Ok(results) => results.into_iter().map(SearchHit::from).collect(),
            Err(e) => {
                tracing::error!(query, error = %e, "search tool failed");
                Vec::new()
            }
        }
    }
}
