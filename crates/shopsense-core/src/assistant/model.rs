//! Chat messages and the language-model seam. [`OllamaChat`] sends them to Ollama's
//! chat endpoint through ollama-rs, with tool definitions attached.

use async_trait::async_trait;
use ollama_rs::generation::chat::request::ChatMessageRequest;
use ollama_rs::generation::chat::{ChatMessage as OllamaMessage, MessageRole};
use ollama_rs::generation::tools::{ToolCall, ToolCallFunction, ToolFunctionInfo, ToolInfo, ToolType};
use ollama_rs::Ollama;
use schemars::Schema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::tools::ToolDefinition;
use super::ChatError;
use crate::ollama::base_url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool invocation as the model asked for it, before it is checked against the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestedToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<RequestedToolCall>,
    /// Set on tool results: which tool produced `content`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl ChatMessage {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Vec<RequestedToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::plain(Role::Assistant, content)
        }
    }

    pub fn tool_result(tool_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_name: Some(tool_name.into()),
            ..Self::plain(Role::Tool, content)
        }
    }
}

/// What the model produced in one turn: text, tool calls, or both.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssistantTurn {
    pub content: String,
    pub tool_calls: Vec<RequestedToolCall>,
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<AssistantTurn, ChatError>;
}

/// Ollama chat client. Holds one pooled HTTP client; build once and share.
#[derive(Debug, Clone)]
pub struct OllamaChat {
    inner: Ollama,
    model: String,
}

impl OllamaChat {
    pub fn from_url(url: &str, model: impl Into<String>) -> Result<Self, ChatError> {
        Ok(Self {
            inner: Ollama::from_url(base_url(url)?),
            model: model.into(),
        })
    }

    fn request(&self, messages: &[ChatMessage], tools: &[ToolDefinition]) -> Result<ChatMessageRequest, ChatError> {
        let tools = tools.iter().map(tool_info).collect::<Result<Vec<_>, _>>()?;
        let messages = messages.iter().map(to_ollama).collect();
        Ok(ChatMessageRequest::new(self.model.clone(), messages).tools(tools))
    }
}

#[async_trait]
impl ChatModel for OllamaChat {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<AssistantTurn, ChatError> {
        let request = self.request(messages, tools)?;
        tracing::debug!(model = %self.model, messages = messages.len(), "chat request");
        let reply = self.inner.send_chat_messages(request).await?;
        Ok(reply.message.into())
    }
}

fn tool_info(definition: &ToolDefinition) -> Result<ToolInfo, ChatError> {
    let parameters = Schema::try_from(definition.parameters.clone()).map_err(|source| ChatError::ToolSchema {
        tool: definition.name.clone(),
        source,
    })?;
    Ok(ToolInfo {
        tool_type: ToolType::Function,
        function: ToolFunctionInfo {
            name: definition.name.clone(),
            description: definition.description.clone(),
            parameters,
        },
    })
}

fn to_ollama(m: &ChatMessage) -> OllamaMessage {
    let role = match m.role {
        Role::System => MessageRole::System,
        Role::User => MessageRole::User,
        Role::Assistant => MessageRole::Assistant,
        Role::Tool => MessageRole::Tool,
    };
    let mut message = OllamaMessage::new(role, m.content.clone());
    message.tool_calls = m
        .tool_calls
        .iter()
        .map(|c| ToolCall {
            function: ToolCallFunction {
                name: c.name.clone(),
                arguments: c.arguments.clone(),
            },
        })
        .collect();
    message
}

impl From<OllamaMessage> for AssistantTurn {
    fn from(m: OllamaMessage) -> Self {
        Self {
            content: m.content,
            tool_calls: m
                .tool_calls
                .into_iter()
                .map(|c| RequestedToolCall {
                    name: c.function.name,
                    arguments: c.function.arguments,
                })
                .collect(),
        }
    }
}
