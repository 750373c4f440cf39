//! ACL (Agent Communication Language) messages
//!
//! Speech acts exchanged between agents, after the FIPA ACL message
//! structure: a performative, a sender and receiver, content, and a
//! conversation id for threading replies.

use crate::{types::*, AclError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// The type of communicative act
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Performative {
    /// Ask the receiver to do something
    Request,
    /// Tell the receiver a fact
    Inform,
    /// Ask the receiver for the value of a belief
    Query,
    /// Offer something to the receiver
    Propose,
    /// Agree to a proposal or request
    Accept,
    /// Decline a proposal or request
    Reject,
}

impl fmt::Display for Performative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Performative::Request => "REQUEST",
            Performative::Inform => "INFORM",
            Performative::Query => "QUERY",
            Performative::Propose => "PROPOSE",
            Performative::Accept => "ACCEPT",
            Performative::Reject => "REJECT",
        };
        f.write_str(name)
    }
}

/// Message content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "snake_case")]
pub enum MessageContent {
    /// Plain text content
    Text(String),
    /// A belief the sender asserts
    Fact {
        key: String,
        value: Value,
        #[serde(default)]
        certainty: Option<f64>,
    },
    /// Structured JSON content
    Json(Value),
}

impl MessageContent {
    pub fn text(text: impl Into<String>) -> Self {
        MessageContent::Text(text.into())
    }

    pub fn fact(key: impl Into<String>, value: impl Into<Value>) -> Self {
        MessageContent::Fact {
            key: key.into(),
            value: value.into(),
            certainty: None,
        }
    }

    /// The content as a JSON value
    pub fn to_value(&self) -> Value {
        match self {
            MessageContent::Text(text) => Value::String(text.clone()),
            MessageContent::Fact { value, .. } => value.clone(),
            MessageContent::Json(value) => value.clone(),
        }
    }
}

impl fmt::Display for MessageContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageContent::Text(text) => f.write_str(text),
            MessageContent::Fact { key, value, .. } => write!(f, "{key} = {value}"),
            MessageContent::Json(value) => write!(f, "{value}"),
        }
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        MessageContent::text(text)
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        MessageContent::Text(text)
    }
}

/// ACL message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: MessageId,
    pub performative: Performative,
    pub sender: AgentId,
    pub receiver: AgentId,
    pub content: MessageContent,
    /// Conversation ID for threading
    pub conversation_id: ConversationId,
    /// Message this replies to
    pub in_reply_to: Option<MessageId>,
    /// Urgency in [0, 1] requested by the sender
    pub priority: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// A message opening a new conversation
    pub fn new(
        sender: AgentId,
        receiver: AgentId,
        performative: Performative,
        content: impl Into<MessageContent>,
    ) -> Self {
        Self {
            id: MessageId::new(),
            performative,
            sender,
            receiver,
            content: content.into(),
            conversation_id: ConversationId::new(),
            in_reply_to: None,
            priority: None,
            timestamp: Utc::now(),
        }
    }

    /// A reply to this message in the same conversation
    pub fn reply(&self, performative: Performative, content: impl Into<MessageContent>) -> Message {
        Message {
            id: MessageId::new(),
            performative,
            sender: self.receiver.clone(),
            receiver: self.sender.clone(),
            content: content.into(),
            conversation_id: self.conversation_id.clone(),
            in_reply_to: Some(self.id),
            priority: None,
            timestamp: Utc::now(),
        }
    }

    /// The sender's priority clamped to [0, 1], or `default` when unset
    pub fn derived_priority(&self, default: f64) -> f64 {
        match self.priority {
            Some(p) if p.is_finite() => p.clamp(0.0, 1.0),
            _ => default,
        }
    }
}

/// ACL message builder for ergonomic message creation
#[derive(Debug, Default)]
pub struct MessageBuilder {
    performative: Option<Performative>,
    sender: Option<AgentId>,
    receiver: Option<AgentId>,
    content: Option<MessageContent>,
    conversation_id: Option<ConversationId>,
    priority: Option<f64>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn performative(mut self, p: Performative) -> Self {
        self.performative = Some(p);
        self
    }

    pub fn sender(mut self, s: impl Into<AgentId>) -> Self {
        self.sender = Some(s.into());
        self
    }

    pub fn receiver(mut self, r: impl Into<AgentId>) -> Self {
        self.receiver = Some(r.into());
        self
    }

    pub fn content(mut self, c: impl Into<MessageContent>) -> Self {
        self.content = Some(c.into());
        self
    }

    pub fn conversation(mut self, id: ConversationId) -> Self {
        self.conversation_id = Some(id);
        self
    }

    pub fn priority(mut self, priority: f64) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn build(self) -> Result<Message> {
        let required = |what: &str| AclError::ValidationFailed(format!("{what} is required"));
        if let Some(p) = self.priority {
            if !(0.0..=1.0).contains(&p) {
                return Err(AclError::ValidationFailed(format!(
                    "priority {p} is outside [0, 1]"
                )));
            }
        }
        Ok(Message {
            id: MessageId::new(),
            performative: self.performative.ok_or_else(|| required("Performative"))?,
            sender: self.sender.ok_or_else(|| required("Sender"))?,
            receiver: self.receiver.ok_or_else(|| required("Receiver"))?,
            content: self.content.ok_or_else(|| required("Content"))?,
            conversation_id: self.conversation_id.unwrap_or_default(),
            in_reply_to: None,
            priority: self.priority,
            timestamp: Utc::now(),
        })
    }
}
