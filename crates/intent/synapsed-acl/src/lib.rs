//! # Synapsed ACL
//!
//! Agent Communication Language for BDI agents. Based on the FIPA speech-act
//! model, reduced to the performatives agents exchange while reasoning:
//! REQUEST, INFORM, QUERY, PROPOSE, ACCEPT and REJECT.
//!
//! ## Key Concepts
//!
//! - **Messages**: a performative plus content, threaded by conversation id
//! - **Mailboxes**: FIFO per sender, drained round-robin across senders
//! - **Message Bus**: point-to-point delivery, broadcast and topic publish/subscribe

pub mod types;
pub mod acl;
pub mod mailbox;
pub mod bus;

pub use types::{AgentId, ConversationId, MessageId};
pub use acl::{Message, MessageBuilder, MessageContent, Performative};
pub use mailbox::{FifoMailbox, Mailbox};
pub use bus::MessageBus;

/// Result type for messaging operations
pub type Result<T> = std::result::Result<T, AclError>;

/// Messaging errors
#[derive(Debug, thiserror::Error)]
pub enum AclError {
    #[error("Agent not found: {0}")]
    AgentNotFound(AgentId),

    #[error("Mailbox of {agent} is full ({capacity} messages)")]
    MailboxFull { agent: AgentId, capacity: usize },

    #[error("Message validation failed: {0}")]
    ValidationFailed(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}
