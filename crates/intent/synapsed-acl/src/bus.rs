//! Message bus connecting agent mailboxes

use crate::{
    acl::{Message, MessageContent, Performative},
    mailbox::{FifoMailbox, Mailbox},
    types::{AgentId, ConversationId, MessageId},
    AclError, Result,
};
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Routes messages between registered agents.
///
/// The bus is the only structure agents share; mailboxes take concurrent
/// appends while each owner drains its own.
#[derive(Clone, Default)]
pub struct MessageBus {
    mailboxes: Arc<DashMap<AgentId, Arc<dyn Mailbox>>>,
    topics: Arc<DashMap<String, BTreeSet<AgentId>>>,
    mailbox_capacity: Option<usize>,
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBus")
            .field("agents", &self.mailboxes.len())
            .field("topics", &self.topics.len())
            .field("mailbox_capacity", &self.mailbox_capacity)
            .finish()
    }
}

impl MessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mailboxes created by [`MessageBus::register`] hold at most `capacity` messages
    pub fn with_mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailbox_capacity = Some(capacity);
        self
    }

    /// Gives the agent a FIFO mailbox; false if it was already registered
    pub fn register(&self, agent: AgentId) -> bool {
        let mailbox: Arc<dyn Mailbox> = match self.mailbox_capacity {
            Some(capacity) => Arc::new(FifoMailbox::bounded(agent.clone(), capacity)),
            None => Arc::new(FifoMailbox::new(agent.clone())),
        };
        self.register_mailbox(agent, mailbox)
    }

    /// Registers a custom transport for the agent
    pub fn register_mailbox(&self, agent: AgentId, mailbox: Arc<dyn Mailbox>) -> bool {
        if self.mailboxes.contains_key(&agent) {
            return false;
        }
        debug!(agent = %agent, "mailbox registered");
        self.mailboxes.insert(agent, mailbox);
        true
    }

    /// Removes the agent's mailbox and topic subscriptions
    pub fn unregister(&self, agent: &AgentId) -> bool {
        for mut subscribers in self.topics.iter_mut() {
            subscribers.remove(agent);
        }
        self.topics.retain(|_, subscribers| !subscribers.is_empty());
        self.mailboxes.remove(agent).is_some()
    }

    pub fn is_registered(&self, agent: &AgentId) -> bool {
        self.mailboxes.contains_key(agent)
    }

    /// Registered agents in sorted order
    pub fn agents(&self) -> Vec<AgentId> {
        let mut agents: Vec<AgentId> = self.mailboxes.iter().map(|e| e.key().clone()).collect();
        agents.sort();
        agents
    }

    fn mailbox(&self, agent: &AgentId) -> Result<Arc<dyn Mailbox>> {
        self.mailboxes
            .get(agent)
            .map(|m| Arc::clone(m.value()))
            .ok_or_else(|| AclError::AgentNotFound(agent.clone()))
    }

    /// Enqueues a message into the receiver's mailbox
    pub fn send(&self, message: Message) -> Result<MessageId> {
        if !self.is_registered(&message.sender) {
            return Err(AclError::AgentNotFound(message.sender));
        }
        let mailbox = self.mailbox(&message.receiver)?;
        let id = message.id;
        trace!(
            from = %message.sender,
            to = %message.receiver,
            performative = %message.performative,
            "message sent"
        );
        mailbox.enqueue(message)?;
        Ok(id)
    }

    /// Sends a message opening a new conversation
    pub fn tell(
        &self,
        sender: &AgentId,
        receiver: &AgentId,
        performative: Performative,
        content: impl Into<MessageContent>,
    ) -> Result<MessageId> {
        self.send(Message::new(sender.clone(), receiver.clone(), performative, content))
    }

    /// Sends to every registered agent except the sender.
    ///
    /// A receiver whose mailbox rejects the message is skipped. Returns the
    /// number of agents reached.
    pub fn broadcast(
        &self,
        sender: &AgentId,
        performative: Performative,
        content: impl Into<MessageContent>,
    ) -> Result<usize> {
        let receivers: Vec<AgentId> = self
            .agents()
            .into_iter()
            .filter(|agent| agent != sender)
            .collect();
        self.fan_out(sender, receivers, performative, content.into())
    }

    pub fn subscribe(&self, agent: &AgentId, topic: impl Into<String>) -> Result<()> {
        if !self.is_registered(agent) {
            return Err(AclError::AgentNotFound(agent.clone()));
        }
        self.topics.entry(topic.into()).or_default().insert(agent.clone());
        Ok(())
    }

    pub fn unsubscribe(&self, agent: &AgentId, topic: &str) -> bool {
        let removed = self
            .topics
            .get_mut(topic)
            .is_some_and(|mut subscribers| subscribers.remove(agent));
        self.topics.remove_if(topic, |_, subscribers| subscribers.is_empty());
        removed
    }

    pub fn subscribers(&self, topic: &str) -> Vec<AgentId> {
        self.topics
            .get(topic)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Sends to the topic's subscribers other than the sender
    pub fn publish(
        &self,
        sender: &AgentId,
        topic: &str,
        performative: Performative,
        content: impl Into<MessageContent>,
    ) -> Result<usize> {
        let receivers: Vec<AgentId> = self
            .subscribers(topic)
            .into_iter()
            .filter(|agent| agent != sender)
            .collect();
        debug!(topic, receivers = receivers.len(), "publishing");
        self.fan_out(sender, receivers, performative, content.into())
    }

    fn fan_out(
        &self,
        sender: &AgentId,
        receivers: Vec<AgentId>,
        performative: Performative,
        content: MessageContent,
    ) -> Result<usize> {
        if !self.is_registered(sender) {
            return Err(AclError::AgentNotFound(sender.clone()));
        }
        let conversation = ConversationId::new();
        let mut reached = 0;
        for receiver in receivers {
            let mut message = Message::new(sender.clone(), receiver, performative, content.clone());
            message.conversation_id = conversation.clone();
            match self.send(message) {
                Ok(_) => reached += 1,
                Err(e) => warn!(from = %sender, error = %e, "fan-out delivery skipped"),
            }
        }
        Ok(reached)
    }

    /// Takes every message waiting for the agent
    pub fn drain(&self, agent: &AgentId) -> Result<Vec<Message>> {
        Ok(self.mailbox(agent)?.drain())
    }

    pub fn pending(&self, agent: &AgentId) -> usize {
        self.mailbox(agent).map_or(0, |m| m.len())
    }
}
