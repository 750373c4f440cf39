//! Agent mailboxes

use crate::{acl::Message, types::AgentId, AclError, Result};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

/// Message transport endpoint owned by one agent.
///
/// Implementations must tolerate concurrent `enqueue` calls.
pub trait Mailbox: Send + Sync {
    fn enqueue(&self, message: Message) -> Result<()>;

    fn dequeue(&self) -> Option<Message>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dequeues everything currently waiting
    fn drain(&self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.len());
        while let Some(message) = self.dequeue() {
            messages.push(message);
        }
        messages
    }
}

#[derive(Debug, Default)]
struct Queues {
    by_sender: HashMap<AgentId, VecDeque<Message>>,
    /// Senders with pending messages, in service order
    rotation: VecDeque<AgentId>,
    total: usize,
}

/// FIFO per sender, served round-robin across senders
#[derive(Debug)]
pub struct FifoMailbox {
    owner: AgentId,
    capacity: Option<usize>,
    queues: Mutex<Queues>,
}

impl FifoMailbox {
    pub fn new(owner: AgentId) -> Self {
        Self {
            owner,
            capacity: None,
            queues: Mutex::new(Queues::default()),
        }
    }

    /// Rejects messages once `capacity` are waiting
    pub fn bounded(owner: AgentId, capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::new(owner)
        }
    }

    pub fn owner(&self) -> &AgentId {
        &self.owner
    }

    /// Messages waiting from one sender
    pub fn pending_from(&self, sender: &AgentId) -> usize {
        self.queues.lock().by_sender.get(sender).map_or(0, VecDeque::len)
    }
}

impl Mailbox for FifoMailbox {
    fn enqueue(&self, message: Message) -> Result<()> {
        let mut queues = self.queues.lock();
        if let Some(capacity) = self.capacity {
            if queues.total >= capacity {
                return Err(AclError::MailboxFull {
                    agent: self.owner.clone(),
                    capacity,
                });
            }
        }
        let sender = message.sender.clone();
        let queue = queues.by_sender.entry(sender.clone()).or_default();
        let was_idle = queue.is_empty();
        queue.push_back(message);
        if was_idle {
            queues.rotation.push_back(sender);
        }
        queues.total += 1;
        Ok(())
    }

    fn dequeue(&self) -> Option<Message> {
        let mut queues = self.queues.lock();
        while let Some(sender) = queues.rotation.pop_front() {
            let Some(queue) = queues.by_sender.get_mut(&sender) else {
                continue;
            };
            let Some(message) = queue.pop_front() else {
                queues.by_sender.remove(&sender);
                continue;
            };
            if queue.is_empty() {
                queues.by_sender.remove(&sender);
            } else {
                queues.rotation.push_back(sender);
            }
            queues.total -= 1;
            return Some(message);
        }
        None
    }

    fn len(&self) -> usize {
        self.queues.lock().total
    }
}
