// src/runtime/subscriptions.rs
//! Plugin UI topic registry
//!
//! A topic is `(agent id, plugin name)`. Topics exist only while they have
//! subscribers: the last unsubscribe deletes the topic, and an agent with no
//! topics left is dropped from the registry as well.

use crate::runtime::protocol::{AgentId, PluginUiUpdate};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use tokio::sync::mpsc;
use tracing::trace;
use ulid::Ulid;

/// Opaque handle to a client receiving plugin UI updates
///
/// Equality and hashing use the handle's id only, so clones of one handle
/// are the same subscriber in every topic.
#[derive(Debug, Clone)]
pub struct Subscriber {
    id: Ulid,
    tx: mpsc::UnboundedSender<PluginUiUpdate>,
}

impl Subscriber {
    /// Create a subscriber and the receiving end of its update stream
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PluginUiUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { id: Ulid::new(), tx }, rx)
    }

    pub fn id(&self) -> Ulid {
        self.id
    }

    /// Whether the receiving side has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn deliver(&self, update: PluginUiUpdate) -> bool {
        self.tx.send(update).is_ok()
    }
}

impl PartialEq for Subscriber {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Subscriber {}

impl Hash for Subscriber {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

type Topics = HashMap<String, HashSet<Subscriber>>;

/// Registry of plugin UI topics and their subscribers
#[derive(Debug, Default)]
pub struct PluginUiSubscriptions {
    agents: Mutex<HashMap<AgentId, Topics>>,
}

impl PluginUiSubscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `subscriber` to a topic, creating the topic on first use.
    /// Returns `true` if the subscriber was not already a member.
    pub fn subscribe(&self, agent_id: AgentId, plugin_name: &str, subscriber: Subscriber) -> bool {
        let mut agents = self.agents.lock();
        let added = agents
            .entry(agent_id)
            .or_default()
            .entry(plugin_name.to_string())
            .or_default()
            .insert(subscriber);
        trace!("Subscribe agent {} plugin {} (new member: {})", agent_id, plugin_name, added);
        added
    }

    /// Remove `subscriber` from a topic.
    /// Returns `true` if this emptied the topic, which is then deleted.
    pub fn unsubscribe(&self, agent_id: AgentId, plugin_name: &str, subscriber: &Subscriber) -> bool {
        let mut agents = self.agents.lock();
        let Some(topics) = agents.get_mut(&agent_id) else {
            return false;
        };
        let Some(members) = topics.get_mut(plugin_name) else {
            return false;
        };

        members.remove(subscriber);
        if !members.is_empty() {
            return false;
        }

        topics.remove(plugin_name);
        if topics.is_empty() {
            agents.remove(&agent_id);
        }
        true
    }

    /// Current members of a topic, or `None` if the topic does not exist
    pub fn subscribers(&self, agent_id: AgentId, plugin_name: &str) -> Option<HashSet<Subscriber>> {
        self.agents
            .lock()
            .get(&agent_id)
            .and_then(|topics| topics.get(plugin_name))
            .cloned()
    }

    /// Every topic `subscriber` belongs to, across all agents
    pub fn topics_of(&self, subscriber: &Subscriber) -> Vec<(AgentId, String)> {
        self.agents
            .lock()
            .iter()
            .flat_map(|(agent_id, topics)| {
                topics
                    .iter()
                    .filter(|(_, members)| members.contains(subscriber))
                    .map(move |(plugin_name, _)| (*agent_id, plugin_name.clone()))
            })
            .collect()
    }

    /// Deliver an update to every member of its topic; returns the delivery count
    pub fn publish(&self, update: &PluginUiUpdate) -> usize {
        let members = match self.subscribers(update.agent_id, &update.plugin_name) {
            Some(members) => members,
            None => return 0,
        };

        members
            .iter()
            .filter(|subscriber| subscriber.deliver(update.clone()))
            .count()
    }

    pub fn topic_count(&self) -> usize {
        self.agents.lock().values().map(|topics| topics.len()).sum()
    }
}
