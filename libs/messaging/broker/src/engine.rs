//! # Broker Match Engine
//!
//! ## Purpose
//!
//! Subscription store of a publish/subscribe broker and the matcher that
//! turns one PUBLISH into per-consumer NOTIFY batches.
//!
//! ## Subscription Tree
//!
//! ```text
//! TopicSignature ─┬─ consumer A ─┬─ "sub-1" ─► on_all [EUR.*]   on_change [GBP.USD]
//!                 │              └─ "sub-2" ─► on_all [*]
//!                 └─ consumer B ─── "sub-1" ─► on_all [JPY.USD]
//! ```
//!
//! Re-registering a subscription id replaces its patterns. A consumer node
//! disappears with its last subscription and a topic node with its last
//! consumer.
//!
//! ## Matching
//!
//! An update goes into a consumer's batch when its key matches one of the
//! consumer's on-all patterns, or, for change updates, one of its on-change
//! patterns. Consumers with nothing matched get no batch.
//!
//! Mutations take the write lock; matching only reads, so publishes on
//! different threads match in parallel.

use crate::error::{BrokerError, BrokerResult};
use crate::pattern::{EntityKey, KeyPattern};
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, trace};
use types::{MessageHeader, SessionType, Uri};

/// Consumer identity: the full URI of the subscribing endpoint
pub type ConsumerId = Uri;

pub type SubscriptionId = String;

/// Everything that must agree between a subscription and a publish
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicSignature {
    pub domain: Vec<String>,
    pub network_zone: String,
    pub session: SessionType,
    pub session_name: String,
    pub area: u16,
    pub service: u16,
    pub operation: u16,
    pub area_version: u8,
}

impl TopicSignature {
    pub fn from_header(header: &MessageHeader) -> Self {
        Self {
            domain: header.domain.clone().unwrap_or_default(),
            network_zone: header.network_zone.clone().unwrap_or_default(),
            session: header.session,
            session_name: header.session_name.clone().unwrap_or_default(),
            area: header.service_area,
            service: header.service,
            operation: header.operation,
            area_version: header.area_version,
        }
    }
}

/// One published entity update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateEntry {
    pub key: EntityKey,
    /// Change updates also reach on-change subscriptions
    pub is_change: bool,
    pub value: Bytes,
}

impl UpdateEntry {
    pub fn new(key: EntityKey, is_change: bool, value: impl Into<Bytes>) -> Self {
        Self {
            key,
            is_change,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Subscription {
    on_all: Vec<KeyPattern>,
    on_change: Vec<KeyPattern>,
}

impl Subscription {
    fn selects(&self, update: &UpdateEntry) -> bool {
        self.on_all.iter().any(|p| p.matches(&update.key))
            || (update.is_change && self.on_change.iter().any(|p| p.matches(&update.key)))
    }
}

type ConsumerSubscriptions = BTreeMap<SubscriptionId, Subscription>;

/// Updates matched for one consumer by one publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyBatch {
    pub consumer: ConsumerId,
    /// Subscriptions that selected at least one update
    pub subscriptions: Vec<SubscriptionId>,
    /// In publish order
    pub updates: Vec<UpdateEntry>,
}

#[derive(Default)]
pub struct BrokerMatchEngine {
    topics: RwLock<HashMap<TopicSignature, BTreeMap<ConsumerId, ConsumerSubscriptions>>>,
}

impl BrokerMatchEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a subscription. `on_change_only[i]` puts
    /// `patterns[i]` in the on-change set instead of the on-all set.
    pub fn add_subscription(
        &self,
        consumer: &ConsumerId,
        topic: &TopicSignature,
        subscription: &str,
        patterns: Vec<KeyPattern>,
        on_change_only: &[bool],
    ) -> BrokerResult<()> {
        if patterns.len() != on_change_only.len() {
            return Err(BrokerError::PatternFlagMismatch {
                patterns: patterns.len(),
                flags: on_change_only.len(),
            });
        }

        let mut record = Subscription::default();
        for (pattern, &change_only) in patterns.into_iter().zip(on_change_only) {
            if change_only {
                record.on_change.push(pattern);
            } else {
                record.on_all.push(pattern);
            }
        }

        debug!(
            consumer = %consumer,
            subscription,
            on_all = record.on_all.len(),
            on_change = record.on_change.len(),
            "Subscription registered"
        );
        self.topics
            .write()
            .entry(topic.clone())
            .or_default()
            .entry(consumer.clone())
            .or_default()
            .insert(subscription.to_string(), record);
        Ok(())
    }

    /// Remove the named subscriptions. Returns how many existed.
    pub fn remove_subscriptions(
        &self,
        consumer: &ConsumerId,
        topic: &TopicSignature,
        subscriptions: &[SubscriptionId],
    ) -> usize {
        let mut topics = self.topics.write();
        let Some(consumers) = topics.get_mut(topic) else {
            return 0;
        };
        let Some(owned) = consumers.get_mut(consumer) else {
            return 0;
        };

        let removed = subscriptions
            .iter()
            .filter(|id| owned.remove(id.as_str()).is_some())
            .count();

        if owned.is_empty() {
            consumers.remove(consumer);
        }
        if consumers.is_empty() {
            topics.remove(topic);
        }

        debug!(consumer = %consumer, removed, "Subscriptions removed");
        removed
    }

    /// Remove every subscription of a consumer on one topic
    pub fn remove_all(&self, consumer: &ConsumerId, topic: &TopicSignature) -> usize {
        let mut topics = self.topics.write();
        let Some(consumers) = topics.get_mut(topic) else {
            return 0;
        };
        let removed = consumers.remove(consumer).map_or(0, |owned| owned.len());
        if consumers.is_empty() {
            topics.remove(topic);
        }
        removed
    }

    /// Remove a consumer from every topic
    pub fn remove_consumer(&self, consumer: &ConsumerId) -> usize {
        let mut topics = self.topics.write();
        let mut removed = 0;
        topics.retain(|_, consumers| {
            removed += consumers.remove(consumer).map_or(0, |owned| owned.len());
            !consumers.is_empty()
        });
        removed
    }

    /// NOTIFY batches for one publish, ordered by consumer
    pub fn match_publish(&self, topic: &TopicSignature, updates: &[UpdateEntry]) -> Vec<NotifyBatch> {
        let topics = self.topics.read();
        let Some(consumers) = topics.get(topic) else {
            trace!(updates = updates.len(), "Publish on topic without subscribers");
            return Vec::new();
        };

        consumers
            .iter()
            .filter_map(|(consumer, subscriptions)| {
                let mut matched_subscriptions = BTreeSet::new();
                let matched: Vec<UpdateEntry> = updates
                    .iter()
                    .filter(|update| {
                        let mut selected = false;
                        for (id, subscription) in subscriptions {
                            if subscription.selects(update) {
                                matched_subscriptions.insert(id.clone());
                                selected = true;
                            }
                        }
                        selected
                    })
                    .cloned()
                    .collect();

                (!matched.is_empty()).then(|| NotifyBatch {
                    consumer: consumer.clone(),
                    subscriptions: matched_subscriptions.into_iter().collect(),
                    updates: matched,
                })
            })
            .collect()
    }

    pub fn topic_count(&self) -> usize {
        self.topics.read().len()
    }

    pub fn consumer_count(&self, topic: &TopicSignature) -> usize {
        self.topics.read().get(topic).map_or(0, BTreeMap::len)
    }

    pub fn subscription_count(&self) -> usize {
        self.topics
            .read()
            .values()
            .flat_map(BTreeMap::values)
            .map(BTreeMap::len)
            .sum()
    }
}
