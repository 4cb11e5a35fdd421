//! Application subscription registry.

use heapless::{String, Vec};

use crate::message::{MAX_TOPIC_LEN, QoS};

/// Compiled maximum number of application subscriptions.
pub const MAX_SUBSCRIBE_TOPICS: usize = 6;

/// Application subscriptions with their QoS, replayed after every connect.
pub struct TopicRegistry<const MAX_TOPICS: usize> {
    topics: Vec<(String<MAX_TOPIC_LEN>, QoS), MAX_TOPICS>,
    limit: usize,
}

impl<const MAX_TOPICS: usize> TopicRegistry<MAX_TOPICS> {
    pub fn new() -> Self {
        Self {
            topics: Vec::new(),
            limit: MAX_TOPICS,
        }
    }

    /// Lowers the number of topics accepted by [`add`](Self::add).
    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit.min(MAX_TOPICS);
    }

    /// Records a subscription. A topic already present only has its QoS
    /// updated, so it never counts twice against the limit.
    ///
    /// Returns `false` for empty or oversized topics and when the limit is
    /// reached.
    pub fn add(&mut self, topic: &str, qos: QoS) -> bool {
        if let Some(existing) = self.topics.iter_mut().find(|(t, _)| t == topic) {
            existing.1 = qos;
            return true;
        }
        if topic.is_empty() || self.topics.len() >= self.limit {
            return false;
        }

        let Ok(owned) = String::try_from(topic) else {
            return false;
        };
        self.topics.push((owned, qos)).is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, QoS)> {
        self.topics.iter().map(|(t, q)| (t.as_str(), *q))
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// `true` when any recorded filter matches `topic`.
    pub fn matches(&self, topic: &str) -> bool {
        self.topics.iter().any(|(filter, _)| topic_matches(filter, topic))
    }
}

/// MQTT topic filter matching with `+` and `#` wildcards.
///
/// Topics starting with `$` never match a filter that opens with a wildcard.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }
    let mut levels = topic.split('/');
    for part in filter.split('/') {
        match part {
            "#" => return true,
            "+" => {
                if levels.next().is_none() {
                    return false;
                }
            }
            _ => {
                if levels.next() != Some(part) {
                    return false;
                }
            }
        }
    }
    levels.next().is_none()
}

impl<const MAX_TOPICS: usize> Default for TopicRegistry<MAX_TOPICS> {
    fn default() -> Self {
        Self::new()
    }
}
