/*
 * Created on Sun Mar 26 2023
 *
 * This file is a part of resqld
 * resqld is a free and open-source Redis-wire-compatible database server
 * written by Sayan Nandan ("the Author") with the vision of running the
 * full Redis command surface on top of transactional SQL-shaped storage
 * without compromising on protocol fidelity or performance.
 *
 * Copyright (c) 2023, Sayan Nandan <ohsayan@outlook.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

//! # The pub/sub hub
//!
//! The process-wide subscriber registry. Connections register an unbounded
//! sender at subscribe time; the hub fans published messages out by pushing
//! ready-made [`Element::Push`] frames into each subscriber's queue, and the
//! connection's writer loop drains the queue through the same exclusive
//! writer that emits command replies. On a RESP2 socket the push frame
//! degrades to a plain array in the serializer, so the hub never needs to
//! know the peer's protocol version.
//!
//! This in-process hub is the bundled fan-out substrate; a LISTEN/NOTIFY
//! bridge implements the same surface out-of-tree for multi-node setups.

use {
    crate::{protocol::Element, util::glob},
    parking_lot::RwLock,
    std::collections::{BTreeSet, HashMap},
    tokio::sync::mpsc,
};

pub type PushSender = mpsc::UnboundedSender<Element>;
pub type PushReceiver = mpsc::UnboundedReceiver<Element>;

#[derive(Default)]
struct ClientRecord {
    sender: Option<PushSender>,
    channels: BTreeSet<Vec<u8>>,
    patterns: BTreeSet<Vec<u8>>,
}

impl ClientRecord {
    fn subscription_count(&self) -> usize {
        self.channels.len() + self.patterns.len()
    }
}

#[derive(Default)]
struct Registry {
    clients: HashMap<u64, ClientRecord>,
    channels: HashMap<Vec<u8>, BTreeSet<u64>>,
    patterns: HashMap<Vec<u8>, BTreeSet<u64>>,
}

/// The hub. One per process, shared by every connection
#[derive(Default)]
pub struct Hub {
    registry: RwLock<Registry>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `client_id` to `channels`. Returns, per channel, the
    /// client's total subscription count after that subscription took effect
    /// (the number the wire reply carries)
    pub fn subscribe(
        &self,
        client_id: u64,
        sender: &PushSender,
        channels: &[Vec<u8>],
    ) -> Vec<(Vec<u8>, usize)> {
        let mut guard = self.registry.write();
        let registry = &mut *guard;
        let mut counts = Vec::with_capacity(channels.len());
        for channel in channels {
            let record = registry.clients.entry(client_id).or_default();
            record.sender.get_or_insert_with(|| sender.clone());
            record.channels.insert(channel.clone());
            let count = record.subscription_count();
            registry
                .channels
                .entry(channel.clone())
                .or_default()
                .insert(client_id);
            counts.push((channel.clone(), count));
        }
        counts
    }

    pub fn psubscribe(
        &self,
        client_id: u64,
        sender: &PushSender,
        patterns: &[Vec<u8>],
    ) -> Vec<(Vec<u8>, usize)> {
        let mut guard = self.registry.write();
        let registry = &mut *guard;
        let mut counts = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            let record = registry.clients.entry(client_id).or_default();
            record.sender.get_or_insert_with(|| sender.clone());
            record.patterns.insert(pattern.clone());
            let count = record.subscription_count();
            registry
                .patterns
                .entry(pattern.clone())
                .or_default()
                .insert(client_id);
            counts.push((pattern.clone(), count));
        }
        counts
    }

    /// Unsubscribe from the given channels, or from every channel when
    /// `channels` is `None`. Returns `(channel, remaining_count)` per
    /// affected channel; a single `(None, count)` entry when there was
    /// nothing to unsubscribe from (the wire still wants a reply)
    pub fn unsubscribe(
        &self,
        client_id: u64,
        channels: Option<&[Vec<u8>]>,
    ) -> Vec<(Option<Vec<u8>>, usize)> {
        let mut guard = self.registry.write();
        let registry = &mut *guard;
        let targets: Vec<Vec<u8>> = match channels {
            Some(channels) => channels.to_vec(),
            None => registry
                .clients
                .get(&client_id)
                .map(|r| r.channels.iter().cloned().collect())
                .unwrap_or_default(),
        };
        if targets.is_empty() {
            let count = registry
                .clients
                .get(&client_id)
                .map_or(0, ClientRecord::subscription_count);
            return vec![(None, count)];
        }
        let mut out = Vec::with_capacity(targets.len());
        for channel in targets {
            if let Some(record) = registry.clients.get_mut(&client_id) {
                record.channels.remove(&channel);
            }
            detach(&mut registry.channels, &channel, client_id);
            let count = registry
                .clients
                .get(&client_id)
                .map_or(0, ClientRecord::subscription_count);
            out.push((Some(channel), count));
        }
        registry.drop_if_idle(client_id);
        out
    }

    pub fn punsubscribe(
        &self,
        client_id: u64,
        patterns: Option<&[Vec<u8>]>,
    ) -> Vec<(Option<Vec<u8>>, usize)> {
        let mut guard = self.registry.write();
        let registry = &mut *guard;
        let targets: Vec<Vec<u8>> = match patterns {
            Some(patterns) => patterns.to_vec(),
            None => registry
                .clients
                .get(&client_id)
                .map(|r| r.patterns.iter().cloned().collect())
                .unwrap_or_default(),
        };
        if targets.is_empty() {
            let count = registry
                .clients
                .get(&client_id)
                .map_or(0, ClientRecord::subscription_count);
            return vec![(None, count)];
        }
        let mut out = Vec::with_capacity(targets.len());
        for pattern in targets {
            if let Some(record) = registry.clients.get_mut(&client_id) {
                record.patterns.remove(&pattern);
            }
            detach(&mut registry.patterns, &pattern, client_id);
            let count = registry
                .clients
                .get(&client_id)
                .map_or(0, ClientRecord::subscription_count);
            out.push((Some(pattern), count));
        }
        registry.drop_if_idle(client_id);
        out
    }

    /// Publish `payload` on `channel`, returning how many subscribers it was
    /// delivered to. A client reached through both a channel and a matching
    /// pattern is counted (and delivered to) once per route
    pub fn publish(&self, channel: &[u8], payload: &[u8]) -> usize {
        let registry = self.registry.read();
        let mut delivered = 0;
        if let Some(subscribers) = registry.channels.get(channel) {
            let frame = Element::Push(vec![
                Element::bulk(*b"message"),
                Element::bulk(channel.to_vec()),
                Element::bulk(payload.to_vec()),
            ]);
            for client_id in subscribers {
                if registry.send_to(*client_id, frame.clone()) {
                    delivered += 1;
                }
            }
        }
        for (pattern, subscribers) in registry.patterns.iter() {
            if !glob::matches(pattern, channel) {
                continue;
            }
            let frame = Element::Push(vec![
                Element::bulk(*b"pmessage"),
                Element::bulk(pattern.clone()),
                Element::bulk(channel.to_vec()),
                Element::bulk(payload.to_vec()),
            ]);
            for client_id in subscribers {
                if registry.send_to(*client_id, frame.clone()) {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    pub fn subscribed_channels(&self, client_id: u64) -> Vec<Vec<u8>> {
        self.registry
            .read()
            .clients
            .get(&client_id)
            .map(|r| r.channels.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// `(channel_count, pattern_count)` for one client
    pub fn subscription_counts(&self, client_id: u64) -> (usize, usize) {
        self.registry
            .read()
            .clients
            .get(&client_id)
            .map_or((0, 0), |r| (r.channels.len(), r.patterns.len()))
    }

    /// Forget everything about a client. Called on connection teardown and
    /// by RESET
    pub fn disconnect(&self, client_id: u64) {
        let mut guard = self.registry.write();
        let registry = &mut *guard;
        if let Some(record) = registry.clients.remove(&client_id) {
            for channel in &record.channels {
                detach(&mut registry.channels, channel, client_id);
            }
            for pattern in &record.patterns {
                detach(&mut registry.patterns, pattern, client_id);
            }
        }
    }
}

impl Registry {
    fn send_to(&self, client_id: u64, frame: Element) -> bool {
        match self.clients.get(&client_id).and_then(|r| r.sender.as_ref()) {
            // a closed receiver means the connection is on its way out; the
            // registry entry goes with the disconnect call
            Some(sender) => sender.send(frame).is_ok(),
            None => false,
        }
    }
    fn drop_if_idle(&mut self, client_id: u64) {
        if self
            .clients
            .get(&client_id)
            .is_some_and(|r| r.subscription_count() == 0)
        {
            self.clients.remove(&client_id);
        }
    }
}

fn detach(index: &mut HashMap<Vec<u8>, BTreeSet<u64>>, key: &[u8], client_id: u64) {
    if let Some(subscribers) = index.get_mut(key) {
        subscribers.remove(&client_id);
        if subscribers.is_empty() {
            index.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipe() -> (PushSender, PushReceiver) {
        mpsc::unbounded_channel()
    }

    #[test]
    fn subscribe_counts_accumulate() {
        let hub = Hub::new();
        let (tx, _rx) = pipe();
        let counts = hub.subscribe(1, &tx, &[b"a".to_vec(), b"b".to_vec()]);
        assert_eq!(counts[0], (b"a".to_vec(), 1));
        assert_eq!(counts[1], (b"b".to_vec(), 2));
        let counts = hub.psubscribe(1, &tx, &[b"news.*".to_vec()]);
        assert_eq!(counts[0].1, 3);
        assert_eq!(
            hub.subscribed_channels(1),
            vec![b"a".to_vec(), b"b".to_vec()]
        );
        assert_eq!(hub.subscription_counts(1), (2, 1));
    }

    #[test]
    fn publish_reaches_channel_and_pattern() {
        let hub = Hub::new();
        let (tx1, mut rx1) = pipe();
        let (tx2, mut rx2) = pipe();
        hub.subscribe(1, &tx1, &[b"news.tech".to_vec()]);
        hub.psubscribe(2, &tx2, &[b"news.*".to_vec()]);
        assert_eq!(hub.publish(b"news.tech", b"hi"), 2);
        match rx1.try_recv().unwrap() {
            Element::Push(parts) => {
                assert_eq!(parts[0], Element::bulk(*b"message"));
                assert_eq!(parts[1], Element::bulk(*b"news.tech"));
                assert_eq!(parts[2], Element::bulk(*b"hi"));
            }
            other => panic!("unexpected frame: {other:?}"),
        }
        match rx2.try_recv().unwrap() {
            Element::Push(parts) => {
                assert_eq!(parts[0], Element::bulk(*b"pmessage"));
                assert_eq!(parts[1], Element::bulk(*b"news.*"));
                assert_eq!(parts[2], Element::bulk(*b"news.tech"));
            }
            other => panic!("unexpected frame: {other:?}"),
        }
        assert_eq!(hub.publish(b"sports", b"nope"), 0);
    }

    #[test]
    fn unsubscribe_walks_back_to_zero() {
        let hub = Hub::new();
        let (tx, _rx) = pipe();
        hub.subscribe(7, &tx, &[b"a".to_vec(), b"b".to_vec()]);
        let out = hub.unsubscribe(7, Some(&[b"a".to_vec()]));
        assert_eq!(out, vec![(Some(b"a".to_vec()), 1)]);
        let out = hub.unsubscribe(7, None);
        assert_eq!(out, vec![(Some(b"b".to_vec()), 0)]);
        // nothing left: the wire still gets one reply
        let out = hub.unsubscribe(7, None);
        assert_eq!(out, vec![(None, 0)]);
        assert_eq!(hub.publish(b"a", b"x"), 0);
    }

    #[test]
    fn disconnect_purges_everything() {
        let hub = Hub::new();
        let (tx, _rx) = pipe();
        hub.subscribe(9, &tx, &[b"ch".to_vec()]);
        hub.psubscribe(9, &tx, &[b"p.*".to_vec()]);
        hub.disconnect(9);
        assert_eq!(hub.subscription_counts(9), (0, 0));
        assert_eq!(hub.publish(b"ch", b"x"), 0);
    }
}
