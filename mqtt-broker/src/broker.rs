use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bytes::Bytes;
use mqtt_core::topic::TopicName;
use tokio::sync::Mutex;

/// Opaque client identity. CONNECT packets with an empty client id are
/// assigned a fresh one by the session handling the handshake.
pub type ClientId = String;

/// 2-byte packet identifier, compared/hashed as an opaque value.
pub type PacketId = u16;

struct Qos1Entry {
    bytes: Bytes,
    pending: HashSet<ClientId>,
}

struct Qos2PendingEntry {
    bytes: Bytes,
    topic: TopicName,
}

struct Qos2DeliveryEntry {
    bytes: Bytes,
    pending: HashSet<ClientId>,
}

/// Shared broker state: the client registry, the subscription table, and
/// the three in-flight registries for QoS1/QoS2 delivery. `W` is the
/// per-client outbound byte sink; production code plugs in a TCP socket's
/// write half, tests plug in an in-memory duplex.
///
/// Every method here locks only the table(s) it touches and releases the
/// lock before returning — callers that need to write to a socket do so
/// with the `Arc<Mutex<W>>` handle returned by [`Broker::writer_for`],
/// never while holding a broker-internal lock.
pub struct Broker<W> {
    clients: Mutex<HashMap<ClientId, Arc<Mutex<W>>>>,
    subscriptions: Mutex<HashMap<TopicName, HashSet<ClientId>>>,
    qos1: Mutex<HashMap<PacketId, Qos1Entry>>,
    qos2_pending: Mutex<HashMap<PacketId, Qos2PendingEntry>>,
    qos2_delivery: Mutex<HashMap<PacketId, Vec<Qos2DeliveryEntry>>>,
    max_in_flight: usize,
}

impl<W> Broker<W> {
    pub fn new(max_in_flight: usize) -> Self {
        return Self {
            clients: Mutex::new(HashMap::new()),
            subscriptions: Mutex::new(HashMap::new()),
            qos1: Mutex::new(HashMap::new()),
            qos2_pending: Mutex::new(HashMap::new()),
            qos2_delivery: Mutex::new(HashMap::new()),
            max_in_flight,
        };
    }

    pub async fn register_client(&self, id: ClientId, writer: Arc<Mutex<W>>) {
        self.clients.lock().await.insert(id, writer);
    }

    pub async fn unregister_client(&self, id: &ClientId) {
        self.clients.lock().await.remove(id);
    }

    pub async fn writer_for(&self, id: &ClientId) -> Option<Arc<Mutex<W>>> {
        return self.clients.lock().await.get(id).cloned();
    }

    pub async fn subscribe(&self, id: &ClientId, topic: TopicName) {
        self.subscriptions
            .lock()
            .await
            .entry(topic)
            .or_insert_with(HashSet::new)
            .insert(id.clone());
    }

    pub async fn clear_subscriptions_of(&self, id: &ClientId) {
        let mut subs = self.subscriptions.lock().await;
        for set in subs.values_mut() {
            set.remove(id);
        }
    }

    pub async fn subscribers_of(&self, topic: &TopicName) -> HashSet<ClientId> {
        return self
            .subscriptions
            .lock()
            .await
            .get(topic)
            .cloned()
            .unwrap_or_default();
    }

    pub async fn record_qos1(&self, id: PacketId, bytes: Bytes, pending: HashSet<ClientId>) {
        if pending.is_empty() {
            return;
        }

        let mut table = self.qos1.lock().await;
        if table.len() >= self.max_in_flight {
            log::warn!("InFlightQoS1 table at capacity ({}), dropping record for packet id {id}", self.max_in_flight);
            return;
        }

        table.insert(id, Qos1Entry { bytes, pending });
    }

    /// Removes `subscriber` from packet `id`'s pending set. Absent entries
    /// and absent subscribers are silently ignored (duplicate PUBACK).
    pub async fn ack_qos1(&self, id: PacketId, subscriber: &ClientId) {
        let mut table = self.qos1.lock().await;
        let drained = if let Some(entry) = table.get_mut(&id) {
            entry.pending.remove(subscriber);
            entry.pending.is_empty()
        } else {
            false
        };

        if drained {
            table.remove(&id);
        }
    }

    pub async fn record_qos2_pending(&self, id: PacketId, bytes: Bytes, topic: TopicName) {
        let mut table = self.qos2_pending.lock().await;
        if table.len() >= self.max_in_flight {
            log::warn!("InFlightQoS2Pending table at capacity ({}), dropping record for packet id {id}", self.max_in_flight);
            return;
        }

        table.insert(id, Qos2PendingEntry { bytes, topic });
    }

    pub async fn release_qos2(&self, id: PacketId) -> Option<(Bytes, TopicName)> {
        return self
            .qos2_pending
            .lock()
            .await
            .remove(&id)
            .map(|entry| (entry.bytes, entry.topic));
    }

    pub async fn record_qos2_delivery(&self, id: PacketId, bytes: Bytes, pending: HashSet<ClientId>) {
        if pending.is_empty() {
            return;
        }

        let mut table = self.qos2_delivery.lock().await;
        let list = table.entry(id).or_insert_with(Vec::new);
        list.push(Qos2DeliveryEntry { bytes, pending });
    }

    /// Removes `subscriber` from the first (oldest) pending delivery entry
    /// for packet `id`. Absent ids/subscribers are silently ignored
    /// (duplicate PUBCOMP).
    pub async fn ack_qos2(&self, id: PacketId, subscriber: &ClientId) {
        let mut table = self.qos2_delivery.lock().await;

        let Some(list) = table.get_mut(&id) else {
            return;
        };

        if let Some(entry) = list.first_mut() {
            entry.pending.remove(subscriber);
            if entry.pending.is_empty() {
                list.remove(0);
            }
        }

        if list.is_empty() {
            table.remove(&id);
        }
    }

    /// Step 1 of a retransmit tick: drop any pending subscriber no longer
    /// present in the client registry, then drop entries/list-items whose
    /// pending set has drained. Returns the bytes to resend to each
    /// surviving pending subscriber.
    pub async fn prune_and_collect_retransmits(&self) -> Vec<(ClientId, Bytes)> {
        let live_clients: HashSet<ClientId> = self.clients.lock().await.keys().cloned().collect();

        let mut sends = Vec::new();

        {
            let mut qos1 = self.qos1.lock().await;
            qos1.retain(|_, entry| {
                entry.pending.retain(|c| live_clients.contains(c));
                !entry.pending.is_empty()
            });

            for entry in qos1.values() {
                for client in &entry.pending {
                    sends.push((client.clone(), entry.bytes.clone()));
                }
            }
        }

        {
            let mut qos2 = self.qos2_delivery.lock().await;
            qos2.retain(|_, list| {
                list.retain_mut(|entry| {
                    entry.pending.retain(|c| live_clients.contains(c));
                    !entry.pending.is_empty()
                });
                !list.is_empty()
            });

            for list in qos2.values() {
                for entry in list {
                    for client in &entry.pending {
                        sends.push((client.clone(), entry.bytes.clone()));
                    }
                }
            }
        }

        return sends;
    }
}

#[cfg(test)]
mod broker {
    use super::Broker;
    use bytes::Bytes;
    use mqtt_core::topic::TopicName;
    use std::collections::HashSet;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    fn topic(s: &str) -> TopicName {
        return TopicName::from_str(s).unwrap();
    }

    #[tokio::test]
    async fn subscribe_then_subscribers_of_contains_client() {
        let broker: Broker<Vec<u8>> = Broker::new(16);
        broker.subscribe(&"b".to_string(), topic("t/1")).await;

        let subs = broker.subscribers_of(&topic("t/1")).await;
        assert!(subs.contains("b"));
    }

    #[tokio::test]
    async fn unregister_and_clear_removes_client_everywhere() {
        let broker: Broker<Vec<u8>> = Broker::new(16);
        let id = "c".to_string();
        broker
            .register_client(id.clone(), Arc::new(Mutex::new(Vec::new())))
            .await;
        broker.subscribe(&id, topic("t/1")).await;

        broker.unregister_client(&id).await;
        broker.clear_subscriptions_of(&id).await;

        assert!(broker.writer_for(&id).await.is_none());
        assert!(!broker.subscribers_of(&topic("t/1")).await.contains(&id));
    }

    #[tokio::test]
    async fn qos1_ack_drains_entry() {
        let broker: Broker<Vec<u8>> = Broker::new(16);
        let mut pending = HashSet::new();
        pending.insert("b".to_string());

        broker.record_qos1(1, Bytes::from_static(b"x"), pending).await;
        broker.ack_qos1(1, &"b".to_string()).await;

        let sends = broker.prune_and_collect_retransmits().await;
        assert!(sends.is_empty());
    }

    #[tokio::test]
    async fn qos2_pending_releases_to_delivery() {
        let broker: Broker<Vec<u8>> = Broker::new(16);
        broker
            .record_qos2_pending(5, Bytes::from_static(b"payload"), topic("t/1"))
            .await;

        let released = broker.release_qos2(5).await;
        assert!(released.is_some());
        assert!(broker.release_qos2(5).await.is_none());
    }

    #[tokio::test]
    async fn prune_drops_disconnected_subscriber() {
        let broker: Broker<Vec<u8>> = Broker::new(16);
        let mut pending = HashSet::new();
        pending.insert("b".to_string());
        pending.insert("c".to_string());

        broker
            .register_client("c".to_string(), Arc::new(Mutex::new(Vec::new())))
            .await;
        // "b" was never registered (simulates disconnect-before-register cleanup).
        broker.record_qos1(9, Bytes::from_static(b"x"), pending).await;

        let sends = broker.prune_and_collect_retransmits().await;
        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0].0, "c");
    }
}
