use std::sync::Arc;

use bytes::Bytes;
use mqtt_core::{
    decode_mqtt_packet,
    packet::{ConnAckPacket, MqttPacket, PingRespPacket, PubAckPacket, PubCompPacket, PubRecPacket, PubRelPacket, SubAckPacket},
    qos::QosLevel,
    topic::TopicName,
    ConnectReturnCode,
};
use rand::RngCore;
use tokio::{io::AsyncWriteExt, sync::Mutex};

use crate::{
    broker::{Broker, ClientId},
    error::{ErrorKind, ServerError},
};

/// What the caller driving the read loop should do after a dispatch call.
pub enum Next {
    Continue,
    Close,
}

/// Per-connection state: the client's identity (once known) and its
/// outbound socket, shared with the broker so other sessions and the
/// retransmit loop can write to it too.
pub struct Session<W> {
    broker: Arc<Broker<W>>,
    writer: Arc<Mutex<W>>,
    client_id: Option<ClientId>,
}

impl<W: tokio::io::AsyncWrite + Unpin + Send + 'static> Session<W> {
    pub fn new(broker: Arc<Broker<W>>, writer: W) -> Self {
        return Self {
            broker,
            writer: Arc::new(Mutex::new(writer)),
            client_id: None,
        };
    }

    pub fn client_id(&self) -> Option<&str> {
        return self.client_id.as_deref();
    }

    /// Decodes one frame and dispatches it. `frame` is the exact bytes read
    /// off the wire for this packet (needed verbatim when forwarding a
    /// PUBLISH to subscribers).
    pub async fn handle_frame(&mut self, frame: Bytes) -> Result<Next, ServerError> {
        let packet = decode_mqtt_packet(frame.clone())?;

        if self.client_id.is_none() {
            return self.handle_awaiting_connect(packet).await;
        }

        return self.handle_connected(packet, frame).await;
    }

    async fn handle_awaiting_connect(&mut self, packet: MqttPacket) -> Result<Next, ServerError> {
        let MqttPacket::Connect(connect) = packet else {
            return Err(ServerError::new(
                ErrorKind::ProtocolViolation,
                String::from("The first packet on a connection must be CONNECT."),
            ));
        };

        let client_id = if connect.client_id().is_empty() {
            mint_client_id()
        } else {
            connect.client_id().to_owned()
        };

        self.broker
            .register_client(client_id.clone(), self.writer.clone())
            .await;
        self.client_id = Some(client_id);

        self.write_self(&ConnAckPacket::new(ConnectReturnCode::Accept).encode())
            .await?;

        return Ok(Next::Continue);
    }

    async fn handle_connected(&mut self, packet: MqttPacket, frame: Bytes) -> Result<Next, ServerError> {
        let client_id = self.client_id.clone().expect("connected session has a client id");

        match packet {
            MqttPacket::Connect(_) => {
                return Err(ServerError::new(
                    ErrorKind::ProtocolViolation,
                    String::from("Received a second CONNECT on an already-connected session."),
                ));
            }
            MqttPacket::Publish(publish) => match publish.qos() {
                QosLevel::AtMostOnce => {
                    self.forward_to_subscribers(publish.topic(), frame).await;
                }
                QosLevel::AtLeastOnce => {
                    let id = publish.id().expect("QoS 1 PUBLISH carries a packet id");
                    self.write_self(&PubAckPacket::new(id).encode()).await?;

                    let subscribers = self.broker.subscribers_of(publish.topic()).await;
                    self.write_to_set(&subscribers, frame.clone()).await;
                    self.broker.record_qos1(id, frame, subscribers).await;
                }
                QosLevel::ExactlyOnce => {
                    let id = publish.id().expect("QoS 2 PUBLISH carries a packet id");
                    self.write_self(&PubRecPacket::new(id).encode()).await?;
                    self.broker
                        .record_qos2_pending(id, frame, publish.topic().clone())
                        .await;
                }
            },
            MqttPacket::PubAck(ack) => {
                self.broker.ack_qos1(ack.id(), &client_id).await;
            }
            MqttPacket::PubRec(rec) => {
                self.write_self(&PubRelPacket::new(rec.id()).encode()).await?;
            }
            MqttPacket::PubRel(rel) => {
                if let Some((bytes, topic)) = self.broker.release_qos2(rel.id()).await {
                    self.write_self(&PubCompPacket::new(rel.id()).encode()).await?;

                    let subscribers = self.broker.subscribers_of(&topic).await;
                    self.write_to_set(&subscribers, bytes.clone()).await;
                    self.broker.record_qos2_delivery(rel.id(), bytes, subscribers).await;
                }
                // an id not found pending is a duplicate PUBREL; silently ignored.
            }
            MqttPacket::PubComp(comp) => {
                self.broker.ack_qos2(comp.id(), &client_id).await;
            }
            MqttPacket::Subscribe(subscribe) => {
                for sub in subscribe.subscriptions() {
                    self.broker.subscribe(&client_id, sub.topic().clone()).await;
                }

                let suback = SubAckPacket::new(subscribe.id(), subscribe.subscriptions().len());
                self.write_self(&suback.encode()?).await?;
            }
            MqttPacket::PingReq(_) => {
                self.write_self(&PingRespPacket::new().encode()).await?;
            }
            MqttPacket::Disconnect(_) => {
                self.cleanup().await;
                return Ok(Next::Close);
            }
            MqttPacket::ConnAck(_) | MqttPacket::SubAck(_) | MqttPacket::PingResp(_) => {
                return Err(ServerError::new(
                    ErrorKind::ProtocolViolation,
                    String::from("Received a server-to-client packet type from a client."),
                ));
            }
        }

        return Ok(Next::Continue);
    }

    /// Runs the same cleanup as an explicit DISCONNECT: socket EOF and I/O
    /// errors both fall through here. Idempotent — removing an absent
    /// client is a no-op.
    pub async fn cleanup(&mut self) {
        if let Some(id) = &self.client_id {
            self.broker.unregister_client(id).await;
            self.broker.clear_subscriptions_of(id).await;
        }
    }

    async fn forward_to_subscribers(&self, topic: &TopicName, bytes: Bytes) {
        let subscribers = self.broker.subscribers_of(topic).await;
        self.write_to_set(&subscribers, bytes).await;
    }

    async fn write_to_set(&self, subscribers: &std::collections::HashSet<ClientId>, bytes: Bytes) {
        for subscriber in subscribers {
            let Some(writer) = self.broker.writer_for(subscriber).await else {
                continue;
            };

            if let Err(err) = writer.lock().await.write_all(&bytes).await {
                log::warn!("Failed to forward publish to client {subscriber}: {err}");
            }
        }
    }

    async fn write_self(&self, bytes: &Bytes) -> Result<(), ServerError> {
        self.writer.lock().await.write_all(bytes).await?;
        return Ok(());
    }
}

fn mint_client_id() -> ClientId {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    return bytes.iter().map(|b| format!("{:02x}", b)).collect();
}

#[cfg(test)]
mod session {
    use super::{mint_client_id, Next, Session};
    use crate::broker::Broker;
    use bytes::{BufMut, Bytes, BytesMut};
    use mqtt_core::topic::TopicName;
    use std::sync::Arc;
    use tokio::io::{duplex, AsyncReadExt};

    fn connect_frame(client_id: &str) -> Bytes {
        let mut buf = BytesMut::new();
        let id_bytes = client_id.as_bytes();
        let remaining = 10 + 2 + id_bytes.len();
        buf.put_u8(0x10);
        buf.put_u8(remaining as u8);
        buf.put_u16(4);
        buf.put_slice(b"MQTT");
        buf.put_u8(0x04);
        buf.put_u8(0x02);
        buf.put_u16(60);
        buf.put_u16(id_bytes.len() as u16);
        buf.put_slice(id_bytes);
        return buf.freeze();
    }

    #[tokio::test]
    async fn connect_registers_client_and_sends_connack() {
        let broker: Arc<Broker<_>> = Arc::new(Broker::new(16));
        let (client_side, server_side) = duplex(4096);
        let mut session = Session::new(broker.clone(), server_side);

        let next = session
            .handle_frame(connect_frame("client-a"))
            .await
            .expect("CONNECT should be accepted");
        assert!(matches!(next, Next::Continue));
        assert_eq!(session.client_id(), Some("client-a"));
        assert!(broker.writer_for(&"client-a".to_string()).await.is_some());

        let mut client_side = client_side;
        let mut response = [0u8; 4];
        client_side.read_exact(&mut response).await.unwrap();
        assert_eq!(response, [0x20, 0x02, 0x00, 0x00]);
    }

    #[tokio::test]
    async fn non_connect_first_packet_is_protocol_error() {
        let broker: Arc<Broker<_>> = Arc::new(Broker::new(16));
        let (_client_side, server_side) = duplex(4096);
        let mut session = Session::new(broker, server_side);

        let mut buf = BytesMut::new();
        buf.put_u8(0xC0);
        buf.put_u8(0x00);

        let result = session.handle_frame(buf.freeze()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn disconnect_clears_client_from_broker() {
        let broker: Arc<Broker<_>> = Arc::new(Broker::new(16));
        let (_client_side, server_side) = duplex(4096);
        let mut session = Session::new(broker.clone(), server_side);

        session.handle_frame(connect_frame("client-b")).await.unwrap();
        broker
            .subscribe(&"client-b".to_string(), TopicName::from_str("t/1").unwrap())
            .await;

        let mut disconnect = BytesMut::new();
        disconnect.put_u8(0xE0);
        disconnect.put_u8(0x00);

        let next = session.handle_frame(disconnect.freeze()).await.unwrap();
        assert!(matches!(next, Next::Close));

        assert!(broker.writer_for(&"client-b".to_string()).await.is_none());
        assert!(!broker
            .subscribers_of(&TopicName::from_str("t/1").unwrap())
            .await
            .contains("client-b"));
    }

    #[test]
    fn minted_ids_are_not_empty_and_differ() {
        let a = mint_client_id();
        let b = mint_client_id();
        assert!(!a.is_empty());
        assert_ne!(a, b);
    }

    fn subscribe_frame(packet_id: u16, topic: &str) -> Bytes {
        use mqtt_core::packet::{SubscribePacket, TopicSubscription};
        use mqtt_core::qos::QosLevel;

        let packet = SubscribePacket::new(
            packet_id,
            vec![TopicSubscription::new(
                TopicName::from_str(topic).unwrap(),
                QosLevel::AtMostOnce,
            )],
        );
        return packet.encode().unwrap();
    }

    async fn connected_session(
        broker: Arc<Broker<tokio::io::DuplexStream>>,
        client_id: &str,
    ) -> (Session<tokio::io::DuplexStream>, tokio::io::DuplexStream) {
        let (client_side, server_side) = duplex(8192);
        let mut session = Session::new(broker, server_side);
        session.handle_frame(connect_frame(client_id)).await.unwrap();
        return (session, client_side);
    }

    #[tokio::test]
    async fn qos0_publish_forwards_bytes_verbatim_to_subscriber() {
        use mqtt_core::packet::Encode;
        use mqtt_core::packet::PublishPacket;

        let broker: Arc<Broker<_>> = Arc::new(Broker::new(16));
        let (mut session_a, mut a_side) = connected_session(broker.clone(), "a").await;
        let (mut session_b, mut b_side) = connected_session(broker.clone(), "b").await;

        // drain each side's CONNACK.
        let mut connack = [0u8; 4];
        a_side.read_exact(&mut connack).await.unwrap();
        b_side.read_exact(&mut connack).await.unwrap();

        session_b
            .handle_frame(subscribe_frame(1, "t/1"))
            .await
            .unwrap();
        let mut suback = [0u8; 5];
        b_side.read_exact(&mut suback).await.unwrap();

        let topic = TopicName::from_str("t/1").unwrap();
        let publish = PublishPacket::new(&topic, Bytes::from_static(b"hello"));
        let frame = publish.encode().unwrap();

        session_a.handle_frame(frame.clone()).await.unwrap();

        let mut received = vec![0u8; frame.len()];
        b_side.read_exact(&mut received).await.unwrap();
        assert_eq!(received, frame.to_vec());
    }

    #[tokio::test]
    async fn qos1_handshake_acks_publisher_and_drains_after_subscriber_puback() {
        use mqtt_core::packet::{Encode, PubAckPacket, PublishPacket};

        let broker: Arc<Broker<_>> = Arc::new(Broker::new(16));
        let (mut session_a, mut a_side) = connected_session(broker.clone(), "a").await;
        let (mut session_b, mut b_side) = connected_session(broker.clone(), "b").await;

        let mut connack = [0u8; 4];
        a_side.read_exact(&mut connack).await.unwrap();
        b_side.read_exact(&mut connack).await.unwrap();

        session_b
            .handle_frame(subscribe_frame(1, "t/1"))
            .await
            .unwrap();
        let mut suback = [0u8; 5];
        b_side.read_exact(&mut suback).await.unwrap();

        let topic = TopicName::from_str("t/1").unwrap();
        let mut publish = PublishPacket::new(&topic, Bytes::from_static(b"x"));
        publish.set_qos_atleastonce(1);
        let frame = publish.encode().unwrap();

        session_a.handle_frame(frame.clone()).await.unwrap();

        // publisher gets PUBACK(1) immediately.
        let mut puback = [0u8; 4];
        a_side.read_exact(&mut puback).await.unwrap();
        assert_eq!(puback, [0x40, 0x02, 0x00, 0x01]);

        // subscriber gets the forwarded publish.
        let mut received = vec![0u8; frame.len()];
        b_side.read_exact(&mut received).await.unwrap();
        assert_eq!(received, frame.to_vec());

        // before the subscriber ACKs, the entry is still in-flight.
        assert_eq!(broker.prune_and_collect_retransmits().await.len(), 1);

        let ack_frame = PubAckPacket::new(1).encode();
        session_b.handle_frame(ack_frame).await.unwrap();

        assert!(broker.prune_and_collect_retransmits().await.is_empty());
    }

    #[tokio::test]
    async fn qos2_full_handshake_delivers_once_and_drains_after_pubcomp() {
        use mqtt_core::packet::{Encode, PubCompPacket, PubRecPacket, PubRelPacket, PublishPacket};

        let broker: Arc<Broker<_>> = Arc::new(Broker::new(16));
        let (mut session_a, mut a_side) = connected_session(broker.clone(), "a").await;
        let (mut session_b, mut b_side) = connected_session(broker.clone(), "b").await;

        let mut connack = [0u8; 4];
        a_side.read_exact(&mut connack).await.unwrap();
        b_side.read_exact(&mut connack).await.unwrap();

        session_b
            .handle_frame(subscribe_frame(1, "t/1"))
            .await
            .unwrap();
        let mut suback = [0u8; 5];
        b_side.read_exact(&mut suback).await.unwrap();

        let topic = TopicName::from_str("t/1").unwrap();
        let mut publish = PublishPacket::new(&topic, Bytes::from_static(b"payload"));
        publish.set_qos_exactlyonce(5);
        let frame = publish.encode().unwrap();

        session_a.handle_frame(frame.clone()).await.unwrap();

        // publisher gets PUBREC(5); nothing delivered to the subscriber yet.
        let mut pubrec = [0u8; 4];
        a_side.read_exact(&mut pubrec).await.unwrap();
        assert_eq!(pubrec.to_vec(), PubRecPacket::new(5).encode().to_vec());

        let pubrel_frame = PubRelPacket::new(5).encode();
        session_a.handle_frame(pubrel_frame).await.unwrap();

        // publisher gets PUBCOMP(5)...
        let mut pubcomp = [0u8; 4];
        a_side.read_exact(&mut pubcomp).await.unwrap();
        assert_eq!(pubcomp.to_vec(), PubCompPacket::new(5).encode().to_vec());

        // ...and the subscriber now receives the buffered publish.
        let mut received = vec![0u8; frame.len()];
        b_side.read_exact(&mut received).await.unwrap();
        assert_eq!(received, frame.to_vec());

        assert_eq!(broker.prune_and_collect_retransmits().await.len(), 1);

        let comp_frame = PubCompPacket::new(5).encode();
        session_b.handle_frame(comp_frame).await.unwrap();

        assert!(broker.prune_and_collect_retransmits().await.is_empty());
    }
}
