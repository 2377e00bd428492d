use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};
use zeromq::prelude::*;
use zeromq::{PubSocket, SubSocket, ZmqMessage};

use crate::error::EisenbahnError;
use crate::message::Message;
use crate::traits::{EventPublisher, EventSubscriber};
use crate::transport::Transport;

/// ZeroMQ PUB socket.
///
/// Messages are sent as two-frame ZMQ messages:
/// 1. Topic string (used by SUB sockets for prefix filtering)
/// 2. MessagePack-encoded [`Message`] envelope
///
/// A stage binds the PUB socket for its output endpoint; downstream stages
/// connect their SUB sockets to it.
pub struct ZmqPublisher {
    socket: Mutex<PubSocket>,
}

impl ZmqPublisher {
    /// Bind a publisher on `transport`, clearing any stale IPC socket first.
    #[instrument(skip_all, fields(endpoint = %transport))]
    pub async fn bind(transport: &Transport) -> Result<Self, EisenbahnError> {
        transport.ensure_ipc_dir()?;
        transport.remove_stale_socket()?;

        let mut socket = PubSocket::new();
        let endpoint = transport.endpoint();
        info!(endpoint = %endpoint, "binding PUB socket");
        socket.bind(&endpoint).await?;
        Ok(Self {
            socket: Mutex::new(socket),
        })
    }

    /// Connect a publisher to a bound SUB socket (e.g. a collector).
    #[instrument(skip_all, fields(endpoint = %transport))]
    pub async fn connect(transport: &Transport) -> Result<Self, EisenbahnError> {
        let mut socket = PubSocket::new();
        let endpoint = transport.endpoint();
        info!(endpoint = %endpoint, "connecting PUB socket");
        socket.connect(&endpoint).await?;
        Ok(Self {
            socket: Mutex::new(socket),
        })
    }
}

#[async_trait]
impl EventPublisher for ZmqPublisher {
    async fn publish(&self, message: Message) -> Result<(), EisenbahnError> {
        let envelope_bytes = message.to_bytes()?;

        let mut zmq_msg = ZmqMessage::from(message.topic.as_str());
        zmq_msg.push_back(envelope_bytes.into());

        let mut socket = self.socket.lock().await;
        socket.send(zmq_msg).await?;

        debug!(topic = %message.topic, "published message");
        Ok(())
    }
}

/// ZeroMQ SUB socket connected to an upstream stage's PUB socket.
pub struct ZmqSubscriber {
    socket: Mutex<SubSocket>,
}

impl ZmqSubscriber {
    #[instrument(skip_all, fields(endpoint = %transport))]
    pub async fn connect(transport: &Transport) -> Result<Self, EisenbahnError> {
        let mut socket = SubSocket::new();
        let endpoint = transport.endpoint();
        info!(endpoint = %endpoint, "connecting SUB socket");
        socket.connect(&endpoint).await?;
        Ok(Self {
            socket: Mutex::new(socket),
        })
    }
}

/// Pull the envelope out of a received frame set.
///
/// Our publisher always sends `[topic, envelope]`; a lone frame is taken as
/// the envelope itself.
fn envelope(zmq_msg: &ZmqMessage) -> Result<Message, EisenbahnError> {
    let frames: Vec<_> = zmq_msg.iter().collect();
    match frames.as_slice() {
        [_, frame, ..] => Message::from_bytes(frame.as_ref()),
        [single] => Message::from_bytes(single.as_ref()),
        [] => Err(EisenbahnError::Transport("empty ZMQ message".into())),
    }
}

#[async_trait]
impl EventSubscriber for ZmqSubscriber {
    async fn subscribe(&self, topic_prefix: &str) -> Result<(), EisenbahnError> {
        let mut socket = self.socket.lock().await;
        socket.subscribe(topic_prefix).await?;
        info!(topic_prefix = %topic_prefix, "subscribed to topic prefix");
        Ok(())
    }

    async fn recv(&self) -> Result<Message, EisenbahnError> {
        let zmq_msg = {
            let mut socket = self.socket.lock().await;
            socket.recv().await?
        };
        let message = envelope(&zmq_msg)?;
        debug!(topic = %message.topic, "received message");
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::topics;
    use std::time::Duration;

    #[test]
    fn envelope_from_two_frames() {
        let msg = Message::new(topics::RISK_POINT, &"payload").unwrap();
        let mut zmq_msg = ZmqMessage::from(topics::RISK_POINT);
        zmq_msg.push_back(msg.to_bytes().unwrap().into());

        let decoded = envelope(&zmq_msg).unwrap();
        assert_eq!(decoded.correlation_id, msg.correlation_id);
    }

    #[test]
    fn garbage_frame_is_deserialization_error() {
        let mut zmq_msg = ZmqMessage::from(topics::RISK_POINT);
        zmq_msg.push_back(b"\xc1\xc1".to_vec().into());
        assert!(matches!(
            envelope(&zmq_msg),
            Err(EisenbahnError::Deserialization(_))
        ));
    }

    #[tokio::test]
    async fn direct_pub_sub_roundtrip() {
        let transport = Transport::tcp("127.0.0.1", 15700);

        let publisher = ZmqPublisher::bind(&transport).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let subscriber = ZmqSubscriber::connect(&transport).await.unwrap();
        subscriber.subscribe(topics::FEATURE_VECTOR).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let msg = Message::new(topics::FEATURE_VECTOR, &"vector".to_string()).unwrap();
        let correlation_id = msg.correlation_id;
        publisher.publish(msg).await.unwrap();

        let received = tokio::time::timeout(Duration::from_secs(2), subscriber.recv())
            .await
            .expect("timed out waiting for message")
            .unwrap();

        assert_eq!(received.topic, topics::FEATURE_VECTOR);
        assert_eq!(received.correlation_id, correlation_id);
        assert_eq!(received.decode::<String>().unwrap(), "vector");
    }

    #[tokio::test]
    async fn topic_filtering_works() {
        let transport = Transport::tcp("127.0.0.1", 15701);

        let publisher = ZmqPublisher::bind(&transport).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let subscriber = ZmqSubscriber::connect(&transport).await.unwrap();
        subscriber.subscribe(topics::RISK_ALERT).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let alert = Message::new(topics::RISK_ALERT, &"alert").unwrap();
        let alert_id = alert.correlation_id;
        publisher.publish(alert).await.unwrap();
        publisher
            .publish(Message::new(topics::WORKER_HEALTH, &"ping").unwrap())
            .await
            .unwrap();

        let received = tokio::time::timeout(Duration::from_secs(2), subscriber.recv())
            .await
            .expect("timed out")
            .unwrap();
        assert_eq!(received.topic, topics::RISK_ALERT);
        assert_eq!(received.correlation_id, alert_id);

        let filtered =
            tokio::time::timeout(Duration::from_millis(300), subscriber.recv()).await;
        assert!(filtered.is_err(), "should not receive filtered message");
    }
}
