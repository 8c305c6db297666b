//! The message broker abstraction.
//!
//! The original system wires everything directly to RabbitMQ: a durable
//! fanout exchange (`frontend_notifications`) for notifications and a
//! durable queue per agent for direct addressing. We keep that exact
//! topology but express it as a trait so a single-instance deployment (and
//! every test in this workspace) can run against an in-process
//! implementation without a broker to stand up.

use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use voxrelay_core::{AgentMessage, Notification};

use crate::error::{GatewayError, Result};

/// Fanout + per-agent-queue messaging, matching the topology in.
#[async_trait]
pub trait NotificationBroker: Send + Sync {
    /// Publish to the `frontend_notifications` fanout exchange: every
    /// gateway instance's exclusive queue receives a copy.
    async fn publish_fanout(&self, notification: &Notification) -> Result<()>;

    /// Publish directly to `<agent_id>_queue`.
    async fn publish_to_agent(&self, agent_id: &str, message: AgentMessage) -> Result<()>;

    /// Subscribe to this instance's exclusive fanout queue.
    async fn subscribe_fanout(&self) -> Result<tokio::sync::broadcast::Receiver<Notification>>;
}

/// In-process broker: a `tokio::sync::broadcast` channel stands in for the
/// fanout exchange, and one `tokio::sync::mpsc` channel per agent id stands
/// in for a durable per-agent queue. Sufficient for a single gateway
/// instance and for every integration test in this workspace; a
/// multi-instance deployment uses [`AmqpBroker`] instead, the same trait
/// built on `lapin`, without touching call sites.
pub struct LocalBroker {
    fanout_tx: tokio::sync::broadcast::Sender<Notification>,
    agent_queues: dashmap::DashMap<String, tokio::sync::mpsc::UnboundedSender<AgentMessage>>,
}

impl LocalBroker {
    pub fn new() -> Self {
        let (fanout_tx, _rx) = tokio::sync::broadcast::channel(1024);
        Self {
            fanout_tx,
            agent_queues: dashmap::DashMap::new(),
        }
    }

    /// Registers a receiver for `<agent_id>_queue`, replacing any previous
    /// one for the same agent (mirrors a queue redeclare-and-rebind).
    pub fn register_agent_queue(&self, agent_id: &str) -> tokio::sync::mpsc::UnboundedReceiver<AgentMessage> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        self.agent_queues.insert(agent_id.to_string(), tx);
        rx
    }
}

impl Default for LocalBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationBroker for LocalBroker {
    async fn publish_fanout(&self, notification: &Notification) -> Result<()> {
        // No subscribers is not an error: it mirrors a fanout exchange with
        // no bound queues yet (e.g. at startup before any instance connects).
        let _ = self.fanout_tx.send(notification.clone());
        Ok(())
    }

    async fn publish_to_agent(&self, agent_id: &str, message: AgentMessage) -> Result<()> {
        if let Some(tx) = self.agent_queues.get(agent_id) {
            let _ = tx.send(message);
        } else {
            tracing::debug!(agent_id, "no queue registered for agent, dropping direct message");
        }
        Ok(())
    }

    async fn subscribe_fanout(&self) -> Result<tokio::sync::broadcast::Receiver<Notification>> {
        Ok(self.fanout_tx.subscribe())
    }
}

const FANOUT_EXCHANGE: &str = "frontend_notifications";

/// AMQP-backed broker for a multi-instance deployment: a durable
/// `frontend_notifications` fanout exchange with one exclusive queue bound
/// per connecting instance, and one durable `<agent_id>_queue` per agent.
/// The exclusive queue's consumer forwards deliveries into the same
/// in-process broadcast channel `LocalBroker` uses, so `subscribe_fanout`
/// callers don't need to know which implementation is behind the trait.
pub struct AmqpBroker {
    channel: Channel,
    _connection: Connection,
    fanout_tx: tokio::sync::broadcast::Sender<Notification>,
}

impl AmqpBroker {
    pub async fn connect(amqp_url: &str) -> Result<Self> {
        let connection = Connection::connect(amqp_url, ConnectionProperties::default())
            .await
            .map_err(|e| GatewayError::internal(format!("failed to connect to AMQP broker: {e}")))?;
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| GatewayError::internal(format!("failed to open AMQP channel: {e}")))?;

        channel
            .exchange_declare(
                FANOUT_EXCHANGE,
                ExchangeKind::Fanout,
                ExchangeDeclareOptions { durable: true, ..Default::default() },
                FieldTable::default(),
            )
            .await
            .map_err(|e| GatewayError::internal(format!("failed to declare fanout exchange: {e}")))?;

        let queue = channel
            .queue_declare(
                "",
                QueueDeclareOptions { exclusive: true, auto_delete: true, ..Default::default() },
                FieldTable::default(),
            )
            .await
            .map_err(|e| GatewayError::internal(format!("failed to declare exclusive fanout queue: {e}")))?;
        let queue_name = queue.name().as_str().to_string();

        channel
            .queue_bind(&queue_name, FANOUT_EXCHANGE, "", QueueBindOptions::default(), FieldTable::default())
            .await
            .map_err(|e| GatewayError::internal(format!("failed to bind fanout queue: {e}")))?;

        let (fanout_tx, _rx) = tokio::sync::broadcast::channel(1024);
        let forward_tx = fanout_tx.clone();
        let mut consumer = channel
            .basic_consume(
                &queue_name,
                "gateway-fanout-consumer",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| GatewayError::internal(format!("failed to start fanout consumer: {e}")))?;

        tokio::spawn(async move {
            while let Some(delivery) = consumer.next().await {
                let Ok(delivery) = delivery else { continue };
                match serde_json::from_slice::<Notification>(&delivery.data) {
                    Ok(notification) => {
                        let _ = forward_tx.send(notification);
                    }
                    Err(e) => tracing::warn!(error = %e, "dropping malformed fanout delivery"),
                }
                let _ = delivery.ack(BasicAckOptions::default()).await;
            }
        });

        Ok(Self { channel, _connection: connection, fanout_tx })
    }
}

#[async_trait]
impl NotificationBroker for AmqpBroker {
    async fn publish_fanout(&self, notification: &Notification) -> Result<()> {
        let payload = serde_json::to_vec(notification)
            .map_err(|e| GatewayError::internal(format!("failed to serialize notification: {e}")))?;
        self.channel
            .basic_publish(
                FANOUT_EXCHANGE,
                "",
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default().with_delivery_mode(2),
            )
            .await
            .map_err(|e| GatewayError::internal(format!("failed to publish to fanout exchange: {e}")))?
            .await
            .map_err(|e| GatewayError::internal(format!("fanout publish not confirmed: {e}")))?;
        Ok(())
    }

    async fn publish_to_agent(&self, agent_id: &str, message: AgentMessage) -> Result<()> {
        let queue_name = format!("{agent_id}_queue");
        self.channel
            .queue_declare(&queue_name, QueueDeclareOptions { durable: true, ..Default::default() }, FieldTable::default())
            .await
            .map_err(|e| GatewayError::internal(format!("failed to declare agent queue: {e}")))?;
        let payload = serde_json::to_vec(&message)
            .map_err(|e| GatewayError::internal(format!("failed to serialize agent message: {e}")))?;
        self.channel
            .basic_publish(
                "",
                &queue_name,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default().with_delivery_mode(2),
            )
            .await
            .map_err(|e| GatewayError::internal(format!("failed to publish to agent queue: {e}")))?
            .await
            .map_err(|e| GatewayError::internal(format!("agent queue publish not confirmed: {e}")))?;
        Ok(())
    }

    async fn subscribe_fanout(&self) -> Result<tokio::sync::broadcast::Receiver<Notification>> {
        Ok(self.fanout_tx.subscribe())
    }
}
