//! Broker endpoint
//!
//! Listener bound to the broker's transport endpoint. Consumers REGISTER
//! and DEREGISTER subscriptions, providers PUBLISH updates, and the broker
//! fans each publish out as one NOTIFY per matched consumer.
//!
//! ```text
//! REGISTER            ─► add_subscription      ─► REGISTER_ACK
//! DEREGISTER          ─► remove_subscriptions  ─► DEREGISTER_ACK
//! PUBLISH_REGISTER    ─────────────────────────► PUBLISH_REGISTER_ACK
//! PUBLISH_DEREGISTER  ─────────────────────────► PUBLISH_DEREGISTER_ACK
//! PUBLISH             ─► match_publish ─► NOTIFY × consumers (send_batch)
//! ```

use crate::engine::{BrokerMatchEngine, NotifyBatch, TopicSignature};
use crate::error::{BrokerError, BrokerResult};
use crate::wire::{DeregisterBody, NotifyBody, PublishBody, RegisterBody};
use async_trait::async_trait;
use codec::Encoding;
use network::{Endpoint, MessageListener};
use std::sync::Arc;
use tracing::{debug, warn};
use types::{ErrorBody, Message, MessageHeader, SduType};

pub struct BrokerEndpoint {
    engine: Arc<BrokerMatchEngine>,
}

impl BrokerEndpoint {
    pub fn new(engine: Arc<BrokerMatchEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<BrokerMatchEngine> {
        &self.engine
    }

    async fn handle(&self, endpoint: &Endpoint, message: &Message) -> BrokerResult<()> {
        let header = &message.header;
        match header.sdu_type {
            SduType::Register => {
                let consumer = sender(header)?;
                let body = RegisterBody::from_elements(&message.body)?;
                self.engine.add_subscription(
                    consumer,
                    &TopicSignature::from_header(header),
                    &body.subscription,
                    body.patterns,
                    &body.on_change_only,
                )?;
                acknowledge(endpoint, message).await
            }
            SduType::Deregister => {
                let consumer = sender(header)?;
                let body = DeregisterBody::from_elements(&message.body)?;
                let topic = TopicSignature::from_header(header);
                let removed = if body.subscriptions.is_empty() {
                    self.engine.remove_all(consumer, &topic)
                } else {
                    self.engine
                        .remove_subscriptions(consumer, &topic, &body.subscriptions)
                };
                debug!(consumer = %consumer, removed, "Deregistered");
                acknowledge(endpoint, message).await
            }
            SduType::PublishRegister | SduType::PublishDeregister => {
                sender(header)?;
                acknowledge(endpoint, message).await
            }
            SduType::Publish => {
                let body = PublishBody::from_elements(&message.body)?;
                let batches = self
                    .engine
                    .match_publish(&TopicSignature::from_header(header), &body.updates);
                self.notify(endpoint, header, batches).await
            }
            other => {
                debug!(sdu = %other, "Not a broker operation, ignored");
                Ok(())
            }
        }
    }

    /// Send one NOTIFY per batch; failures are logged per consumer
    async fn notify(
        &self,
        endpoint: &Endpoint,
        publish: &MessageHeader,
        batches: Vec<NotifyBatch>,
    ) -> BrokerResult<()> {
        let mut consumers = Vec::with_capacity(batches.len());
        let mut notifies = Vec::with_capacity(batches.len());
        for batch in batches {
            let body = NotifyBody {
                subscriptions: batch.subscriptions,
                updates: batch.updates,
            };
            let elements = match body.to_elements() {
                Ok(elements) => elements,
                Err(e) => {
                    warn!(consumer = %batch.consumer, error = %e, "NOTIFY not encodable, skipped");
                    continue;
                }
            };

            let mut header = publish.reply(SduType::Notify, false);
            header.from = Some(endpoint.uri().clone());
            header.to = Some(batch.consumer.clone());
            header.encoding_id = Encoding::Elements.id();
            consumers.push(batch.consumer);
            notifies.push(Message::new(header, elements));
        }
        if notifies.is_empty() {
            return Ok(());
        }

        debug!(consumers = consumers.len(), "Fanning out NOTIFY");
        if let Err(e) = endpoint.send_batch(notifies).await {
            for (index, error) in &e.failures {
                warn!(
                    consumer = %consumers[*index],
                    error = %error,
                    "NOTIFY delivery failed"
                );
            }
            return Err(e.into());
        }
        Ok(())
    }
}

#[async_trait]
impl MessageListener for BrokerEndpoint {
    async fn on_message(&self, endpoint: &Endpoint, message: Message) {
        let Err(error) = self.handle(endpoint, &message).await else {
            return;
        };

        warn!(
            sdu = %message.header.sdu_type,
            from = ?message.header.from,
            error = %error,
            "Broker operation failed"
        );
        // Fan-out failures concern consumers, not the publisher
        if matches!(error, BrokerError::Notify(_)) {
            return;
        }
        if let Some(stage) = message.header.sdu_type.reply_stage() {
            if message.header.from.is_some() {
                let header = message
                    .header
                    .reply(stage, true)
                    .with_encoding(Encoding::Elements.id());
                let body = ErrorBody::new(error.standard_error(), error.to_string());
                if let Err(e) = endpoint.send(Message::new(header, body.to_elements())).await {
                    warn!(error = %e, "Failed to send broker error reply");
                }
            }
        }
    }
}

fn sender(header: &MessageHeader) -> BrokerResult<&types::Uri> {
    header.from.as_ref().ok_or(BrokerError::MissingSender)
}

async fn acknowledge(endpoint: &Endpoint, message: &Message) -> BrokerResult<()> {
    let Some(stage) = message.header.sdu_type.reply_stage() else {
        return Ok(());
    };
    let ack = message.reply(stage, Vec::new());
    endpoint.send(ack).await?;
    debug!(
        sdu = %stage,
        to = ?message.header.from,
        transaction_id = message.header.transaction_id,
        "Acknowledged"
    );
    Ok(())
}
