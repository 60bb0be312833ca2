//! # Outbound Sender
//!
//! Encodes a message, resolves the destination channel for its `to`
//! address and hands the frame to one of the channel's socket writers. The
//! caller waits for the writer's result; a failed write tears the whole
//! destination down so the next send reconnects from scratch.

use crate::error::{BatchSendError, Result, TransportError};
use crate::pool::ConnectionPool;
use crate::router::ErrorReplier;
use async_trait::async_trait;
use codec::Encoding;
use std::sync::Arc;
use tracing::{debug, trace, warn};
use types::{ErrorBody, Message, MessageHeader, ProtocolError, StandardError};

pub struct OutboundSender {
    pool: Arc<ConnectionPool>,
    max_frame_size: usize,
}

impl OutboundSender {
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        let max_frame_size = pool.settings().max_frame_size;
        Self {
            pool,
            max_frame_size,
        }
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// Send one message and wait until its frame is written.
    ///
    /// Encoding failures affect only this message. Any failure after the
    /// destination was resolved tears the destination down.
    pub async fn send(&self, message: &Message) -> Result<()> {
        let to = message.header.to.as_ref().ok_or_else(|| {
            TransportError::delivery_failed("<none>", "message has no destination address")
        })?;

        let frame = codec::encode_frame(message).map_err(TransportError::encode)?;
        if frame.len() > self.max_frame_size {
            return Err(TransportError::encode(ProtocolError::FieldTooLarge {
                field: "frame",
                size: frame.len(),
                limit: self.max_frame_size,
            }));
        }

        let channel = self.pool.resolve_or_create(to).await?;
        let root = channel.root().clone();

        let Some(socket) = channel.next_socket() else {
            self.pool.teardown(&root);
            return Err(TransportError::delivery_failed(
                &root,
                "destination has no open sockets",
            ));
        };

        if let Err(e) = socket.write(frame).await {
            warn!(
                uri = %root,
                connection = socket.id(),
                error = %e,
                "Send failed, tearing down destination"
            );
            self.pool.teardown(&root);
            return Err(e);
        }

        trace!(
            uri = %to,
            connection = socket.id(),
            sdu = %message.header.sdu_type,
            transaction_id = message.header.transaction_id,
            "Sent message"
        );
        Ok(())
    }

    /// Send messages in order, collecting every failure instead of stopping
    /// at the first
    pub async fn send_batch(&self, messages: &[Message]) -> std::result::Result<(), BatchSendError> {
        let mut failures = Vec::new();
        for (index, message) in messages.iter().enumerate() {
            if let Err(e) = self.send(message).await {
                failures.push((index, e));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            debug!(total = messages.len(), failed = failures.len(), "Batch send had failures");
            Err(BatchSendError {
                total: messages.len(),
                failures,
            })
        }
    }
}

#[async_trait]
impl ErrorReplier for OutboundSender {
    async fn reply_error(&self, original: &MessageHeader, error: StandardError, info: String) {
        let Some(stage) = original.sdu_type.reply_stage() else {
            return;
        };
        if original.from.is_none() {
            debug!(sdu = %original.sdu_type, "No sender address, error reply dropped");
            return;
        }

        let header = original
            .reply(stage, true)
            .with_encoding(Encoding::Elements.id());
        let reply = Message::new(header, ErrorBody::new(error, info).to_elements());

        if let Err(e) = self.send(&reply).await {
            warn!(
                uri = ?original.from,
                error = %e,
                "Failed to send error reply"
            );
        }
    }
}
