//! Inbound dispatch worker pool
//!
//! A fixed number of workers, each draining its own bounded queue into the
//! endpoint router. Every connection is pinned to one worker, so messages
//! from one socket are routed in arrival order while different sockets are
//! routed in parallel. A full queue makes the reader wait, which in turn
//! stops it reading from the socket.

use crate::channel::ConnectionId;
use crate::router::EndpointRouter;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};
use types::Message;

/// Cloneable handle for submitting decoded messages
#[derive(Clone)]
pub struct InboundDispatcher {
    queues: Arc<[mpsc::Sender<Message>]>,
}

/// Receiving ends of the worker queues, consumed by [`DispatchWorkers::spawn`]
pub struct DispatchWorkers {
    queues: Vec<mpsc::Receiver<Message>>,
}

impl InboundDispatcher {
    /// Create `workers` queues of `depth` messages each. At least one worker
    /// and one queue slot are always created.
    pub fn new(workers: usize, depth: usize) -> (Self, DispatchWorkers) {
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..workers.max(1))
            .map(|_| mpsc::channel(depth.max(1)))
            .unzip();
        (
            Self {
                queues: senders.into(),
            },
            DispatchWorkers { queues: receivers },
        )
    }

    pub fn worker_count(&self) -> usize {
        self.queues.len()
    }

    /// Worker a connection is pinned to
    pub fn worker_for(&self, connection: ConnectionId) -> usize {
        (connection % self.queues.len() as u64) as usize
    }

    /// Queue a message, waiting while the worker's queue is full.
    /// Returns false once the workers have stopped.
    pub async fn dispatch(&self, connection: ConnectionId, message: Message) -> bool {
        let worker = self.worker_for(connection);
        trace!(connection, worker, sdu = %message.header.sdu_type, "Dispatching message");
        self.queues[worker].send(message).await.is_ok()
    }
}

impl DispatchWorkers {
    /// Start one task per queue, routing every message through `router`
    pub fn spawn(self, router: Arc<EndpointRouter>) -> Vec<JoinHandle<()>> {
        self.queues
            .into_iter()
            .enumerate()
            .map(|(worker, mut queue)| {
                let router = Arc::clone(&router);
                tokio::spawn(async move {
                    while let Some(message) = queue.recv().await {
                        router.route(message).await;
                    }
                    debug!(worker, "Dispatch worker stopped");
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::{MessageHeader, SduType};

    fn message(transaction_id: u64) -> Message {
        Message::new(
            MessageHeader::new(SduType::Send).with_transaction_id(transaction_id),
            vec![],
        )
    }

    #[test]
    fn test_connection_pinning() {
        let (dispatcher, _workers) = InboundDispatcher::new(3, 8);
        assert_eq!(dispatcher.worker_count(), 3);
        assert_eq!(dispatcher.worker_for(4), dispatcher.worker_for(7));
        assert_ne!(dispatcher.worker_for(4), dispatcher.worker_for(5));
    }

    #[test]
    fn test_zero_workers_still_dispatches() {
        let (dispatcher, workers) = InboundDispatcher::new(0, 0);
        assert_eq!(dispatcher.worker_count(), 1);
        assert_eq!(workers.queues.len(), 1);
    }

    #[tokio::test]
    async fn test_per_connection_order_and_backpressure() {
        let (dispatcher, mut workers) = InboundDispatcher::new(2, 2);

        assert!(dispatcher.dispatch(1, message(1)).await);
        assert!(dispatcher.dispatch(1, message(2)).await);

        // Queue for connection 1 is full; the third dispatch must wait
        let blocked = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            dispatcher.dispatch(1, message(3)),
        )
        .await;
        assert!(blocked.is_err());

        let queue = &mut workers.queues[dispatcher.worker_for(1)];
        assert_eq!(queue.recv().await.unwrap().header.transaction_id, 1);
        assert_eq!(queue.recv().await.unwrap().header.transaction_id, 2);
    }

    #[tokio::test]
    async fn test_dispatch_fails_after_workers_stop() {
        let (dispatcher, workers) = InboundDispatcher::new(1, 1);
        drop(workers);
        assert!(!dispatcher.dispatch(0, message(1)).await);
    }
}
