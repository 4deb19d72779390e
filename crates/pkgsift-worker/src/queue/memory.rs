// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-process queue for testing.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use super::{Acker, Message, QueueError, Subscription, SubscriptionOpener};

type Delivery = (u64, HashMap<String, String>);

/// State shared by the queue handle, its subscription and outstanding ackers.
#[derive(Default)]
struct Shared {
    next_id: u64,
    /// Requeued messages, delivered again before anything new
    requeued: VecDeque<Delivery>,
    acked: Vec<u64>,
    nacked: Vec<(u64, bool)>,
    opened: usize,
    fail_acks: bool,
}

/// Publisher side of an in-process queue.
///
/// Every message gets a sequence number. Acks and nacks are recorded so tests
/// can check how each message was settled. A message nacked with `requeue`
/// goes back to the head of the queue and is delivered again as redelivered.
#[derive(Clone)]
pub struct MemoryQueue {
    sender: Arc<Mutex<Option<mpsc::UnboundedSender<Delivery>>>>,
    receiver: Arc<Mutex<Option<mpsc::UnboundedReceiver<Delivery>>>>,
    shared: Arc<Mutex<Shared>>,
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender: Arc::new(Mutex::new(Some(sender))),
            receiver: Arc::new(Mutex::new(Some(receiver))),
            shared: Arc::new(Mutex::new(Shared::default())),
        }
    }

    fn shared(&self) -> std::sync::MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Enqueue a message with the given metadata. Returns its sequence number.
    pub fn publish<K, V>(&self, metadata: impl IntoIterator<Item = (K, V)>) -> u64
    where
        K: Into<String>,
        V: Into<String>,
    {
        let id = {
            let mut shared = self.shared();
            shared.next_id += 1;
            shared.next_id
        };
        let metadata = metadata
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let sender = self.sender.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(sender) = sender.as_ref() {
            // The receiver may already be gone; the message is then simply lost.
            let _ = sender.send((id, metadata));
        }
        id
    }

    /// Stop accepting messages. The subscription closes once it drains.
    pub fn close(&self) {
        self.sender.lock().unwrap_or_else(|e| e.into_inner()).take();
    }

    /// Make every later ack fail.
    pub fn fail_acks(&self) {
        self.shared().fail_acks = true;
    }

    /// Take the subscription end. Only the first call succeeds.
    pub fn subscribe(&self) -> Option<MemorySubscription> {
        let receiver = self
            .receiver
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()?;
        Some(MemorySubscription {
            receiver,
            shared: self.shared.clone(),
        })
    }

    /// Sequence numbers of acknowledged messages, in ack order.
    pub fn acked(&self) -> Vec<u64> {
        self.shared().acked.clone()
    }

    /// Sequence numbers of rejected messages with their requeue flag, in order.
    pub fn nacked(&self) -> Vec<(u64, bool)> {
        self.shared().nacked.clone()
    }

    /// Number of times the queue was opened as a subscription.
    pub fn times_opened(&self) -> usize {
        self.shared().opened
    }
}

#[async_trait]
impl SubscriptionOpener for MemoryQueue {
    async fn open(&self, _locator: &str) -> Result<Box<dyn Subscription>, QueueError> {
        self.shared().opened += 1;
        match self.subscribe() {
            Some(subscription) => Ok(Box::new(subscription)),
            None => Err(QueueError::Other("memory queue already subscribed".to_string())),
        }
    }
}

/// Receiving side of a [`MemoryQueue`].
///
/// Once the queue is closed and both the requeued and published messages
/// drain, `receive` returns [`QueueError::Closed`].
pub struct MemorySubscription {
    receiver: mpsc::UnboundedReceiver<Delivery>,
    shared: Arc<Mutex<Shared>>,
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn receive(&mut self) -> Result<Message, QueueError> {
        let requeued = self
            .shared
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .requeued
            .pop_front();
        let (redelivered, (id, metadata)) = match requeued {
            Some(delivery) => (true, delivery),
            None => (false, self.receiver.recv().await.ok_or(QueueError::Closed)?),
        };
        Ok(Message::new(
            metadata.clone(),
            redelivered,
            Box::new(MemoryAcker {
                id,
                metadata,
                shared: self.shared.clone(),
            }),
        ))
    }
}

struct MemoryAcker {
    id: u64,
    metadata: HashMap<String, String>,
    shared: Arc<Mutex<Shared>>,
}

#[async_trait]
impl Acker for MemoryAcker {
    async fn ack(self: Box<Self>) -> Result<(), QueueError> {
        let mut shared = self.shared.lock().unwrap_or_else(|e| e.into_inner());
        if shared.fail_acks {
            return Err(QueueError::Other(format!("ack of message {} rejected", self.id)));
        }
        shared.acked.push(self.id);
        Ok(())
    }

    async fn nack(self: Box<Self>, requeue: bool) -> Result<(), QueueError> {
        let mut shared = self.shared.lock().unwrap_or_else(|e| e.into_inner());
        shared.nacked.push((self.id, requeue));
        if requeue {
            shared.requeued.push_back((self.id, self.metadata));
        }
        Ok(())
    }
}
