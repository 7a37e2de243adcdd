//! Keyed broadcast queue
//!
//! One `BroadcastQueue` exists per subscription key. The receive loop
//! writes routed messages into a bounded channel; each consumer keeps a
//! private FIFO replay buffer. Whichever consumer reaches the shared
//! channel first fans the message out into every live buffer, so all
//! consumers observe the same per-key order without coordinating.
//!
//! Membership (join/leave/fan-out/read) is serialized by one async lock
//! per queue. The channel sender is mirrored into a sync slot so the
//! receive loop can publish without awaiting.

use polygon_types::PolygonError;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, MutexGuard};

pub(crate) type Payload = Arc<Value>;

/// Fan-out buffer for one subscription key
pub(crate) struct BroadcastQueue {
    capacity: usize,
    /// Write-side state, under a sync lock so the receive loop can both
    /// publish and fail queues without awaiting
    write: parking_lot::Mutex<WriteSide>,
    members: Mutex<Members>,
}

#[derive(Default)]
struct WriteSide {
    sender: Option<mpsc::Sender<Payload>>,
    failure: Option<String>,
}

/// Join/leave state; the guard is held across subscribe/unsubscribe so a
/// key's attach and detach cannot interleave
#[derive(Default)]
pub(crate) struct Members {
    buffers: HashMap<u64, VecDeque<Payload>>,
    receiver: Option<Arc<Mutex<mpsc::Receiver<Payload>>>>,
    next_id: u64,
}

impl Members {
    /// Register a new consumer and return its cursor id
    pub fn join(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.buffers.insert(id, VecDeque::new());
        id
    }

    /// Remove a consumer. Returns true when it was the last one
    pub fn leave(&mut self, id: u64) -> bool {
        if self.buffers.remove(&id).is_none() {
            return false;
        }
        self.buffers.is_empty()
    }

    #[cfg(test)]
    pub fn consumer_count(&self) -> usize {
        self.buffers.len()
    }
}

impl BroadcastQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            write: parking_lot::Mutex::new(WriteSide::default()),
            members: Mutex::new(Members::default()),
        }
    }

    pub async fn lock_members(&self) -> MutexGuard<'_, Members> {
        self.members.lock().await
    }

    /// Open the channel if it is not already open. Returns true when this
    /// call opened it, i.e. the caller is the first consumer of a fresh
    /// active interval and must trigger the wire subscribe.
    pub fn open_channel(&self, members: &mut Members) -> bool {
        if members.receiver.is_some() {
            return false;
        }
        let (tx, rx) = mpsc::channel(self.capacity);
        let mut write = self.write.lock();
        write.sender = Some(tx);
        write.failure = None;
        drop(write);
        members.receiver = Some(Arc::new(Mutex::new(rx)));
        true
    }

    /// Drop the channel so the next join starts a fresh interval
    pub fn retire(&self, members: &mut Members) {
        members.receiver = None;
        let mut write = self.write.lock();
        write.sender = None;
        write.failure = None;
    }

    /// Write one message, without blocking. Returns false when the message
    /// was dropped: either no consumer interval is active, or the channel
    /// is saturated (a slow consumer loses data rather than stalling the
    /// shared receive loop).
    pub fn publish(&self, message: Value) -> bool {
        let write = self.write.lock();
        match write.sender.as_ref() {
            Some(tx) => tx.try_send(Arc::new(message)).is_ok(),
            None => false,
        }
    }

    /// Mark the queue dead so every attached consumer observes the reason
    /// instead of starving
    ///
    /// Never awaits: the receive loop fails every queue on its way out,
    /// including queues whose membership locks are held by tasks that are
    /// themselves waiting on the loop.
    pub fn fail(&self, reason: &str) {
        let mut write = self.write.lock();
        write.failure = Some(reason.to_string());
        write.sender = None;
    }

    fn failure(&self) -> Option<String> {
        self.write.lock().failure.clone()
    }

    /// Pull the next message for the given cursor
    ///
    /// Drains the consumer's own buffer first; otherwise waits on the
    /// shared channel and fans the received message out to every live
    /// buffer. Returns `None` when the queue has been retired.
    pub async fn next_for(&self, id: u64) -> Option<Result<Payload, PolygonError>> {
        loop {
            let receiver = {
                let mut members = self.members.lock().await;
                match members.buffers.get_mut(&id) {
                    Some(buffer) => {
                        if let Some(message) = buffer.pop_front() {
                            return Some(Ok(message));
                        }
                    }
                    None => return None,
                }
                if let Some(reason) = self.failure() {
                    return Some(Err(PolygonError::LoopTerminated { reason }));
                }
                match &members.receiver {
                    Some(receiver) => Arc::clone(receiver),
                    None => return None,
                }
            };

            // Only one consumer at a time waits on the shared channel.
            let mut channel = receiver.lock().await;

            // Another consumer may have fanned out, or the queue may have
            // been failed or retired, while we waited for the receiver.
            {
                let mut members = self.members.lock().await;
                match members.buffers.get_mut(&id) {
                    Some(buffer) if !buffer.is_empty() => continue,
                    Some(_) => {}
                    None => return None,
                }
                if self.failure().is_some() || members.receiver.is_none() {
                    continue;
                }
            }

            match channel.recv().await {
                Some(message) => {
                    let mut members = self.members.lock().await;
                    for buffer in members.buffers.values_mut() {
                        buffer.push_back(Arc::clone(&message));
                    }
                }
                // Sender gone: the queue was failed or retired. Loop back
                // to classify under the members lock.
                None => continue,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::timeout;

    async fn pull(queue: &BroadcastQueue, id: u64) -> Option<Result<Payload, PolygonError>> {
        timeout(Duration::from_secs(1), queue.next_for(id))
            .await
            .expect("next_for should not hang")
    }

    fn open_and_join(queue: &BroadcastQueue, consumers: usize) -> Vec<u64> {
        let mut members = queue.members.try_lock().unwrap();
        queue.open_channel(&mut members);
        (0..consumers).map(|_| members.join()).collect()
    }

    #[tokio::test]
    async fn all_consumers_see_identical_order() {
        let queue = BroadcastQueue::new(8);
        let ids = open_and_join(&queue, 3);

        for n in 1..=4 {
            assert!(queue.publish(json!({"n": n})));
        }

        for &id in &ids {
            for n in 1..=4 {
                let message = pull(&queue, id).await.unwrap().unwrap();
                assert_eq!(message["n"], n);
            }
        }
    }

    #[tokio::test]
    async fn late_joiner_only_sees_new_messages() {
        let queue = BroadcastQueue::new(8);
        let first = open_and_join(&queue, 1)[0];

        queue.publish(json!({"n": 1}));
        let message = pull(&queue, first).await.unwrap().unwrap();
        assert_eq!(message["n"], 1);

        let second = {
            let mut members = queue.lock_members().await;
            members.join()
        };

        queue.publish(json!({"n": 2}));
        let message = pull(&queue, second).await.unwrap().unwrap();
        assert_eq!(message["n"], 2);
        let message = pull(&queue, first).await.unwrap().unwrap();
        assert_eq!(message["n"], 2);
    }

    #[tokio::test]
    async fn saturated_channel_drops_writes() {
        let queue = BroadcastQueue::new(2);
        let id = open_and_join(&queue, 1)[0];

        assert!(queue.publish(json!({"n": 1})));
        assert!(queue.publish(json!({"n": 2})));
        // nobody is draining; the third write is dropped
        assert!(!queue.publish(json!({"n": 3})));

        assert_eq!(pull(&queue, id).await.unwrap().unwrap()["n"], 1);
        assert_eq!(pull(&queue, id).await.unwrap().unwrap()["n"], 2);
    }

    #[tokio::test]
    async fn publish_without_active_interval_is_dropped() {
        let queue = BroadcastQueue::new(4);
        assert!(!queue.publish(json!({"n": 1})));
    }

    #[tokio::test]
    async fn failure_surfaces_to_blocked_consumers() {
        let queue = Arc::new(BroadcastQueue::new(4));
        let id = open_and_join(&queue, 1)[0];

        let reader = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.next_for(id).await })
        };

        tokio::task::yield_now().await;
        queue.fail("transport failure");

        let result = timeout(Duration::from_secs(1), reader)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            result,
            Some(Err(PolygonError::LoopTerminated { .. }))
        ));
    }

    #[tokio::test]
    async fn retire_ends_the_stream() {
        let queue = BroadcastQueue::new(4);
        let id = open_and_join(&queue, 1)[0];

        {
            let mut members = queue.lock_members().await;
            queue.retire(&mut members);
        }
        assert!(pull(&queue, id).await.is_none());
    }

    #[tokio::test]
    async fn last_leave_reports_true() {
        let queue = BroadcastQueue::new(4);
        let ids = open_and_join(&queue, 2);

        let mut members = queue.lock_members().await;
        assert!(!members.leave(ids[0]));
        assert!(members.leave(ids[1]));
        assert_eq!(members.consumer_count(), 0);
    }
}
