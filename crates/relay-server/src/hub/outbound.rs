//! Bounded per-client outbound queue.
//!
//! The hub is the only producer and the client's dispatch loop the only
//! consumer. Pushing never waits: a full queue is reported back so the hub
//! can evict the client.

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Why a payload could not be queued.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushError {
    /// The queue is at capacity.
    Full,
    /// The queue was closed or its receiver is gone.
    Closed,
}

/// Producer half, owned by the hub.
#[derive(Debug)]
pub struct OutboundQueue {
    tx: Option<mpsc::Sender<Bytes>>,
}

/// Consumer half, owned by the client's dispatch loop.
#[derive(Debug)]
pub struct OutboundReceiver {
    rx: mpsc::Receiver<Bytes>,
}

impl OutboundQueue {
    /// Create a queue holding at most `capacity` pending payloads.
    pub fn new(capacity: usize) -> (Self, OutboundReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx: Some(tx) }, OutboundReceiver { rx })
    }

    /// Queue a payload without waiting.
    pub fn push(&self, payload: Bytes) -> Result<(), PushError> {
        let Some(tx) = &self.tx else {
            return Err(PushError::Closed);
        };
        tx.try_send(payload).map_err(|e| match e {
            TrySendError::Full(_) => PushError::Full,
            TrySendError::Closed(_) => PushError::Closed,
        })
    }

    /// Close the queue. Payloads already queued are still delivered, after
    /// which the receiver observes the end of the stream.
    ///
    /// Returns `false` if the queue was already closed.
    pub fn close(&mut self) -> bool {
        self.tx.take().is_some()
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.tx.is_none()
    }
}

impl OutboundReceiver {
    /// Next payload, or `None` once the queue is closed and drained.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    /// Next payload if one is already queued.
    pub fn try_recv(&mut self) -> Option<Bytes> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn push_and_receive_in_order() {
        let (queue, mut rx) = OutboundQueue::new(4);
        queue.push(Bytes::from_static(b"a")).unwrap();
        queue.push(Bytes::from_static(b"b")).unwrap();
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"a"));
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"b"));
    }

    #[test]
    fn push_to_full_queue_fails() {
        let (queue, _rx) = OutboundQueue::new(2);
        queue.push(Bytes::from_static(b"1")).unwrap();
        queue.push(Bytes::from_static(b"2")).unwrap();
        assert_eq!(queue.push(Bytes::from_static(b"3")), Err(PushError::Full));
    }

    #[test]
    fn push_after_receiver_dropped_is_closed() {
        let (queue, rx) = OutboundQueue::new(2);
        drop(rx);
        assert_eq!(queue.push(Bytes::from_static(b"x")), Err(PushError::Closed));
    }

    #[test]
    fn close_is_idempotent() {
        let (mut queue, _rx) = OutboundQueue::new(2);
        assert!(!queue.is_closed());
        assert!(queue.close());
        assert!(!queue.close());
        assert!(queue.is_closed());
        assert_eq!(queue.push(Bytes::from_static(b"x")), Err(PushError::Closed));
    }

    #[tokio::test]
    async fn close_drains_pending_then_ends() {
        let (mut queue, mut rx) = OutboundQueue::new(4);
        queue.push(Bytes::from_static(b"last")).unwrap();
        let _ = queue.close();
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"last"));
        assert!(rx.recv().await.is_none());
    }
}
