//! The outgoing frame queue: every producer thread (the dispatcher reacting
//! to an incoming frame, or an embedder call like `send_request`) pushes
//! here; only the write pump ever drains it and touches the transport.

use std::collections::VecDeque;
use std::sync::mpsc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::frame::types::Frame;

/// A single queued unit: a frame, tagged with whether it's flow-controlled
/// `DATA` the write pump must re-check against the flow controller before
/// sending, or something that always goes out immediately.
pub enum Outgoing {
    Immediate(Frame),
    Data(Frame),
    /// Carries no frame. Pushed whenever credit changes outside of a normal
    /// enqueue (an incoming `WINDOW_UPDATE`) so a write pump parked in
    /// `recv()` with deferred `DATA` still pending wakes up and retries it.
    Wake,
}

/// Ordered sink from many producers to the single write pump, plus an
/// explicit drain-confirmation signal so shutdown doesn't have to guess at
/// a fixed delay (section 5.4.1's "send GOAWAY, then give the peer a chance
/// to finish in-flight streams" is otherwise unbounded).
pub struct OutgoingQueue {
    receiver: Mutex<mpsc::Receiver<Outgoing>>,
    drained: Condvar,
    pending: Mutex<usize>,
}

impl OutgoingQueue {
    /// Builds a queue and the one producer handle every other handle is
    /// cloned from. The queue holds no sender of its own, so once every
    /// clone of the returned [`QueueSender`] is dropped, [`OutgoingQueue::recv`]
    /// reports the channel closed — that's the write pump's shutdown signal.
    pub fn new() -> (Self, QueueSender) {
        let (sender, receiver) = mpsc::channel();
        let queue = OutgoingQueue {
            receiver: Mutex::new(receiver),
            drained: Condvar::new(),
            pending: Mutex::new(0),
        };
        (queue, QueueSender { sender })
    }

    /// Blocks the write pump until a frame is available, returning `None`
    /// once every sender handle has been dropped (session torn down).
    pub fn recv(&self) -> Option<Outgoing> {
        self.receiver.lock().recv().ok()
    }

    /// Called by the write pump immediately before draining each item, so
    /// [`OutgoingQueue::wait_drained`] can tell "empty" from "never had
    /// anything queued".
    pub fn mark_in_flight(&self) {
        *self.pending.lock() += 1;
    }

    pub fn mark_sent(&self) {
        let mut pending = self.pending.lock();
        *pending -= 1;
        if *pending == 0 {
            self.drained.notify_all();
        }
    }

    /// Blocks until every frame queued at the time of the call has been
    /// written to the transport, or `timeout` elapses.
    pub fn wait_drained(&self, timeout: Duration) -> bool {
        let mut pending = self.pending.lock();
        if *pending == 0 {
            return true;
        }
        !self.drained.wait_for(&mut pending, timeout).timed_out()
    }
}

/// A cloneable producer-side handle. Dropping the last one closes the queue.
#[derive(Clone)]
pub struct QueueSender {
    sender: mpsc::Sender<Outgoing>,
}

impl QueueSender {
    pub fn push(&self, item: Outgoing) -> bool {
        self.sender.send(item).is_ok()
    }
}

/// A fallback FIFO used by the write pump to hold `DATA` frames that were
/// pulled off the queue but couldn't be sent yet for lack of flow-control
/// credit, so later-queued frames for other streams aren't blocked behind them.
#[derive(Default)]
pub struct DeferredData {
    items: VecDeque<Frame>,
}

impl DeferredData {
    pub fn new() -> Self {
        DeferredData::default()
    }

    pub fn push_back(&mut self, frame: Frame) {
        self.items.push_back(frame);
    }

    pub fn pop_front(&mut self) -> Option<Frame> {
        self.items.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::types::{Frame, StreamId};
    use bytes::Bytes;
    use std::thread;

    #[test]
    fn queued_frame_is_received_in_order() {
        let (queue, sender) = OutgoingQueue::new();
        sender.push(Outgoing::Immediate(Frame::ping(1, false)));
        sender.push(Outgoing::Immediate(Frame::ping(2, false)));

        match queue.recv().unwrap() {
            Outgoing::Immediate(Frame::Ping { payload, .. }) => assert_eq!(payload.opaque_data, 1),
            _ => panic!("expected ping"),
        }
        match queue.recv().unwrap() {
            Outgoing::Immediate(Frame::Ping { payload, .. }) => assert_eq!(payload.opaque_data, 2),
            _ => panic!("expected ping"),
        }
    }

    #[test]
    fn wake_item_carries_no_frame_but_unblocks_recv() {
        let (queue, sender) = OutgoingQueue::new();
        sender.push(Outgoing::Wake);
        assert!(matches!(queue.recv(), Some(Outgoing::Wake)));
    }

    #[test]
    fn recv_returns_none_once_all_senders_dropped() {
        let (queue, sender) = OutgoingQueue::new();
        drop(sender);
        assert!(queue.recv().is_none());
    }

    #[test]
    fn wait_drained_unblocks_once_every_in_flight_frame_is_marked_sent() {
        let (queue, _sender) = OutgoingQueue::new();
        let queue = std::sync::Arc::new(queue);
        queue.mark_in_flight();
        let q = queue.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            q.mark_sent();
        });
        assert!(queue.wait_drained(Duration::from_secs(1)));
        handle.join().unwrap();
    }

    #[test]
    fn deferred_data_preserves_fifo_order() {
        let mut deferred = DeferredData::new();
        deferred.push_back(Frame::data(StreamId::new(1), Bytes::from_static(b"a"), false));
        deferred.push_back(Frame::data(StreamId::new(1), Bytes::from_static(b"b"), false));
        match deferred.pop_front().unwrap() {
            Frame::Data { payload, .. } => assert_eq!(&payload.data[..], b"a"),
            _ => panic!("expected data"),
        }
    }
}
