//! Priority packet queue between the router and a connection's writer.
//!
//! Packets come out highest priority first and, within a priority, in the
//! order they went in. A queue may be bounded, in which case producers block
//! (or fail fast with [`try_push`](PacketQueue::try_push)) while it is full.
//!
//! Closing is the only shutdown signal: it wakes every blocked producer and
//! consumer, refuses further pushes, and lets consumers drain what is left
//! before they see [`QueueError::Closed`].

use mavtables_core::error::QueueError;
use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::time::{Duration, Instant};

/// Packet waiting in a [`PacketQueue`].
#[derive(Debug, Clone)]
pub struct QueuedPacket<P> {
    packet: P,
    priority: i32,
    sequence: u64,
}

impl<P> QueuedPacket<P> {
    pub fn new(packet: P, priority: i32, sequence: u64) -> Self {
        Self {
            packet,
            priority,
            sequence,
        }
    }

    pub fn packet(&self) -> &P {
        &self.packet
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn into_packet(self) -> P {
        self.packet
    }
}

impl<P> PartialEq for QueuedPacket<P> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<P> Eq for QueuedPacket<P> {}

impl<P> PartialOrd for QueuedPacket<P> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<P> Ord for QueuedPacket<P> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority first, then earlier sequence
        match self.priority.cmp(&other.priority) {
            Ordering::Equal => other.sequence.cmp(&self.sequence),
            other => other,
        }
    }
}

struct State<P> {
    heap: BinaryHeap<QueuedPacket<P>>,
    next_sequence: u64,
    closed: bool,
}

type PushCallback = Box<dyn Fn() + Send + Sync>;

/// Thread-safe, closeable priority queue.
pub struct PacketQueue<P> {
    state: Mutex<State<P>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: Option<usize>,
    on_push: Option<PushCallback>,
}

impl<P> PacketQueue<P> {
    /// Unbounded queue.
    pub fn new() -> Self {
        Self::with_capacity(None)
    }

    /// Queue holding at most `capacity` packets.
    pub fn bounded(capacity: usize) -> Self {
        Self::with_capacity(Some(capacity))
    }

    /// Bounded when `capacity` is set. A capacity of zero is raised to one,
    /// since no push could ever complete otherwise.
    pub fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            state: Mutex::new(State {
                heap: BinaryHeap::new(),
                next_sequence: 0,
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity: capacity.map(|capacity| capacity.max(1)),
            on_push: None,
        }
    }

    /// Run `callback` after every successful push, outside the queue lock.
    pub fn with_push_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_push = Some(Box::new(callback));
        self
    }

    fn is_full(&self, state: &State<P>) -> bool {
        self.capacity.is_some_and(|capacity| state.heap.len() >= capacity)
    }

    fn insert(&self, mut state: parking_lot::MutexGuard<'_, State<P>>, packet: P, priority: i32) {
        let sequence = state.next_sequence;
        state.next_sequence += 1;
        state.heap.push(QueuedPacket::new(packet, priority, sequence));
        drop(state);

        self.not_empty.notify_one();
        if let Some(callback) = &self.on_push {
            callback();
        }
    }

    /// Push, blocking while the queue is full.
    pub fn push(&self, packet: P, priority: i32) -> Result<(), QueueError> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(QueueError::Closed);
            }
            if !self.is_full(&state) {
                break;
            }
            self.not_full.wait(&mut state);
        }
        self.insert(state, packet, priority);
        Ok(())
    }

    /// Push, waiting at most `timeout` for room.
    ///
    /// A timeout too large to represent as a deadline waits indefinitely.
    pub fn push_timeout(&self, packet: P, priority: i32, timeout: Duration) -> Result<(), QueueError> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self.push(packet, priority);
        };
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(QueueError::Closed);
            }
            if !self.is_full(&state) {
                break;
            }
            if self.not_full.wait_until(&mut state, deadline).timed_out() {
                if state.closed {
                    return Err(QueueError::Closed);
                }
                if self.is_full(&state) {
                    return Err(QueueError::Timeout);
                }
                break;
            }
        }
        self.insert(state, packet, priority);
        Ok(())
    }

    /// Push without blocking.
    pub fn try_push(&self, packet: P, priority: i32) -> Result<(), QueueError> {
        let state = self.state.lock();
        if state.closed {
            return Err(QueueError::Closed);
        }
        if self.is_full(&state) {
            return Err(QueueError::Full);
        }
        self.insert(state, packet, priority);
        Ok(())
    }

    fn take(&self, state: &mut State<P>) -> Option<QueuedPacket<P>> {
        let item = state.heap.pop()?;
        self.not_full.notify_one();
        Some(item)
    }

    /// Pop the highest priority packet, blocking until one arrives or the
    /// queue is closed and empty.
    pub fn pop(&self) -> Result<QueuedPacket<P>, QueueError> {
        let mut state = self.state.lock();
        loop {
            if let Some(packet) = self.take(&mut state) {
                return Ok(packet);
            }
            if state.closed {
                return Err(QueueError::Closed);
            }
            self.not_empty.wait(&mut state);
        }
    }

    /// Like [`pop`](Self::pop), giving up with `Timeout` after `timeout`.
    ///
    /// A timeout too large to represent as a deadline waits indefinitely.
    pub fn pop_timeout(&self, timeout: Duration) -> Result<QueuedPacket<P>, QueueError> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self.pop();
        };
        let mut state = self.state.lock();
        loop {
            if let Some(packet) = self.take(&mut state) {
                return Ok(packet);
            }
            if state.closed {
                return Err(QueueError::Closed);
            }
            if self.not_empty.wait_until(&mut state, deadline).timed_out() {
                return match self.take(&mut state) {
                    Some(packet) => Ok(packet),
                    None if state.closed => Err(QueueError::Closed),
                    None => Err(QueueError::Timeout),
                };
            }
        }
    }

    /// Pop without blocking.
    pub fn try_pop(&self) -> Option<QueuedPacket<P>> {
        let mut state = self.state.lock();
        self.take(&mut state)
    }

    /// Close the queue. Idempotent.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        drop(state);

        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().heap.is_empty()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}

impl<P> Default for PacketQueue<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> fmt::Debug for PacketQueue<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("PacketQueue")
            .field("len", &state.heap.len())
            .field("capacity", &self.capacity)
            .field("closed", &state.closed)
            .field("on_push", &self.on_push.is_some())
            .finish()
    }
}
