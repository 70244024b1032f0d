// SPDX-FileCopyrightText: © 2025 PackKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! A task-safe producer/consumer queue with monotonic element positions.
//!
//! Besides the standard `push`/`pop`, the queue supports peeking at an
//! absolute position: `peek(pos)` waits until the element at `pos` has been
//! produced. As a side effect of peeking, the head slides forward so `pos`
//! sits near the center of the capacity window, which is how long key
//! rotation runs stay in bounded memory.
//!
//! State lives under a `std::sync::Mutex` that is never held across an
//! await; waiters subscribe to a `watch` version channel *before* checking
//! their predicate, so wakeups cannot be lost.

use crate::error::{PackKitError, Result};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Capacity value meaning "no capacity limit".
pub const UNLIMITED_CAPACITY: usize = 0;

struct QueueState<T> {
    head_pos: u64,
    q: VecDeque<T>,
    stop_requested: bool,
}

pub struct ProducerConsumerQueue<T> {
    /// Maximum number of elements; zero means unlimited.
    capacity: usize,
    state: Mutex<QueueState<T>>,
    changed: watch::Sender<u64>,
}

impl<T: Clone> ProducerConsumerQueue<T> {
    /// Create a queue starting from position 0.
    pub fn new(capacity: usize) -> Self {
        Self::with_starting_pos(capacity, 0)
    }

    /// Create a queue whose head starts at `starting_pos`.
    pub fn with_starting_pos(capacity: usize, starting_pos: u64) -> Self {
        let (changed, _) = watch::channel(0);
        Self {
            capacity,
            state: Mutex::new(QueueState {
                head_pos: starting_pos,
                q: VecDeque::new(),
                stop_requested: false,
            }),
            changed,
        }
    }

    /// Push an element to the back of the queue, waiting for spare capacity.
    ///
    /// # Errors
    ///
    /// `Stopped` if [`stop`](Self::stop) has been called, `TimedOut` when
    /// the deadline expires. `None` waits indefinitely.
    pub async fn push(&self, element: T, timeout: Option<Duration>) -> Result<()> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            let mut rx = self.changed.subscribe();
            {
                let mut state = self.lock();
                if state.stop_requested {
                    return Err(PackKitError::Stopped);
                }
                if self.capacity == UNLIMITED_CAPACITY || state.q.len() < self.capacity {
                    state.q.push_back(element);
                    drop(state);
                    self.bump();
                    return Ok(());
                }
            }
            self.wait(&mut rx, deadline, "pushing").await?;
        }
    }

    /// Pop the element at the front of the queue, waiting for one to exist.
    ///
    /// A stopped queue still drains: `Stopped` is only returned once the
    /// queue is stopped *and* empty.
    pub async fn pop(&self, timeout: Option<Duration>) -> Result<T> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            let mut rx = self.changed.subscribe();
            {
                let mut state = self.lock();
                if let Some(element) = state.q.pop_front() {
                    state.head_pos += 1;
                    drop(state);
                    self.bump();
                    return Ok(element);
                }
                if state.stop_requested {
                    return Err(PackKitError::Stopped);
                }
            }
            self.wait(&mut rx, deadline, "popping").await?;
        }
    }

    /// Peek at the element at absolute position `pos`, waiting until it has
    /// been produced. Elements before `pos - capacity / 2` are discarded as
    /// a side effect, keeping `pos` near the center of the window.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `pos` is below the current head, `Stopped` once
    /// the queue is stopped and `pos` is out of range, `TimedOut` on
    /// deadline expiry.
    pub async fn peek(&self, pos: u64, timeout: Option<Duration>) -> Result<T> {
        let deadline = timeout.map(|t| Instant::now() + t);
        {
            let state = self.lock();
            if pos < state.head_pos {
                return Err(PackKitError::InvalidArgument(format!(
                    "pos ({pos}) is too small; head is at {}.",
                    state.head_pos
                )));
            }
        }
        loop {
            let mut rx = self.changed.subscribe();
            {
                let mut state = self.lock();
                let slid = Self::slide_head_on_center(&mut state, pos, self.capacity);
                if pos < state.head_pos + state.q.len() as u64 {
                    let element = state.q[(pos - state.head_pos) as usize].clone();
                    drop(state);
                    if slid {
                        self.bump();
                    }
                    return Ok(element);
                }
                if state.stop_requested {
                    return Err(PackKitError::Stopped);
                }
                drop(state);
                if slid {
                    self.bump();
                }
            }
            self.wait(&mut rx, deadline, "peeking").await?;
        }
    }

    /// Terminate `pop` and `peek` once the queue drains entirely, and
    /// terminate all waiting and future `push` calls immediately. `stop`
    /// cannot stall.
    pub fn stop(&self) {
        self.lock().stop_requested = true;
        self.bump();
    }

    pub fn is_empty(&self) -> bool {
        self.lock().q.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().q.len()
    }

    /// Position of the head element. Meaningless while the queue is empty.
    pub fn head_pos(&self) -> u64 {
        self.lock().head_pos
    }

    /// Position of the tail element. Meaningless while the queue is empty.
    pub fn tail_pos(&self) -> u64 {
        let state = self.lock();
        (state.head_pos + state.q.len() as u64).saturating_sub(1)
    }

    pub fn stopped(&self) -> bool {
        self.lock().stop_requested
    }

    // Poisoning can only happen on a panicked holder, which is already a
    // programmer error.
    #[allow(clippy::unwrap_used)]
    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap()
    }

    fn bump(&self) {
        self.changed.send_modify(|version| *version = version.wrapping_add(1));
    }

    /// Returns true if the head moved (capacity was freed).
    fn slide_head_on_center(state: &mut QueueState<T>, pos: u64, capacity: usize) -> bool {
        let mut slid = false;
        if capacity != UNLIMITED_CAPACITY {
            while !state.q.is_empty() && pos > state.head_pos + (capacity / 2) as u64 {
                state.head_pos += 1;
                state.q.pop_front();
                slid = true;
            }
        }
        slid
    }

    async fn wait(
        &self,
        rx: &mut watch::Receiver<u64>,
        deadline: Option<Instant>,
        operation: &str,
    ) -> Result<()> {
        match deadline {
            Some(deadline) => tokio::select! {
                changed = rx.changed() => {
                    // The sender half lives as long as `self`.
                    changed.map_err(|_| PackKitError::Stopped)
                },
                () = tokio::time::sleep_until(deadline) => {
                    Err(PackKitError::TimedOut(format!("time out on {operation}")))
                },
            },
            None => rx.changed().await.map_err(|_| PackKitError::Stopped),
        }
    }
}
