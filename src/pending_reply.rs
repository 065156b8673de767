// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! A single-shot awaitable completion keyed by correlation id, and an
//! elastic pool of them. One `PendingReply` is rented per scattered send;
//! the reply router completes it when the matching frame arrives, or the
//! scatter's linked timer faults it with `TimedOut`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::Notify;

use crate::error::BusError;
use crate::global::CorrelationId;

#[derive(Debug)]
enum State {
    Pending,
    Completed(Bytes),
    Failed(BusError),
}

/// One correlation id's worth of request/reply state. `reset` returns it to
/// `Pending` and bumps `version`, so a writer holding a stale reference from
/// a previous rental can never complete the current one: `set_result` and
/// `set_error` take the version they were handed at rental time and are a
/// no-op if `version` has since moved on (the instance was given back and
/// rented out again before the stale writer ran).
#[derive(Debug)]
pub struct PendingReply {
    correlation_id: Mutex<CorrelationId>,
    state: Mutex<State>,
    notify: Notify,
    version: Mutex<u64>,
}

impl PendingReply {
    fn new(correlation_id: CorrelationId) -> PendingReply {
        PendingReply {
            correlation_id: Mutex::new(correlation_id),
            state: Mutex::new(State::Pending),
            notify: Notify::new(),
            version: Mutex::new(0),
        }
    }

    pub fn correlation_id(&self) -> CorrelationId {
        *self.correlation_id.lock().unwrap()
    }

    pub fn is_completed(&self) -> bool {
        !matches!(*self.state.lock().unwrap(), State::Pending)
    }

    /// The rental epoch this instance is currently on. Callers capture this
    /// right after renting and pass it back to `set_result`/`set_error` so a
    /// write meant for this rental can never land on a later one.
    pub fn version(&self) -> u64 {
        *self.version.lock().unwrap()
    }

    pub fn set_result(&self, version: u64, payload: Bytes) {
        if version != self.version() {
            return;
        }
        let mut state = self.state.lock().unwrap();
        if matches!(*state, State::Pending) {
            *state = State::Completed(payload);
            self.notify.notify_waiters();
        }
    }

    pub fn set_error(&self, version: u64, err: BusError) {
        if version != self.version() {
            return;
        }
        let mut state = self.state.lock().unwrap();
        if matches!(*state, State::Pending) {
            *state = State::Failed(err);
            self.notify.notify_waiters();
        }
    }

    /// Awaits completion, returning the decoded payload or the fault.
    /// Captures its own rental epoch on entry: if the instance gets reset
    /// and rented out again while this call is still waiting (a caller bug,
    /// since the owner of a rental must not let it outlive its `wait`),
    /// it surfaces `TimedOut` instead of silently reading the next tenant's
    /// state.
    pub async fn wait(&self) -> Result<Bytes, BusError> {
        let version = self.version();
        loop {
            {
                let state = self.state.lock().unwrap();
                if self.version() != version {
                    return Err(BusError::TimedOut);
                }
                match &*state {
                    State::Pending => {}
                    State::Completed(bytes) => return Ok(bytes.clone()),
                    State::Failed(err) => return Err(clone_err(err)),
                }
            }
            self.notify.notified().await;
        }
    }

    /// Returns this instance to `Pending` for reuse by the pool. Bumps the
    /// version token so any task still awaiting the previous rental's
    /// `Notify` observes the new cycle, not a recycled one.
    fn reset(&self, correlation_id: CorrelationId) {
        *self.correlation_id.lock().unwrap() = correlation_id;
        *self.state.lock().unwrap() = State::Pending;
        *self.version.lock().unwrap() += 1;
    }
}

fn clone_err(err: &BusError) -> BusError {
    match err {
        BusError::TimedOut => BusError::TimedOut,
        BusError::NoPeers => BusError::NoPeers,
        BusError::UnknownPeer { application_name } => BusError::UnknownPeer {
            application_name: application_name.clone(),
        },
        BusError::Encode(s) => BusError::Encode(s.clone()),
        BusError::Decode(s) => BusError::Decode(s.clone()),
        BusError::Transport(e) => BusError::Transport(std::io::Error::new(e.kind(), e.to_string())),
        BusError::HandlerNotFound => BusError::HandlerNotFound,
    }
}

struct PoolInner {
    idle: VecDeque<Arc<PendingReply>>,
    live_count: usize,
    last_burst_at: Instant,
}

/// Elastic pool of `PendingReply` instances. `core_size` is kept warm at all
/// times; the pool bursts up to `burst_max` under load and a background
/// trimmer reclaims the excess `burst_ttl` after the last burst allocation.
pub struct PendingReplyPool {
    inner: Mutex<PoolInner>,
    core_size: usize,
    max_size: usize,
    burst_max: usize,
    burst_ttl: Duration,
}

impl PendingReplyPool {
    pub fn new(core_size: usize, max_size: usize, burst_max: usize, burst_ttl: Duration) -> Arc<PendingReplyPool> {
        assert!(core_size <= max_size);
        assert!(max_size <= burst_max);

        let pool = Arc::new(PendingReplyPool {
            inner: Mutex::new(PoolInner {
                idle: VecDeque::new(),
                live_count: 0,
                last_burst_at: Instant::now(),
            }),
            core_size,
            max_size,
            burst_max,
            burst_ttl,
        });

        for _ in 0..core_size {
            let mut inner = pool.inner.lock().unwrap();
            inner.idle.push_back(Arc::new(PendingReply::new(CorrelationId(0))));
            inner.live_count += 1;
        }

        pool
    }

    /// Spawns the background trimmer on the given runtime handle. Wakes
    /// every `max(burst_ttl, 250ms)`; reclaims idle instances above
    /// `max_size` once `burst_ttl` has elapsed since the last burst grant.
    pub fn spawn_trimmer(self: &Arc<Self>) {
        let pool = Arc::clone(self);
        let period = pool.burst_ttl.max(Duration::from_millis(250));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                pool.trim_once();
            }
        });
    }

    fn trim_once(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.live_count <= self.max_size {
            return;
        }
        if inner.last_burst_at.elapsed() < self.burst_ttl {
            return;
        }
        while inner.live_count > self.max_size {
            if inner.idle.pop_back().is_some() {
                inner.live_count -= 1;
            } else {
                break;
            }
        }
    }

    pub fn rent(&self, correlation_id: CorrelationId) -> Arc<PendingReply> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(item) = inner.idle.pop_front() {
            item.reset(correlation_id);
            return item;
        }
        if inner.live_count < self.burst_max {
            inner.live_count += 1;
            inner.last_burst_at = Instant::now();
            return Arc::new(PendingReply::new(correlation_id));
        }
        // Burst exhausted: spin-wait for a return. The scatter path holds
        // at most one rental per admissible peer, so in practice this only
        // triggers under pathological fan-out beyond `burst_max` peers.
        drop(inner);
        loop {
            std::thread::yield_now();
            let mut inner = self.inner.lock().unwrap();
            if let Some(item) = inner.idle.pop_front() {
                item.reset(correlation_id);
                return item;
            }
        }
    }

    pub fn give_back(&self, item: Arc<PendingReply>) {
        let mut inner = self.inner.lock().unwrap();
        inner.idle.push_back(item);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completes_and_is_observed_by_waiter() {
        let pending = Arc::new(PendingReply::new(CorrelationId(1)));
        let waiter = {
            let pending = pending.clone();
            tokio::spawn(async move { pending.wait().await })
        };
        pending.set_result(pending.version(), Bytes::from_static(b"pong"));
        let result = waiter.await.unwrap().unwrap();
        assert_eq!(result, Bytes::from_static(b"pong"));
    }

    #[test]
    fn at_most_one_completion_takes_effect() {
        let pending = PendingReply::new(CorrelationId(1));
        let version = pending.version();
        pending.set_result(version, Bytes::from_static(b"first"));
        pending.set_error(version, BusError::TimedOut);
        match &*pending.state.lock().unwrap() {
            State::Completed(b) => assert_eq!(b, &Bytes::from_static(b"first")),
            _ => panic!("second writer should not have won"),
        }
    }

    #[test]
    fn a_write_against_a_stale_version_is_ignored() {
        let pending = PendingReply::new(CorrelationId(1));
        let stale_version = pending.version();
        pending.reset(CorrelationId(2));
        pending.set_error(stale_version, BusError::TimedOut);
        assert!(!pending.is_completed());
    }

    #[test]
    fn pool_rents_and_returns_without_growing_past_core_when_idle() {
        let pool = PendingReplyPool::new(2, 4, 8, Duration::from_millis(50));
        let a = pool.rent(CorrelationId(1));
        let b = pool.rent(CorrelationId(2));
        pool.give_back(a);
        pool.give_back(b);
        assert_eq!(pool.inner.lock().unwrap().live_count, 2);
    }

    #[test]
    fn pool_bursts_above_core_size_under_load() {
        let pool = PendingReplyPool::new(1, 2, 4, Duration::from_millis(50));
        let a = pool.rent(CorrelationId(1));
        let b = pool.rent(CorrelationId(2));
        let c = pool.rent(CorrelationId(3));
        assert_eq!(pool.inner.lock().unwrap().live_count, 3);
        pool.give_back(a);
        pool.give_back(b);
        pool.give_back(c);
    }
}
