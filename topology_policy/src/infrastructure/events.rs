// /////////////////////////////////////////////////////////////////////////////
// Topology Policy
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Event channel and cold-start timers
//!
//! The engine is single-threaded cooperative (§5); the only scheduled
//! asynchrony is the cold-start timer. Timer firings never touch grant or
//! supply state directly — they post an [`EngineEvent`] back through the
//! channel the engine task owns, the same "notify, don't mutate" shape the
//! bootstrap crate's `ShutdownCoordinator` uses for cancellation.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use topology_policy_domain::value_objects::ContainerId;
use topology_policy_domain::ColdStartTimerHandle;

#[derive(Debug, Clone)]
pub enum EngineEvent {
    ContainerStarted(ContainerId),
    ColdStartDone(ContainerId, ColdStartTimerHandle),
}

/// Shared stop flag the timer callback checks before dispatching (§5: "If
/// `stopped` is set, the callback is a silent no-op").
#[derive(Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Spawns cold-start timers and hands back an opaque handle the domain
/// crate stores on the `Grant` (it has no `tokio` dependency of its own).
pub struct ColdStartScheduler {
    next_handle: AtomicU64,
    events: mpsc::UnboundedSender<EngineEvent>,
    stop: StopFlag,
}

impl ColdStartScheduler {
    pub fn new(events: mpsc::UnboundedSender<EngineEvent>, stop: StopFlag) -> Self {
        Self {
            next_handle: AtomicU64::new(1),
            events,
            stop,
        }
    }

    /// Starts a one-shot timer of `duration` that posts `ColdStartDone`
    /// for `container_id` (§4.6 "Cold start" step 3).
    pub fn schedule(&self, container_id: ContainerId, duration: Duration) -> ColdStartTimerHandle {
        let handle = ColdStartTimerHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        let events = self.events.clone();
        let stop = self.stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            if stop.is_stopped() {
                return;
            }
            let _ = events.send(EngineEvent::ColdStartDone(container_id, handle));
        });
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fires_cold_start_done_after_duration() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let scheduler = ColdStartScheduler::new(tx, StopFlag::new());
        scheduler.schedule(ContainerId("c1".to_string()), Duration::from_millis(5));
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, EngineEvent::ColdStartDone(_, _)));
    }

    #[tokio::test]
    async fn stopped_scheduler_suppresses_firing() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let stop = StopFlag::new();
        let scheduler = ColdStartScheduler::new(tx, stop.clone());
        scheduler.schedule(ContainerId("c1".to_string()), Duration::from_millis(5));
        stop.stop();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
    }
}
