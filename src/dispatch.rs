//! Background-job dispatch abstraction (Design Notes §9): the engine
//! never talks to a concrete queue directly. Production wires a bounded
//! channel drained by a worker pool; tests wire a `VecDispatcher` that
//! just records what was enqueued.

use crate::domain::{MethodKey, OwnerId};
use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub enum Job {
    FetchYearlyCalendar {
        zone_id: String,
        year: i32,
        method_key: MethodKey,
        lat: f64,
        lon: f64,
    },
    GenerateSchedule {
        owner_id: OwnerId,
        year: i32,
        month: u32,
    },
    CleanupOldCalendars {
        before_year: i32,
    },
}

#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn delay(&self, job: Job);
}

/// Production dispatcher: a bounded mpsc channel; callers push and return
/// immediately, a fixed pool of `tokio::spawn` workers drains it.
pub struct ChannelDispatcher {
    sender: mpsc::Sender<Job>,
}

impl ChannelDispatcher {
    /// Spawns `worker_count` workers draining the channel via `handler`.
    pub fn spawn<F, Fut>(worker_count: usize, buffer: usize, handler: F) -> Self
    where
        F: Fn(Job) -> Fut + Send + Sync + Clone + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel(buffer);
        let receiver = std::sync::Arc::new(tokio::sync::Mutex::new(receiver));
        for _ in 0..worker_count {
            let receiver = receiver.clone();
            let handler = handler.clone();
            tokio::spawn(async move {
                loop {
                    let job = { receiver.lock().await.recv().await };
                    match job {
                        Some(job) => handler(job).await,
                        None => break,
                    }
                }
            });
        }
        ChannelDispatcher { sender }
    }
}

#[async_trait]
impl Dispatcher for ChannelDispatcher {
    async fn delay(&self, job: Job) {
        let _ = self.sender.send(job).await;
    }
}

/// Deterministic test dispatcher: records every enqueued job without
/// running anything.
#[derive(Default)]
pub struct VecDispatcher {
    jobs: Mutex<Vec<Job>>,
}

impl VecDispatcher {
    pub fn new() -> Self {
        VecDispatcher::default()
    }

    pub fn jobs(&self) -> Vec<Job> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Dispatcher for VecDispatcher {
    async fn delay(&self, job: Job) {
        self.jobs.lock().unwrap().push(job);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn vec_dispatcher_records_jobs() {
        let dispatcher = VecDispatcher::new();
        dispatcher
            .delay(Job::CleanupOldCalendars { before_year: 2025 })
            .await;
        assert_eq!(dispatcher.jobs().len(), 1);
    }
}
