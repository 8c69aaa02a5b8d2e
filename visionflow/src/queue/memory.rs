//! Tokio-native in-memory task queue.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::core::Task;
use crate::errors::QueueError;

use super::{DepthStatus, Leased, QueueConfig, TaskQueue};

struct InFlightLease {
    task: Task,
    deadline: Instant,
}

struct Inner {
    ready: VecDeque<Task>,
    delayed: Vec<(Instant, Task)>,
    in_flight: HashMap<u64, InFlightLease>,
    dead: Vec<Task>,
    next_handle: u64,
    closed: bool,
}

impl Inner {
    fn backlog(&self) -> usize {
        self.ready.len() + self.delayed.len()
    }

    /// Promotes due delayed tasks and reclaims expired leases.
    fn promote(&mut self, now: Instant, max_attempts: u32) {
        let mut due = Vec::new();
        self.delayed.retain(|(at, task)| {
            if *at <= now {
                due.push(task.clone());
                false
            } else {
                true
            }
        });
        self.ready.extend(due);

        let expired: Vec<u64> = self
            .in_flight
            .iter()
            .filter(|(_, lease)| lease.deadline <= now)
            .map(|(handle, _)| *handle)
            .collect();

        for handle in expired {
            if let Some(lease) = self.in_flight.remove(&handle) {
                let redelivered = lease.task.redelivered();
                warn!(task = %lease.task, "lease expired, redelivering");
                if redelivered.attempt >= max_attempts {
                    self.dead.push(redelivered);
                } else {
                    self.ready.push_back(redelivered);
                }
            }
        }
    }

    /// The next instant at which promotion could make progress.
    fn next_event(&self) -> Option<Instant> {
        let delayed = self.delayed.iter().map(|(at, _)| *at).min();
        let leases = self.in_flight.values().map(|l| l.deadline).min();
        match (delayed, leases) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        }
    }
}

/// In-memory [`TaskQueue`] with delayed redelivery, lease timeouts, and a
/// dead-letter list.
pub struct MemoryTaskQueue {
    config: QueueConfig,
    inner: Mutex<Inner>,
    notify: Notify,
}

impl MemoryTaskQueue {
    /// Creates a queue with the given config.
    #[must_use]
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                ready: VecDeque::new(),
                delayed: Vec::new(),
                in_flight: HashMap::new(),
                dead: Vec::new(),
                next_handle: 1,
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Creates a queue with default config.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(QueueConfig::default())
    }

    /// Closes the queue: further enqueues fail and waiting leases return.
    pub fn close(&self) {
        self.inner.lock().closed = true;
        self.notify.notify_waiters();
    }

    /// Returns true once the queue is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Number of leases currently held by workers.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inner.lock().in_flight.len()
    }

    fn try_lease(&self) -> Option<Leased> {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        inner.promote(now, self.config.max_attempts);

        let task = inner.ready.pop_front()?;
        let handle = inner.next_handle;
        inner.next_handle += 1;
        inner.in_flight.insert(
            handle,
            InFlightLease {
                task: task.clone(),
                deadline: now + self.config.lease_timeout(),
            },
        );
        Some(Leased { task, handle })
    }
}

#[async_trait]
impl TaskQueue for MemoryTaskQueue {
    async fn enqueue(&self, task: Task) -> Result<(), QueueError> {
        let backlog = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return Err(QueueError::Closed);
            }
            debug!(task = %task, "enqueued");
            inner.ready.push_back(task);
            inner.backlog()
        };

        if backlog == self.config.critical_threshold {
            warn!(backlog, "queue backlog reached critical threshold");
        } else if backlog == self.config.warning_threshold {
            warn!(backlog, "queue backlog reached warning threshold");
        }

        self.notify.notify_waiters();
        Ok(())
    }

    async fn lease(&self) -> Result<Option<Leased>, QueueError> {
        Ok(self.try_lease())
    }

    async fn lease_wait(&self, timeout: Duration) -> Result<Option<Leased>, QueueError> {
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(leased) = self.try_lease() {
                return Ok(Some(leased));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            // Sleep until something could change: an enqueue notification,
            // the next delayed task or lease expiry, or the caller deadline.
            let mut wait = deadline - now;
            {
                let inner = self.inner.lock();
                if inner.closed {
                    return Ok(None);
                }
                if let Some(at) = inner.next_event() {
                    let until_event = at.saturating_duration_since(now);
                    if until_event < wait {
                        wait = until_event.max(Duration::from_millis(1));
                    }
                }
            }

            tokio::select! {
                () = self.notify.notified() => {}
                () = tokio::time::sleep(wait) => {}
            }
        }
    }

    async fn ack(&self, handle: u64) -> Result<(), QueueError> {
        let mut inner = self.inner.lock();
        inner
            .in_flight
            .remove(&handle)
            .map(|_| ())
            .ok_or(QueueError::UnknownLease { handle })
    }

    async fn nack(&self, handle: u64) -> Result<(), QueueError> {
        let mut inner = self.inner.lock();
        let lease = inner
            .in_flight
            .remove(&handle)
            .ok_or(QueueError::UnknownLease { handle })?;

        let redelivered = lease.task.redelivered();
        if redelivered.attempt >= self.config.max_attempts {
            warn!(task = %redelivered, "attempts exhausted, dead-lettering");
            inner.dead.push(redelivered);
        } else {
            let delay = self.config.retry.delay_for_attempt(redelivered.attempt);
            debug!(task = %redelivered, delay_ms = delay.as_millis() as u64, "scheduling redelivery");
            inner.delayed.push((Instant::now() + delay, redelivered));
        }
        drop(inner);

        self.notify.notify_waiters();
        Ok(())
    }

    fn depth(&self) -> usize {
        self.inner.lock().backlog()
    }

    fn depth_status(&self) -> DepthStatus {
        let backlog = self.depth();
        if backlog >= self.config.critical_threshold {
            DepthStatus::Critical
        } else if backlog >= self.config.warning_threshold {
            DepthStatus::Warning
        } else {
            DepthStatus::Normal
        }
    }

    async fn drain_dead_letters(&self) -> Vec<Task> {
        std::mem::take(&mut self.inner.lock().dead)
    }
}
