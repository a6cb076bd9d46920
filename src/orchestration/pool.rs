//! Bounded worker pool with prioritized admission.
//!
//! The `WorkerPool` admits at most `max_concurrent` pooled agents at once.
//! Spawn requests beyond that wait in a priority queue (ties FIFO) and are
//! admitted one at a time as agents are released. Shutdown rejects new and
//! still-queued requests, then waits for active agents to be released.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, Notify};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::{alog_debug, alog_warn};

/// Default number of concurrently active agents.
pub const DEFAULT_MAX_CONCURRENT: usize = 5;

/// Unique identifier for a pooled agent, fresh per spawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub Uuid);

impl AgentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Active,
}

/// An admitted unit of concurrency. Lives from admission until release.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PooledAgent {
    pub id: AgentId,
    pub agent_type: String,
    pub priority: i32,
    pub status: AgentStatus,
    pub spawned_at: DateTime<Utc>,
}

/// Point-in-time view of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolMetrics {
    pub active: usize,
    pub queued: usize,
    pub max_concurrent: usize,
}

/// Events emitted by the pool for admission changes.
#[derive(Debug, Clone, PartialEq)]
pub enum PoolEvent {
    /// An agent was admitted.
    Spawned { agent_id: AgentId, agent_type: String },
    /// A request is waiting for capacity.
    Queued { agent_type: String, priority: i32 },
    /// An agent gave back its slot.
    Released { agent_id: AgentId },
    /// A request was refused because the pool is shutting down.
    Rejected { agent_type: String },
}

struct Waiter {
    priority: i32,
    seq: u64,
    agent_type: String,
    tx: oneshot::Sender<Result<PooledAgent>>,
}

impl PartialEq for Waiter {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Waiter {}

impl PartialOrd for Waiter {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Waiter {
    // Max-heap: higher priority first, then earlier arrival.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct PoolState {
    active: HashMap<AgentId, PooledAgent>,
    queue: BinaryHeap<Waiter>,
    next_seq: u64,
    closed: bool,
}

/// Bounded-concurrency admission control shared by executors.
///
/// # Example
///
/// ```ignore
/// let pool = WorkerPool::new(2);
/// let a = pool.spawn("visual", 0).await?;
/// let b = pool.spawn("audio", 0).await?;
/// assert_eq!(pool.metrics().active, 2);
/// pool.release(&a.id)?;
/// ```
pub struct WorkerPool {
    state: Mutex<PoolState>,
    max_concurrent: usize,
    idle: Notify,
    event_tx: Option<mpsc::Sender<PoolEvent>>,
}

impl WorkerPool {
    /// Create a pool admitting up to `max_concurrent` agents (at least one).
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            state: Mutex::new(PoolState::default()),
            max_concurrent: max_concurrent.max(1),
            idle: Notify::new(),
            event_tx: None,
        }
    }

    /// Emit [`PoolEvent`]s on `event_tx`. Events are dropped if the channel is full.
    pub fn with_events(mut self, event_tx: mpsc::Sender<PoolEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    /// Admit a new agent, waiting for a free slot if the pool is full.
    ///
    /// # Errors
    /// Returns `PoolClosed` if the pool is shut down before admission.
    pub async fn spawn(&self, agent_type: &str, priority: i32) -> Result<PooledAgent> {
        let (seq, rx) = {
            let mut state = self.lock();
            if state.closed {
                drop(state);
                alog_warn!("Rejected spawn of {} after shutdown", agent_type);
                self.emit(PoolEvent::Rejected {
                    agent_type: agent_type.to_string(),
                });
                return Err(Error::PoolClosed);
            }

            if state.active.len() < self.max_concurrent {
                let agent = self.admit(&mut state, agent_type, priority);
                return Ok(agent);
            }

            let (tx, rx) = oneshot::channel();
            let seq = state.next_seq;
            state.next_seq += 1;
            state.queue.push(Waiter {
                priority,
                seq,
                agent_type: agent_type.to_string(),
                tx,
            });
            alog_debug!(
                "Queued {} (priority {}), {} waiting",
                agent_type,
                priority,
                state.queue.len()
            );
            (seq, rx)
        };

        self.emit(PoolEvent::Queued {
            agent_type: agent_type.to_string(),
            priority,
        });

        let mut admission = Admission {
            pool: self,
            seq,
            rx,
            settled: false,
        };
        let outcome = (&mut admission.rx).await;
        admission.settled = true;
        match outcome {
            Ok(result) => result,
            Err(_) => Err(Error::PoolClosed),
        }
    }

    /// Admit an agent wrapped in a lease that releases it when dropped.
    pub async fn acquire(self: &Arc<Self>, agent_type: &str, priority: i32) -> Result<AgentLease> {
        let agent = self.spawn(agent_type, priority).await?;
        Ok(AgentLease {
            pool: Arc::clone(self),
            agent,
        })
    }

    /// Release an agent and hand its slot to the best queued request.
    ///
    /// # Errors
    /// Returns `AgentNotFound` if the agent is not active in this pool.
    pub fn release(&self, id: &AgentId) -> Result<()> {
        let mut state = self.lock();
        if state.active.remove(id).is_none() {
            return Err(Error::AgentNotFound { id: *id });
        }
        alog_debug!("Released agent {}", id.short());
        self.emit(PoolEvent::Released { agent_id: *id });

        while state.active.len() < self.max_concurrent {
            let Some(waiter) = state.queue.pop() else {
                break;
            };
            let agent = self.admit(&mut state, &waiter.agent_type, waiter.priority);
            if let Err(Ok(agent)) = waiter.tx.send(Ok(agent)) {
                // Requester went away while queued.
                state.active.remove(&agent.id);
            }
        }

        if state.active.is_empty() {
            self.idle.notify_waiters();
        }
        Ok(())
    }

    /// Refuse further spawns and wait until every active agent is released.
    ///
    /// Queued requests are rejected with `PoolClosed`. Active agents are
    /// never interrupted.
    pub async fn shutdown(&self) -> Result<()> {
        {
            let mut state = self.lock();
            state.closed = true;
            let rejected: Vec<Waiter> = state.queue.drain().collect();
            if !rejected.is_empty() {
                alog_warn!("Shutdown rejected {} queued spawn requests", rejected.len());
            }
            for waiter in rejected {
                self.emit(PoolEvent::Rejected {
                    agent_type: waiter.agent_type.clone(),
                });
                let _ = waiter.tx.send(Err(Error::PoolClosed));
            }
        }

        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.lock().active.is_empty() {
                break;
            }
            notified.await;
        }

        alog_debug!("Worker pool drained");
        Ok(())
    }

    pub fn metrics(&self) -> PoolMetrics {
        let state = self.lock();
        PoolMetrics {
            active: state.active.len(),
            queued: state.queue.len(),
            max_concurrent: self.max_concurrent,
        }
    }

    pub fn get(&self, id: &AgentId) -> Option<PooledAgent> {
        self.lock().active.get(id).cloned()
    }

    pub fn active_count(&self) -> usize {
        self.lock().active.len()
    }

    pub fn queued_count(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn has_capacity(&self) -> bool {
        let state = self.lock();
        !state.closed && state.active.len() < self.max_concurrent
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn admit(&self, state: &mut PoolState, agent_type: &str, priority: i32) -> PooledAgent {
        let agent = PooledAgent {
            id: AgentId::new(),
            agent_type: agent_type.to_string(),
            priority,
            status: AgentStatus::Active,
            spawned_at: Utc::now(),
        };
        state.active.insert(agent.id, agent.clone());
        alog_debug!(
            "Spawned {} agent {} ({}/{})",
            agent_type,
            agent.id.short(),
            state.active.len(),
            self.max_concurrent
        );
        self.emit(PoolEvent::Spawned {
            agent_id: agent.id,
            agent_type: agent.agent_type.clone(),
        });
        agent
    }

    fn emit(&self, event: PoolEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.try_send(event);
        }
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENT)
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let metrics = self.metrics();
        f.debug_struct("WorkerPool")
            .field("active", &metrics.active)
            .field("queued", &metrics.queued)
            .field("max_concurrent", &metrics.max_concurrent)
            .finish()
    }
}

/// Withdraws a queued request whose requester stopped waiting, and hands
/// back an agent admitted in the meantime.
struct Admission<'a> {
    pool: &'a WorkerPool,
    seq: u64,
    rx: oneshot::Receiver<Result<PooledAgent>>,
    settled: bool,
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        // Admission and rejection both send under the lock, so once the
        // waiter is gone from the queue nothing else can arrive on `rx`.
        let withdrawn = {
            let mut state = self.pool.lock();
            let before = state.queue.len();
            state.queue.retain(|waiter| waiter.seq != self.seq);
            before - state.queue.len()
        };
        if withdrawn > 0 {
            alog_debug!("Withdrew abandoned spawn request");
        }
        self.rx.close();
        if let Ok(Ok(agent)) = self.rx.try_recv() {
            let _ = self.pool.release(&agent.id);
        }
    }
}

/// A pooled agent that is released back to its pool on drop.
pub struct AgentLease {
    pool: Arc<WorkerPool>,
    agent: PooledAgent,
}

impl AgentLease {
    pub fn agent(&self) -> &PooledAgent {
        &self.agent
    }
}

impl Drop for AgentLease {
    fn drop(&mut self) {
        let _ = self.pool.release(&self.agent.id);
    }
}

impl std::fmt::Debug for AgentLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentLease")
            .field("agent", &self.agent)
            .finish()
    }
}
