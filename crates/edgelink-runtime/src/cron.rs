//! Tick-loop cron engine.
//!
//! The collaborator behind the autoevent manager: entries carry a period
//! and a deadline, a single loop fires due entries into a bounded worker
//! pool. Two properties matter to callers:
//!
//! - **Coalescing**: an entry whose task outlives its period is skipped
//!   until the running task finishes; ticks never queue up per entry.
//! - **Pause/resume**: bulk manipulation wraps itself in [`CronEngine::pause`]
//!   and [`CronEngine::resume`] so the loop never observes a half-updated
//!   entry table.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::{RwLock, Semaphore};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

/// Work executed on every firing of an entry.
pub type Task = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Opaque handle to a scheduled entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId(u64);

struct Entry {
    every: Duration,
    next_fire: Instant,
    task: Task,
    in_flight: Arc<AtomicBool>,
}

/// Process-wide periodic task engine.
pub struct CronEngine {
    entries: RwLock<HashMap<EntryId, Entry>>,
    next_id: AtomicU64,
    running: AtomicBool,
    paused: AtomicBool,
    workers: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
    tick: Duration,
}

impl CronEngine {
    /// Engine with `max_workers` concurrent task slots, scanning deadlines
    /// every `tick`.
    pub fn new(max_workers: usize, tick: Duration) -> Arc<Self> {
        Arc::new(Self {
            entries: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            running: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            workers: Arc::new(Semaphore::new(max_workers)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            tick,
        })
    }

    /// Start the tick loop. Idempotent.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let engine = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(engine.tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if !engine.running.load(Ordering::SeqCst) {
                    break;
                }
                if engine.paused.load(Ordering::SeqCst) {
                    continue;
                }
                engine.fire_due().await;
            }
            debug!("cron engine loop exited");
        });
    }

    async fn fire_due(&self) {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        for entry in entries.values_mut() {
            if entry.next_fire > now {
                continue;
            }
            entry.next_fire = now + entry.every;
            if entry.in_flight.swap(true, Ordering::SeqCst) {
                // Previous firing still running; coalesce this one.
                continue;
            }
            let task = entry.task.clone();
            let in_flight = entry.in_flight.clone();
            let workers = self.workers.clone();
            let count = self.in_flight.clone();
            count.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                if let Ok(_permit) = workers.acquire_owned().await {
                    task().await;
                }
                in_flight.store(false, Ordering::SeqCst);
                count.fetch_sub(1, Ordering::SeqCst);
            });
        }
    }

    /// Install a new entry firing every `every`, first at `now + every`.
    pub async fn schedule(&self, every: Duration, task: Task) -> EntryId {
        let id = EntryId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let entry = Entry {
            every,
            next_fire: Instant::now() + every,
            task,
            in_flight: Arc::new(AtomicBool::new(false)),
        };
        self.entries.write().await.insert(id, entry);
        id
    }

    /// Remove an entry; a firing already in flight completes.
    pub async fn cancel(&self, id: EntryId) {
        self.entries.write().await.remove(&id);
    }

    /// Suspend firing without touching the entry table.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    /// Stop the loop. Running tasks complete but nothing re-schedules.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Wait until every in-flight task has completed.
    pub async fn drain(&self) {
        while self.in_flight.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    pub async fn entry_count(&self) -> usize {
        self.entries.read().await.len()
    }
}
