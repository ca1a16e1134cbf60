//! Bounded asynchronous application of index updates.
//!
//! Eventually consistent indexes route their mutations through an
//! [`AsyncUpdateSink`]: a counting semaphore gates admission to an
//! unbounded work queue drained by a dedicated worker thread. The enqueuing
//! caller blocks only until a permit is available, never on the update's
//! application. Each permit is released exactly once, after the update has
//! been applied or has poisoned its index.
//!
//! [`await_drain`](UpdateSink::await_drain) schedules a marker task and
//! blocks until the marker has executed. The single consumer takes tasks in
//! FIFO order, so when the marker runs every previously scheduled task has
//! completed; this is the only read-after-write primitive for eventually
//! consistent indexes.
//!
//! Strictly consistent indexes use [`SyncUpdateSink`], which applies
//! updates on the calling thread and whose drain is a no-op.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::warn;
use parking_lot::{Condvar, Mutex};

use crate::analysis::Analyzer;
use crate::codec::EntityDocument;
use crate::data::EntityId;
use crate::error::{Result, SorrelError};
use crate::index::partitioned::PartitionedIndex;

/// One index mutation.
#[derive(Debug, Clone)]
pub enum IndexUpdate {
    Upsert(EntityDocument),
    Remove(EntityId),
}

/// The writer updates are applied through: a partitioned index plus the
/// analyzer its documents go through.
#[derive(Clone)]
pub struct IndexUpdater {
    pub index: Arc<PartitionedIndex>,
    pub analyzer: Arc<dyn Analyzer>,
}

impl std::fmt::Debug for IndexUpdater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexUpdater")
            .field("index", &self.index.name())
            .finish()
    }
}

impl IndexUpdater {
    pub fn new(index: Arc<PartitionedIndex>, analyzer: Arc<dyn Analyzer>) -> Self {
        IndexUpdater { index, analyzer }
    }

    fn apply(&self, update: &IndexUpdate) -> Result<()> {
        match update {
            IndexUpdate::Upsert(document) => self.index.write(document, self.analyzer.as_ref()),
            IndexUpdate::Remove(entity_id) => self.index.remove(*entity_id),
        }
    }

    fn close(&self) -> Result<()> {
        self.index.flush()
    }
}

/// Where index mutations go. Implementations decide whether application is
/// synchronous or deferred.
pub trait UpdateSink: Send + Sync + std::fmt::Debug {
    /// Schedule one update. Blocks until queue capacity is available, then
    /// returns once the update is scheduled, not once it is applied.
    fn enqueue(&self, updater: &IndexUpdater, update: IndexUpdate) -> Result<()>;

    /// Schedule a writer close (flush) the same way updates are scheduled.
    fn close_writer(&self, updater: &IndexUpdater) -> Result<()>;

    /// Block until every previously scheduled task has been applied or has
    /// poisoned its index.
    fn await_drain(&self);
}

struct Semaphore {
    permits: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    fn new(permits: usize) -> Self {
        Semaphore {
            permits: Mutex::new(permits),
            available: Condvar::new(),
        }
    }

    fn acquire(self: &Arc<Self>) -> Permit {
        let mut permits = self.permits.lock();
        while *permits == 0 {
            self.available.wait(&mut permits);
        }
        *permits -= 1;
        Permit {
            semaphore: Arc::clone(self),
        }
    }
}

/// Releases its permit exactly once, on drop. Tasks carry their permit so
/// capacity is returned whether the task succeeds, poisons its index, or is
/// rejected at scheduling.
struct Permit {
    semaphore: Arc<Semaphore>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        let mut permits = self.semaphore.permits.lock();
        *permits += 1;
        self.semaphore.available.notify_one();
    }
}

struct Latch {
    done: Mutex<bool>,
    condvar: Condvar,
}

impl Latch {
    fn new() -> Self {
        Latch {
            done: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    fn wait(&self) {
        let mut done = self.done.lock();
        while !*done {
            self.condvar.wait(&mut done);
        }
    }

    fn signal(&self) {
        *self.done.lock() = true;
        self.condvar.notify_all();
    }
}

enum Task {
    Apply {
        updater: IndexUpdater,
        update: IndexUpdate,
        _permit: Permit,
    },
    Close {
        updater: IndexUpdater,
        _permit: Permit,
    },
    Marker {
        latch: Arc<Latch>,
    },
}

/// Semaphore-gated asynchronous update sink with a dedicated worker thread.
pub struct AsyncUpdateSink {
    semaphore: Arc<Semaphore>,
    sender: Mutex<Option<Sender<Task>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for AsyncUpdateSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncUpdateSink")
            .field("permits", &*self.semaphore.permits.lock())
            .finish()
    }
}

impl AsyncUpdateSink {
    /// Create a sink admitting at most `queue_depth` outstanding tasks.
    pub fn new(queue_depth: usize) -> Self {
        let (sender, receiver) = unbounded();
        let worker = thread::Builder::new()
            .name("sorrel-index-updates".to_string())
            .spawn(move || worker_loop(receiver))
            .expect("failed to spawn index update worker");
        AsyncUpdateSink {
            semaphore: Arc::new(Semaphore::new(queue_depth)),
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        }
    }

    fn submit(&self, task: Task) -> Result<()> {
        let sender = self.sender.lock();
        let Some(sender) = sender.as_ref() else {
            return Err(SorrelError::index("update sink has been shut down"));
        };
        sender
            .send(task)
            .map_err(|_| SorrelError::index("update sink worker has shut down"))
    }

    /// Stop accepting tasks, drain the queue, and join the worker.
    pub fn shutdown(&self) {
        let sender = self.sender.lock().take();
        drop(sender);
        if let Some(worker) = self.worker.lock().take() {
            let _ = worker.join();
        }
    }
}

impl Drop for AsyncUpdateSink {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl UpdateSink for AsyncUpdateSink {
    fn enqueue(&self, updater: &IndexUpdater, update: IndexUpdate) -> Result<()> {
        let permit = self.semaphore.acquire();
        self.submit(Task::Apply {
            updater: updater.clone(),
            update,
            _permit: permit,
        })
    }

    fn close_writer(&self, updater: &IndexUpdater) -> Result<()> {
        let permit = self.semaphore.acquire();
        self.submit(Task::Close {
            updater: updater.clone(),
            _permit: permit,
        })
    }

    fn await_drain(&self) {
        let latch = Arc::new(Latch::new());
        if self
            .submit(Task::Marker {
                latch: Arc::clone(&latch),
            })
            .is_err()
        {
            // Worker gone; the queue was drained on shutdown.
            return;
        }
        latch.wait();
    }
}

fn worker_loop(receiver: Receiver<Task>) {
    for task in receiver {
        match task {
            Task::Apply {
                updater,
                update,
                _permit,
            } => {
                if let Err(e) = updater.apply(&update) {
                    warn!(
                        "update application failed for index '{}': {}",
                        updater.index.name(),
                        e
                    );
                    updater.index.mark_failed(e.to_string());
                }
            }
            Task::Close { updater, _permit } => {
                if let Err(e) = updater.close() {
                    warn!(
                        "writer close failed for index '{}': {}",
                        updater.index.name(),
                        e
                    );
                    updater.index.mark_failed(e.to_string());
                }
            }
            Task::Marker { latch } => latch.signal(),
        }
    }
}

/// Synchronous sink for strictly consistent indexes. Application errors
/// surface to the caller; draining is a no-op because nothing is deferred.
#[derive(Debug, Default)]
pub struct SyncUpdateSink;

impl SyncUpdateSink {
    pub fn new() -> Self {
        SyncUpdateSink
    }
}

impl UpdateSink for SyncUpdateSink {
    fn enqueue(&self, updater: &IndexUpdater, update: IndexUpdate) -> Result<()> {
        updater.apply(&update)
    }

    fn close_writer(&self, updater: &IndexUpdater) -> Result<()> {
        updater.close()
    }

    fn await_drain(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use crate::analysis::StandardAnalyzer;
    use crate::codec::DocumentBuffer;
    use crate::data::PropertyValue;

    fn updater(dir: &std::path::Path, partitions: usize) -> IndexUpdater {
        let index = PartitionedIndex::create("idx", dir, partitions).unwrap();
        index.set_online();
        IndexUpdater::new(index, Arc::new(StandardAnalyzer::new()))
    }

    fn upsert(entity_id: EntityId, text: &str) -> IndexUpdate {
        let mut buffer = DocumentBuffer::new();
        IndexUpdate::Upsert(
            buffer
                .encode(
                    entity_id,
                    &["body".to_string()],
                    &[Some(PropertyValue::Text(text.to_string()))],
                )
                .clone(),
        )
    }

    #[test]
    fn test_enqueue_returns_before_application() {
        let dir = tempfile::tempdir().unwrap();
        let updater = updater(dir.path(), 1);
        let sink = AsyncUpdateSink::new(16);

        sink.enqueue(&updater, upsert(1, "hello world")).unwrap();
        sink.await_drain();
        assert_eq!(updater.index.doc_count(), 1);
    }

    #[test]
    fn test_backpressure_blocks_beyond_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let updater = updater(dir.path(), 1);
        let sink = Arc::new(AsyncUpdateSink::new(2));

        // Hold a read lock on the partition so the worker stalls applying
        // the first update, keeping both permits in flight.
        let searchers = updater.index.searchers().unwrap();
        let release = Arc::new(Latch::new());
        let stall = {
            let release = Arc::clone(&release);
            let searcher = searchers.into_iter().next().unwrap();
            thread::spawn(move || {
                searcher.with_index(|_| release.wait());
            })
        };
        // Give the lock holder time to enter the closure.
        thread::sleep(Duration::from_millis(20));

        sink.enqueue(&updater, upsert(1, "one")).unwrap();
        sink.enqueue(&updater, upsert(2, "two")).unwrap();

        let third_done = Arc::new(AtomicBool::new(false));
        let blocked = {
            let sink = Arc::clone(&sink);
            let updater = updater.clone();
            let third_done = Arc::clone(&third_done);
            thread::spawn(move || {
                sink.enqueue(&updater, upsert(3, "three")).unwrap();
                third_done.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(100));
        assert!(
            !third_done.load(Ordering::SeqCst),
            "third enqueue must block while two updates are outstanding"
        );

        release.signal();
        blocked.join().unwrap();
        stall.join().unwrap();

        sink.await_drain();
        assert_eq!(updater.index.doc_count(), 3);
    }

    #[test]
    fn test_drain_observes_all_prior_updates() {
        let dir = tempfile::tempdir().unwrap();
        let updater = updater(dir.path(), 1);
        let sink = AsyncUpdateSink::new(16);

        // Stall the worker, then release it shortly after the drain starts
        // waiting, so the drain genuinely has to wait for A, B and C.
        let searchers = updater.index.searchers().unwrap();
        let release = Arc::new(Latch::new());
        let stall = {
            let release = Arc::clone(&release);
            let searcher = searchers.into_iter().next().unwrap();
            thread::spawn(move || {
                searcher.with_index(|_| release.wait());
            })
        };
        thread::sleep(Duration::from_millis(20));

        sink.enqueue(&updater, upsert(1, "update a")).unwrap();
        sink.enqueue(&updater, upsert(2, "update b")).unwrap();
        sink.enqueue(&updater, upsert(3, "update c")).unwrap();

        let releaser = {
            let release = Arc::clone(&release);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                release.signal();
            })
        };

        sink.await_drain();
        assert_eq!(updater.index.doc_count(), 3);

        releaser.join().unwrap();
        stall.join().unwrap();
    }

    #[test]
    fn test_scheduling_failure_is_synchronous_and_releases_permit() {
        let dir = tempfile::tempdir().unwrap();
        let updater = updater(dir.path(), 1);
        let sink = AsyncUpdateSink::new(1);
        sink.shutdown();

        // With capacity one, a leaked permit would deadlock the second call.
        assert!(sink.enqueue(&updater, upsert(1, "a")).is_err());
        assert!(sink.enqueue(&updater, upsert(2, "b")).is_err());
        assert!(sink.close_writer(&updater).is_err());
        sink.await_drain();
    }

    #[test]
    fn test_failed_close_poisons_index_instead_of_propagating() {
        let dir = tempfile::tempdir().unwrap();
        let updater = updater(dir.path(), 1);
        let sink = AsyncUpdateSink::new(4);

        sink.enqueue(&updater, upsert(1, "content")).unwrap();
        sink.await_drain();

        // Destroy the index directory so the scheduled flush fails.
        std::fs::remove_dir_all(updater.index.path()).unwrap();
        sink.close_writer(&updater).unwrap();
        sink.await_drain();

        let failure = updater.index.population_failure();
        assert!(failure.is_some(), "index should be marked failed");
        assert!(updater.index.remove(99).is_err());
    }

    #[test]
    fn test_sync_sink_applies_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let updater = updater(dir.path(), 1);
        let sink = SyncUpdateSink::new();

        sink.enqueue(&updater, upsert(1, "now")).unwrap();
        assert_eq!(updater.index.doc_count(), 1);
        sink.await_drain();
    }
}
