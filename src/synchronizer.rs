//! A background synchronizer that keeps split storage up to date with the server.
//!
//! Each cycle asks the fetcher for changes since the storage's change number and applies them
//! until the server reports no further changes. A failing fetch stops the synchronizer; it stays
//! stopped until [`SplitSynchronizer::start`] is called again.
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{Receiver, RecvTimeoutError, SyncSender},
        Arc, Condvar, Mutex,
    },
    time::Duration,
};

use rand::{thread_rng, Rng};

use crate::{
    fetcher::SplitChangeFetcher,
    segments::SegmentProvider,
    splits::{Split, SplitChanges, Status, TryParse},
    storage::{SplitStorage, SplitUpdate},
    Error, Result,
};

/// Configuration for [`SplitSynchronizer`].
// Not implementing `Copy` as we may add non-copyable fields in the future.
#[derive(Debug, Clone)]
pub struct SplitSynchronizerConfig {
    /// Interval to wait between synchronization cycles.
    ///
    /// Defaults to [`SplitSynchronizerConfig::DEFAULT_INTERVAL`].
    pub interval: Duration,
    /// Wait a random duration in `[interval / 2, interval)` (but no less than
    /// [`SplitSynchronizerConfig::MIN_RANDOMIZED_INTERVAL`]) between cycles. This helps to avoid
    /// multiple server instances synchronizing and producing spiky network load.
    ///
    /// Defaults to `true`.
    pub randomize_interval: bool,
    /// Keep fetching within a cycle until the server reports no further changes. If `false`, a
    /// cycle performs a single fetch.
    ///
    /// Defaults to `true`.
    pub greedy: bool,
}

impl SplitSynchronizerConfig {
    /// Default value for [`SplitSynchronizerConfig::interval`].
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);
    /// Lower bound of a randomized interval.
    pub const MIN_RANDOMIZED_INTERVAL: Duration = Duration::from_secs(5);

    /// Create a new `SplitSynchronizerConfig` using default configuration.
    pub fn new() -> SplitSynchronizerConfig {
        SplitSynchronizerConfig::default()
    }

    /// Update interval with `interval`.
    pub fn with_interval(mut self, interval: Duration) -> SplitSynchronizerConfig {
        self.interval = interval;
        self
    }

    /// Enable or disable interval randomization.
    pub fn with_randomized_interval(mut self, randomize: bool) -> SplitSynchronizerConfig {
        self.randomize_interval = randomize;
        self
    }

    /// Enable or disable greedy fetching.
    pub fn with_greedy(mut self, greedy: bool) -> SplitSynchronizerConfig {
        self.greedy = greedy;
        self
    }

    fn next_interval(&self) -> Duration {
        if self.randomize_interval {
            randomize(self.interval)
        } else {
            self.interval
        }
    }
}

impl Default for SplitSynchronizerConfig {
    fn default() -> SplitSynchronizerConfig {
        SplitSynchronizerConfig {
            interval: SplitSynchronizerConfig::DEFAULT_INTERVAL,
            randomize_interval: true,
            greedy: true,
        }
    }
}

/// Keeps a [`SplitStorage`] synchronized with the server on a background thread.
pub struct SplitSynchronizer {
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
}

struct Shared {
    fetcher: Mutex<Box<dyn SplitChangeFetcher>>,
    storage: Arc<dyn SplitStorage>,
    segments: Arc<dyn SegmentProvider>,
    config: SplitSynchronizerConfig,
    running: AtomicBool,
    /// Serializes `start` with a failing worker giving up `running`.
    lifecycle: Mutex<()>,
    /// Holds `None` until the first cycle finishes. Holds `Some(Ok(()))` once a cycle succeeded,
    /// `Some(Err(...))` if the synchronizer stopped before succeeding.
    ready: (Mutex<Option<Result<()>>>, Condvar),
}

struct Worker {
    join_handle: std::thread::JoinHandle<()>,
    /// Used to send a stop command to the worker thread.
    stop_sender: SyncSender<()>,
    /// Checked between greedy fetches so that a stop request ends the cycle early.
    stopped: Arc<AtomicBool>,
}

impl Worker {
    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        // Error means that the receiver was dropped (thread exited) or the channel buffer is
        // full because a stop command has been sent already. Both can be ignored.
        let _ = self.stop_sender.try_send(());
    }
}

impl SplitSynchronizer {
    /// Create a stopped synchronizer.
    pub fn new(
        fetcher: Box<dyn SplitChangeFetcher>,
        storage: Arc<dyn SplitStorage>,
        segments: Arc<dyn SegmentProvider>,
        config: SplitSynchronizerConfig,
    ) -> SplitSynchronizer {
        SplitSynchronizer {
            shared: Arc::new(Shared {
                fetcher: Mutex::new(fetcher),
                storage,
                segments,
                config,
                running: AtomicBool::new(false),
                lifecycle: Mutex::new(()),
                ready: (Mutex::new(None), Condvar::new()),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Start the background thread. The first cycle runs immediately, or after one interval if
    /// `delayed` is true. Does nothing if the synchronizer is already running.
    ///
    /// # Errors
    ///
    /// - IO Error if the thread failed to start.
    pub fn start(&self, delayed: bool) -> Result<()> {
        let mut worker = self
            .worker
            .lock()
            .map_err(|_| Error::SynchronizerPanicked)?;
        let _lifecycle = self
            .shared
            .lifecycle
            .lock()
            .map_err(|_| Error::SynchronizerPanicked)?;

        if self.shared.running.swap(true, Ordering::SeqCst) {
            log::debug!(target: "splitio", "synchronizer is already running");
            return Ok(());
        }

        // A previous worker may still be finishing its cycle. It won't reschedule.
        if let Some(previous) = worker.take() {
            previous.stop();
        }
        self.shared.forget_failure();

        match spawn_worker(Arc::clone(&self.shared), delayed) {
            Ok(spawned) => {
                *worker = Some(spawned);
                Ok(())
            }
            Err(err) => {
                self.shared.running.store(false, Ordering::SeqCst);
                Err(Error::from(err))
            }
        }
    }

    /// Run a synchronization cycle on the calling thread.
    ///
    /// On error, the synchronizer is stopped.
    pub fn refresh(&self, block_until_ready: bool) -> Result<()> {
        let result = self
            .shared
            .cycle(block_until_ready, &AtomicBool::new(false));
        if result.is_err() {
            self.stop();
        }
        result
    }

    /// Returns `true` if the background thread is scheduled to run further cycles.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Returns `true` once a synchronization cycle has succeeded.
    pub fn is_ready(&self) -> bool {
        self.shared
            .ready
            .0
            .lock()
            .map(|ready| matches!(*ready, Some(Ok(()))))
            .unwrap_or(false)
    }

    /// Block until a synchronization cycle succeeds, the synchronizer stops with an error, or
    /// `timeout` elapses.
    ///
    /// # Errors
    ///
    /// - [`Error::ReadinessTimeout`] if `timeout` elapsed. The synchronizer keeps running.
    /// - The error that stopped the synchronizer before any cycle succeeded.
    /// - [`Error::SynchronizerPanicked`]
    pub fn block_until_ready(&self, timeout: Duration) -> Result<()> {
        let (lock, condvar) = &self.shared.ready;
        let ready = lock.lock().map_err(|_| Error::SynchronizerPanicked)?;
        let (ready, _) = condvar
            .wait_timeout_while(ready, timeout, |ready| ready.is_none())
            .map_err(|_| Error::SynchronizerPanicked)?;

        match &*ready {
            Some(result) => result.clone(),
            None => Err(Error::ReadinessTimeout),
        }
    }

    /// Stop the synchronizer.
    ///
    /// This function does not wait for the thread to actually stop. A cycle in progress is
    /// completed (greedy fetching stops after the current fetch) but no further cycle is
    /// scheduled.
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        if let Ok(worker) = self.worker.lock() {
            if let Some(worker) = worker.as_ref() {
                worker.stop();
            }
        }
    }

    /// Stop the synchronizer and block waiting for its thread to exit.
    ///
    /// # Errors
    ///
    /// - [`Error::SynchronizerPanicked`] if the thread has panicked.
    pub fn shutdown(&self) -> Result<()> {
        self.shared.running.store(false, Ordering::SeqCst);
        let worker = self
            .worker
            .lock()
            .map_err(|_| Error::SynchronizerPanicked)?
            .take();

        if let Some(worker) = worker {
            worker.stop();
            worker
                .join_handle
                .join()
                .map_err(|_| Error::SynchronizerPanicked)?;
        }
        Ok(())
    }
}

fn spawn_worker(shared: Arc<Shared>, delayed: bool) -> std::io::Result<Worker> {
    // Using `sync_channel` here as it makes `stop_sender` `Sync`. Buffer size of 1 is enough as
    // we only ever send a single stop command.
    let (stop_sender, stop_receiver) = std::sync::mpsc::sync_channel::<()>(1);
    let stopped = Arc::new(AtomicBool::new(false));

    let join_handle = {
        let stopped = Arc::clone(&stopped);
        std::thread::Builder::new()
            .name("split-synchronizer".to_owned())
            .spawn(move || {
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    shared.run(delayed, &stopped, &stop_receiver)
                }));

                // If catch_unwind returns Err, it means a panic occurred.
                if result.is_err() {
                    log::error!(target: "splitio", "synchronizer thread panicked");
                    if shared.give_up_running(&stopped) {
                        shared.set_failed(Error::SynchronizerPanicked);
                    }
                }
            })?
    };

    Ok(Worker {
        join_handle,
        stop_sender,
        stopped,
    })
}

impl Shared {
    fn run(&self, delayed: bool, stopped: &AtomicBool, stop_receiver: &Receiver<()>) {
        if delayed && self.wait(stopped, stop_receiver) {
            return;
        }

        let mut first = true;
        loop {
            if self.cycle(first, stopped).is_err() {
                return;
            }
            first = false;

            if self.wait(stopped, stop_receiver) {
                return;
            }
        }
    }

    /// Wait for the next cycle. Returns `true` if the worker should exit instead.
    fn wait(&self, stopped: &AtomicBool, stop_receiver: &Receiver<()>) -> bool {
        if stopped.load(Ordering::SeqCst) {
            return true;
        }

        match stop_receiver.recv_timeout(self.config.next_interval()) {
            Err(RecvTimeoutError::Timeout) => false,
            Ok(()) => {
                log::debug!(target: "splitio", "synchronizer thread received stop command");
                true
            }
            Err(RecvTimeoutError::Disconnected) => {
                // The synchronizer was dropped.
                log::debug!(target: "splitio", "synchronizer thread received disconnected");
                true
            }
        }
    }

    /// Run a cycle and record the outcome.
    fn cycle(&self, block_until_ready: bool, stopped: &AtomicBool) -> Result<()> {
        match self.refresh(block_until_ready, stopped) {
            Ok(()) => {
                self.set_ready();
                Ok(())
            }
            Err(err) => {
                log::warn!(target: "splitio",
                           "failed to synchronize splits, stopping synchronizer: {err}");
                if self.give_up_running(stopped) {
                    self.set_failed(err.clone());
                }
                Err(err)
            }
        }
    }

    /// Clear `running` on behalf of a worker that exits on its own. Returns `false` if the worker
    /// had already been stopped, in which case its failure is not reported.
    fn give_up_running(&self, stopped: &AtomicBool) -> bool {
        // Holding the lock keeps a concurrent `start` from handing `running` to a new worker
        // between the check and the store.
        let _lifecycle = self.lifecycle.lock();
        // A stopped worker has been replaced or stopped by the owner; `running` is not its own.
        if stopped.load(Ordering::SeqCst) {
            return false;
        }
        self.running.store(false, Ordering::SeqCst);
        true
    }

    fn refresh(&self, block_until_ready: bool, stopped: &AtomicBool) -> Result<()> {
        let mut fetcher = self
            .fetcher
            .lock()
            .map_err(|_| Error::SynchronizerPanicked)?;

        loop {
            let since = self.storage.change_number();
            let changes = fetcher.fetch(since)?;

            if since >= changes.till {
                log::trace!(target: "splitio", since; "splits are up to date");
                return Ok(());
            }

            let update = self.build_update(changes, block_until_ready);
            log::debug!(target: "splitio",
                        since,
                        till = update.change_number,
                        updated = update.puts(),
                        removed = update.removes();
                        "applying split changes");
            self.storage.apply(update);

            if !self.config.greedy || stopped.load(Ordering::SeqCst) {
                return Ok(());
            }
        }
    }

    fn build_update(&self, changes: SplitChanges, block_until_ready: bool) -> SplitUpdate {
        let mut update = SplitUpdate::new(changes.till);

        for entry in changes.splits {
            let Some(name) = entry.name().map(str::to_owned) else {
                log::warn!(target: "splitio", "skipping split change without a name");
                continue;
            };

            if matches!(&entry, TryParse::Parsed(wire) if wire.status != Status::Active) {
                update.remove(name);
                continue;
            }

            match Split::parse(entry, self.segments.as_ref(), block_until_ready) {
                Ok(split) => update.put(split),
                Err(err) => {
                    log::warn!(target: "splitio",
                               split_name = name.as_str();
                               "failed to parse split, removing it: {err}");
                    update.remove(name);
                }
            }
        }

        update
    }

    fn set_ready(&self) {
        let (lock, condvar) = &self.ready;
        if let Ok(mut ready) = lock.lock() {
            *ready = Some(Ok(()));
            condvar.notify_all();
        }
    }

    /// Record a failure unless a cycle has already succeeded.
    fn set_failed(&self, err: Error) {
        let (lock, condvar) = &self.ready;
        if let Ok(mut ready) = lock.lock() {
            if !matches!(*ready, Some(Ok(()))) {
                *ready = Some(Err(err));
                condvar.notify_all();
            }
        }
    }

    /// Let readiness waiters wait for the next attempt after a restart.
    fn forget_failure(&self) {
        if let Ok(mut ready) = self.ready.0.lock() {
            if matches!(*ready, Some(Err(_))) {
                *ready = None;
            }
        }
    }
}

/// Pick a random interval in `[interval / 2, interval)`, no less than
/// [`SplitSynchronizerConfig::MIN_RANDOMIZED_INTERVAL`].
fn randomize(interval: Duration) -> Duration {
    let low = interval / 2;
    let randomized = if low < interval {
        thread_rng().gen_range(low..interval)
    } else {
        interval
    };
    randomized.max(SplitSynchronizerConfig::MIN_RANDOMIZED_INTERVAL)
}


#[cfg(test)]
mod tests {
    use std::{
        sync::{mpsc, Arc, Mutex},
        time::Duration,
    };

    use super::{SplitSynchronizer, SplitSynchronizerConfig};
    use crate::{
        fetcher::SplitChangeFetcher,
        segments::InMemorySegmentStorage,
        splits::SplitChanges,
        storage::{InMemorySplitStorage, SplitStorage},
        Error, Result,
    };

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn changes(since: i64, till: i64, splits: serde_json::Value) -> SplitChanges {
        serde_json::from_value(serde_json::json!({"since": since, "till": till, "splits": splits}))
            .unwrap()
    }

    fn split(name: &str, status: &str, change_number: i64) -> serde_json::Value {
        serde_json::json!({
            "name": name,
            "seed": 1,
            "status": status,
            "defaultTreatment": "off",
            "changeNumber": change_number,
            "conditions": []
        })
    }

    /// Serves scripted responses keyed by `since`. Unknown `since` returns "no changes".
    fn scripted(
        responses: Vec<(i64, SplitChanges)>,
        calls: Arc<Mutex<Vec<i64>>>,
    ) -> Box<dyn SplitChangeFetcher> {
        Box::new(move |since: i64| -> Result<SplitChanges> {
            calls.lock().unwrap().push(since);
            Ok(responses
                .iter()
                .find(|(s, _)| *s == since)
                .map(|(_, c)| c.clone())
                .unwrap_or_else(|| changes(since, since, serde_json::json!([]))))
        })
    }

    fn synchronizer(
        fetcher: Box<dyn SplitChangeFetcher>,
        config: SplitSynchronizerConfig,
    ) -> (SplitSynchronizer, Arc<InMemorySplitStorage>) {
        let storage = Arc::new(InMemorySplitStorage::new());
        let synchronizer = SplitSynchronizer::new(
            fetcher,
            storage.clone(),
            Arc::new(InMemorySegmentStorage::new()),
            config,
        );
        (synchronizer, storage)
    }

    #[test]
    fn greedy_refresh_fetches_until_caught_up() {
        init();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let (synchronizer, storage) = synchronizer(
            scripted(
                vec![
                    (-1, changes(-1, 10, serde_json::json!([split("a", "ACTIVE", 10)]))),
                    (10, changes(10, 20, serde_json::json!([split("b", "ACTIVE", 20)]))),
                ],
                calls.clone(),
            ),
            SplitSynchronizerConfig::new(),
        );

        synchronizer.refresh(true).unwrap();

        assert_eq!(*calls.lock().unwrap(), vec![-1, 10, 20]);
        assert_eq!(storage.change_number(), 20);
        assert!(storage.get("a").is_some());
        assert!(storage.get("b").is_some());
        assert!(synchronizer.is_ready());
    }

    #[test]
    fn non_greedy_refresh_fetches_once() {
        init();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let (synchronizer, storage) = synchronizer(
            scripted(
                vec![
                    (-1, changes(-1, 10, serde_json::json!([]))),
                    (10, changes(10, 20, serde_json::json!([]))),
                ],
                calls.clone(),
            ),
            SplitSynchronizerConfig::new().with_greedy(false),
        );

        synchronizer.refresh(false).unwrap();
        assert_eq!(*calls.lock().unwrap(), vec![-1]);
        assert_eq!(storage.change_number(), 10);
    }

    #[test]
    fn archived_and_unparseable_splits_are_removed() {
        init();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let (synchronizer, storage) = synchronizer(
            scripted(
                vec![
                    (
                        -1,
                        changes(
                            -1,
                            10,
                            serde_json::json!([split("a", "ACTIVE", 10), split("b", "ACTIVE", 10)]),
                        ),
                    ),
                    (
                        10,
                        changes(
                            10,
                            20,
                            serde_json::json!([
                                split("a", "ARCHIVED", 20),
                                {"name": "b", "status": "ACTIVE", "seed": "not a number"}
                            ]),
                        ),
                    ),
                ],
                calls,
            ),
            SplitSynchronizerConfig::new(),
        );

        synchronizer.refresh(false).unwrap();

        assert!(storage.get("a").is_none());
        assert!(storage.get("b").is_none());
        assert_eq!(storage.change_number(), 20);
    }

    #[test]
    fn failing_refresh_stops_and_reports() {
        init();
        let (synchronizer, storage) = synchronizer(
            Box::new(|_since: i64| -> Result<SplitChanges> { Err(Error::Unauthorized) }),
            SplitSynchronizerConfig::new(),
        );

        assert!(matches!(synchronizer.refresh(false), Err(Error::Unauthorized)));
        assert!(!synchronizer.is_running());
        assert!(!synchronizer.is_ready());
        assert_eq!(storage.change_number(), -1);
        assert!(matches!(
            synchronizer.block_until_ready(Duration::from_millis(10)),
            Err(Error::Unauthorized)
        ));
    }

    #[test]
    fn block_until_ready_times_out_while_running() {
        init();
        let (synchronizer, _storage) = synchronizer(
            Box::new(|since: i64| -> Result<SplitChanges> {
                Ok(changes(since, since + 1, serde_json::json!([])))
            }),
            SplitSynchronizerConfig::new().with_interval(Duration::from_secs(60)),
        );

        // Delayed start: no cycle within the timeout.
        synchronizer.start(true).unwrap();
        assert!(matches!(
            synchronizer.block_until_ready(Duration::from_millis(20)),
            Err(Error::ReadinessTimeout)
        ));
        assert!(synchronizer.is_running());

        synchronizer.shutdown().unwrap();
        assert!(!synchronizer.is_running());
    }

    #[test]
    fn start_is_idempotent_and_restartable() {
        init();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let (synchronizer, _storage) = synchronizer(
            scripted(vec![(-1, changes(-1, 5, serde_json::json!([])))], calls.clone()),
            SplitSynchronizerConfig::new()
                .with_interval(Duration::from_secs(60))
                .with_randomized_interval(false),
        );

        synchronizer.start(false).unwrap();
        synchronizer.start(false).unwrap();
        synchronizer
            .block_until_ready(Duration::from_secs(5))
            .unwrap();
        synchronizer.shutdown().unwrap();

        // One worker, one cycle: fetch from -1, then confirm caught up at 5.
        assert_eq!(*calls.lock().unwrap(), vec![-1, 5]);

        synchronizer.start(false).unwrap();
        assert!(synchronizer.is_running());
        synchronizer.shutdown().unwrap();
    }

    /// A fetcher whose first call blocks until released. Reports entering it on `entered`.
    fn gated(
        first: Result<SplitChanges>,
        calls: Arc<Mutex<Vec<i64>>>,
    ) -> (Box<dyn SplitChangeFetcher>, mpsc::Receiver<()>, mpsc::SyncSender<()>) {
        let (entered_sender, entered) = mpsc::sync_channel(1);
        let (release, release_receiver) = mpsc::sync_channel(1);
        let mut first = Some(first);
        let fetcher = move |since: i64| -> Result<SplitChanges> {
            calls.lock().unwrap().push(since);
            match first.take() {
                Some(result) => {
                    let _ = entered_sender.send(());
                    let _ = release_receiver.recv();
                    result
                }
                None => Ok(changes(since, since, serde_json::json!([]))),
            }
        };
        (Box::new(fetcher), entered, release)
    }

    #[test]
    fn stop_during_cycle_finishes_it_without_rescheduling() {
        init();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let (fetcher, entered, release) = gated(
            Ok(changes(-1, 5, serde_json::json!([split("a", "ACTIVE", 5)]))),
            calls.clone(),
        );
        let (synchronizer, storage) = synchronizer(
            fetcher,
            SplitSynchronizerConfig::new()
                .with_interval(Duration::from_millis(5))
                .with_randomized_interval(false),
        );

        synchronizer.start(false).unwrap();
        entered.recv_timeout(Duration::from_secs(5)).unwrap();
        synchronizer.stop();
        release.send(()).unwrap();

        // Several intervals pass; a rescheduled cycle would fetch again.
        synchronizer
            .block_until_ready(Duration::from_secs(5))
            .unwrap();
        std::thread::sleep(Duration::from_millis(50));

        assert_eq!(*calls.lock().unwrap(), vec![-1]);
        assert_eq!(storage.change_number(), 5);
        assert!(!synchronizer.is_running());
        synchronizer.shutdown().unwrap();
    }

    #[test]
    fn failing_replaced_worker_does_not_stop_its_successor() {
        init();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let (fetcher, entered, release) = gated(Err(Error::Unauthorized), calls.clone());
        let (synchronizer, _storage) = synchronizer(
            fetcher,
            SplitSynchronizerConfig::new()
                .with_interval(Duration::from_secs(60))
                .with_randomized_interval(false),
        );

        synchronizer.start(false).unwrap();
        entered.recv_timeout(Duration::from_secs(5)).unwrap();

        // Restart while the first worker's fetch is in flight, then let that fetch fail.
        synchronizer.stop();
        synchronizer.start(false).unwrap();
        release.send(()).unwrap();

        synchronizer
            .block_until_ready(Duration::from_secs(5))
            .unwrap();
        assert!(synchronizer.is_running());
        synchronizer.shutdown().unwrap();
    }
}
