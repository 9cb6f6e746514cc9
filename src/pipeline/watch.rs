use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::{IngestError, Result};
use crate::pipeline::job::{JobSettings, StackJob};
use crate::pipeline::runner::{JobReport, StackJobRunner};
use crate::stack::{is_hidden_file, is_stack_file};

/// Per-path debounce: Pending → (settle interval with no activity) → Stable → Consumed
///
/// Only Pending paths are tracked. Taking a path as stable consumes it: it is forgotten, so
/// later writes to it are ignored and only a fresh creation makes it Pending again.
#[derive(Debug)]
pub struct DebounceTracker {
    settle: Duration,
    pending: HashMap<PathBuf, Instant>,
}

impl DebounceTracker {
    pub fn new(settle: Duration) -> Self {
        Self {
            settle,
            pending: HashMap::new(),
        }
    }

    /// A file appeared at `path`; (re)start its settle timer
    pub fn observe_created(&mut self, path: PathBuf, now: Instant) {
        self.pending.insert(path, now + self.settle);
    }

    /// Write activity on `path`. Pushes back the deadline if it is still pending.
    pub fn observe_activity(&mut self, path: &Path, now: Instant) -> bool {
        match self.pending.get_mut(path) {
            Some(deadline) => {
                *deadline = now + self.settle;
                true
            }
            None => false,
        }
    }

    pub fn forget(&mut self, path: &Path) {
        self.pending.remove(path);
    }

    /// When `path` becomes stable, if it is pending
    pub fn deadline(&self, path: &Path) -> Option<Instant> {
        self.pending.get(path).copied()
    }

    /// Earliest moment a pending path may become stable
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().min().copied()
    }

    /// Consume every settled path and return them, sorted
    pub fn take_stable(&mut self, now: Instant) -> Vec<PathBuf> {
        let mut stable: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(path, _)| path.clone())
            .collect();
        for path in &stable {
            self.pending.remove(path);
        }
        stable.sort();
        stable
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

/// Running totals for a watch session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchSummary {
    /// Jobs that wrote an output stack
    pub saved: usize,
    /// Jobs that finished but kept no frames
    pub skipped: usize,
    pub failed: usize,
}

impl WatchSummary {
    pub fn processed(&self) -> usize {
        self.saved + self.skipped + self.failed
    }

    fn record(&mut self, report: &JobReport) {
        match report.result() {
            Some(result) if result.is_skipped() => self.skipped += 1,
            Some(_) => self.saved += 1,
            None => self.failed += 1,
        }
    }
}

/// Continuous processing of stacks as they land in a folder
pub struct WatchIngestor {
    runner: Arc<StackJobRunner>,
    settings: Arc<JobSettings>,
    settle: Duration,
    max_concurrent_jobs: usize,
}

impl WatchIngestor {
    pub fn new(
        runner: Arc<StackJobRunner>,
        settings: Arc<JobSettings>,
        settle: Duration,
        max_concurrent_jobs: usize,
    ) -> Self {
        Self {
            runner,
            settings,
            settle,
            max_concurrent_jobs: max_concurrent_jobs.max(1),
        }
    }

    /// Start watching `dir`
    ///
    /// All subscription failures surface here, before any event is processed.
    pub fn subscribe<P: AsRef<Path>>(&self, dir: P) -> Result<WatchSession> {
        let dir = dir.as_ref().to_path_buf();
        let dir_str = dir.display().to_string();

        if !dir.exists() {
            return Err(IngestError::DirectoryNotFound { path: dir_str }.into());
        }
        if !dir.is_dir() {
            return Err(IngestError::NotADirectory { path: dir_str }.into());
        }

        let (sender, events) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |event: notify::Result<Event>| {
            // Receiver gone means the session ended
            let _ = sender.send(event);
        })
        .map_err(|e| IngestError::SubscriptionFailed {
            path: dir_str.clone(),
            reason: e.to_string(),
        })?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| IngestError::SubscriptionFailed {
                path: dir_str.clone(),
                reason: e.to_string(),
            })?;

        debug!("Subscribed to filesystem events in {}", dir_str);
        Ok(WatchSession {
            dir,
            watcher,
            events,
            tracker: DebounceTracker::new(self.settle),
            runner: Arc::clone(&self.runner),
            settings: Arc::clone(&self.settings),
            limiter: Arc::new(Semaphore::new(self.max_concurrent_jobs)),
        })
    }
}

/// An established folder subscription, ready to run
pub struct WatchSession {
    dir: PathBuf,
    watcher: RecommendedWatcher,
    events: mpsc::UnboundedReceiver<notify::Result<Event>>,
    tracker: DebounceTracker,
    runner: Arc<StackJobRunner>,
    settings: Arc<JobSettings>,
    limiter: Arc<Semaphore>,
}

impl WatchSession {
    pub fn directory(&self) -> &Path {
        &self.dir
    }

    /// Process new stacks until `shutdown` resolves
    ///
    /// On shutdown the subscription is dropped and paths still settling are discarded, but
    /// jobs already running are allowed to finish. Job reports are only counted; the runner
    /// has already logged each one.
    pub async fn run<F>(self, shutdown: F) -> WatchSummary
    where
        F: Future<Output = ()>,
    {
        let WatchSession {
            dir,
            watcher,
            mut events,
            mut tracker,
            runner,
            settings,
            limiter,
        } = self;

        tokio::pin!(shutdown);
        let mut jobs: JoinSet<JobReport> = JoinSet::new();
        let mut summary = WatchSummary::default();

        info!("⌛ Watching {} for new stacks", dir.display());

        loop {
            let deadline = tracker.next_deadline();

            tokio::select! {
                _ = &mut shutdown => {
                    info!("Stop requested; no longer accepting new stacks");
                    break;
                }
                received = events.recv() => match received {
                    Some(Ok(event)) => observe(&mut tracker, &settings, event, Instant::now()),
                    Some(Err(e)) => warn!("Watcher error on {}: {}", dir.display(), e),
                    None => {
                        warn!("Watch subscription on {} closed", dir.display());
                        break;
                    }
                },
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    for path in tracker.take_stable(Instant::now()) {
                        match StackJob::new(path.clone(), Arc::clone(&settings)) {
                            Some(job) => spawn_job(&mut jobs, &runner, &limiter, job),
                            None => warn!("Ignoring {:?}: no file name", path),
                        }
                    }
                }
                Some(joined) = jobs.join_next(), if !jobs.is_empty() => {
                    collect(&mut summary, joined);
                }
            }
        }

        drop(watcher);

        let abandoned = tracker.pending_count();
        if abandoned > 0 {
            info!("Discarding {} stack(s) that were still being written", abandoned);
        }
        if !jobs.is_empty() {
            info!("Waiting for {} running job(s) to finish", jobs.len());
        }
        while let Some(joined) = jobs.join_next().await {
            collect(&mut summary, joined);
        }

        info!(
            "Stopped watching {}: {} saved, {} skipped, {} failed",
            dir.display(),
            summary.saved,
            summary.skipped,
            summary.failed
        );
        summary
    }
}

fn is_candidate(settings: &JobSettings, path: &Path) -> bool {
    is_stack_file(path) && !is_hidden_file(path) && !settings.is_own_output(path)
}

fn observe(tracker: &mut DebounceTracker, settings: &JobSettings, event: Event, now: Instant) {
    let candidates = event.paths.iter().filter(|path| is_candidate(settings, path));

    match event.kind {
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            for path in candidates {
                debug!("New stack {:?}; waiting for it to settle", path);
                tracker.observe_created(path.clone(), now);
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            // paths are [from, to]
            if let Some(from) = event.paths.first() {
                tracker.forget(from);
            }
            if let Some(to) = event.paths.get(1).filter(|path| is_candidate(settings, path)) {
                tracker.observe_created(to.clone(), now);
            }
        }
        EventKind::Modify(ModifyKind::Name(_)) | EventKind::Remove(_) => {
            for path in &event.paths {
                tracker.forget(path);
            }
        }
        EventKind::Modify(_) => {
            for path in candidates {
                tracker.observe_activity(path, now);
            }
        }
        _ => {}
    }
}

fn spawn_job(
    jobs: &mut JoinSet<JobReport>,
    runner: &Arc<StackJobRunner>,
    limiter: &Arc<Semaphore>,
    job: StackJob,
) {
    let runner = Arc::clone(runner);
    let limiter = Arc::clone(limiter);
    jobs.spawn(async move {
        let _permit = limiter.acquire_owned().await.ok();
        runner.run(&job).await
    });
}

fn collect(summary: &mut WatchSummary, joined: std::result::Result<JobReport, JoinError>) {
    match joined {
        Ok(report) => summary.record(&report),
        Err(e) => {
            error!("Watch job did not complete: {}", e);
            summary.failed += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StackerError;
    use crate::pipeline::runner::{JobResult, RunnerOptions};
    use crate::testing::{write_rgb_stack, ScriptedClassifier};
    use notify::event::{CreateKind, DataChange, RemoveKind};
    use std::io::Write;
    use tempfile::tempdir;
    use tokio::sync::oneshot;

    const SETTLE: Duration = Duration::from_millis(300);

    fn settings(output_dir: &Path) -> Arc<JobSettings> {
        Arc::new(JobSettings::new("lc", 0.9, output_dir))
    }

    fn ingestor(classifier: ScriptedClassifier, output_dir: &Path, settle: Duration) -> WatchIngestor {
        let runner = StackJobRunner::new(Arc::new(classifier), RunnerOptions::default());
        WatchIngestor::new(Arc::new(runner), settings(output_dir), settle, 2)
    }

    fn event(kind: EventKind, path: &str) -> Event {
        Event::new(kind).add_path(PathBuf::from(path))
    }

    #[test]
    fn test_pending_path_becomes_stable_once() {
        let mut tracker = DebounceTracker::new(SETTLE);
        let start = Instant::now();
        let path = PathBuf::from("/in/a.tif");

        tracker.observe_created(path.clone(), start);
        assert_eq!(tracker.next_deadline(), Some(start + SETTLE));
        assert!(tracker.take_stable(start + SETTLE / 2).is_empty());

        assert_eq!(tracker.take_stable(start + SETTLE), vec![path.clone()]);
        assert_eq!(tracker.deadline(&path), None);
        assert_eq!(tracker.pending_count(), 0);
        assert!(tracker.take_stable(start + SETTLE * 10).is_empty());
        assert_eq!(tracker.next_deadline(), None);
    }

    #[test]
    fn test_write_activity_pushes_back_deadline() {
        let mut tracker = DebounceTracker::new(SETTLE);
        let start = Instant::now();
        let path = PathBuf::from("/in/a.tif");

        tracker.observe_created(path.clone(), start);
        let later = start + Duration::from_millis(200);
        assert!(tracker.observe_activity(&path, later));

        assert!(tracker.take_stable(start + SETTLE).is_empty());
        assert_eq!(tracker.take_stable(later + SETTLE), vec![path]);
    }

    #[test]
    fn test_consumed_path_ignores_writes_until_recreated() {
        let mut tracker = DebounceTracker::new(SETTLE);
        let start = Instant::now();
        let path = PathBuf::from("/in/a.tif");

        tracker.observe_created(path.clone(), start);
        tracker.take_stable(start + SETTLE);

        assert!(!tracker.observe_activity(&path, start + SETTLE * 2));
        assert_eq!(tracker.pending_count(), 0);

        let again = start + SETTLE * 3;
        tracker.observe_created(path.clone(), again);
        assert_eq!(tracker.deadline(&path), Some(again + SETTLE));
    }

    #[test]
    fn test_observe_filters_and_maps_events() {
        let mut tracker = DebounceTracker::new(SETTLE);
        let settings = JobSettings::new("lc", 0.9, "/out");
        let now = Instant::now();

        observe(&mut tracker, &settings, event(EventKind::Create(CreateKind::File), "/in/a.tif"), now);
        observe(&mut tracker, &settings, event(EventKind::Create(CreateKind::File), "/in/notes.txt"), now);
        observe(&mut tracker, &settings, event(EventKind::Create(CreateKind::File), "/in/a_LC_only.tif"), now);
        observe(&mut tracker, &settings, event(EventKind::Create(CreateKind::File), "/in/b.tif.part"), now);
        assert_eq!(tracker.pending_count(), 1);

        // Writes to unknown files do not start tracking
        observe(
            &mut tracker,
            &settings,
            event(EventKind::Modify(ModifyKind::Data(DataChange::Any)), "/in/old.tif"),
            now,
        );
        assert_eq!(tracker.deadline(Path::new("/in/old.tif")), None);

        observe(
            &mut tracker,
            &settings,
            event(EventKind::Modify(ModifyKind::Name(RenameMode::To)), "/in/moved.tif"),
            now,
        );
        assert_eq!(tracker.pending_count(), 2);

        observe(&mut tracker, &settings, event(EventKind::Remove(RemoveKind::File), "/in/a.tif"), now);
        assert_eq!(tracker.deadline(Path::new("/in/a.tif")), None);
        assert_eq!(tracker.pending_count(), 1);
    }

    #[test]
    fn test_summary_counts_outcomes() {
        let report = |outcome| JobReport {
            source: PathBuf::from("/in/a.tif"),
            elapsed: Duration::ZERO,
            outcome,
        };
        let finished = |output_path: Option<&str>| JobResult {
            frame_count: 3,
            kept_count: usize::from(output_path.is_some()),
            classification_failures: 0,
            output_path: output_path.map(PathBuf::from),
        };

        let mut summary = WatchSummary::default();
        summary.record(&report(Ok(finished(Some("/out/a_LC_only.tif")))));
        summary.record(&report(Ok(finished(None))));
        summary.record(&report(Ok(finished(None))));
        summary.record(&report(Err(StackerError::generic("boom"))));

        assert_eq!(summary, WatchSummary { saved: 1, skipped: 2, failed: 1 });
        assert_eq!(summary.processed(), 4);
    }

    #[test]
    fn test_subscribe_to_missing_folder_fails_up_front() {
        let dir = tempdir().unwrap();
        let ingestor = ingestor(ScriptedClassifier::new(), dir.path(), SETTLE);

        let result = ingestor.subscribe(dir.path().join("missing"));
        assert!(matches!(
            result,
            Err(StackerError::Ingest(IngestError::DirectoryNotFound { .. }))
        ));

        let file = dir.path().join("file.tif");
        std::fs::write(&file, b"x").unwrap();
        assert!(matches!(
            ingestor.subscribe(&file),
            Err(StackerError::Ingest(IngestError::NotADirectory { .. }))
        ));
    }

    fn stack_bytes(values: &[u8]) -> Vec<u8> {
        let staging = tempdir().unwrap();
        let path = staging.path().join("staged.tif");
        write_rgb_stack(&path, values);
        std::fs::read(path).unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_file_still_being_written_is_processed_exactly_once() {
        let input = tempdir().unwrap();
        let output = tempdir().unwrap();
        let classifier = ScriptedClassifier::new().predict(20, "lc", 0.95);
        let session = ingestor(classifier, output.path(), SETTLE)
            .subscribe(input.path())
            .unwrap();

        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(session.run(async move {
            let _ = stopped.await;
        }));

        let bytes = stack_bytes(&[10, 20, 30]);
        let target = input.path().join("slow.tif");
        let mut file = std::fs::File::create(&target).unwrap();
        for chunk in bytes.chunks(bytes.len() / 3 + 1) {
            file.write_all(chunk).unwrap();
            file.flush().unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        drop(file);
        std::fs::write(input.path().join("notes.txt"), b"ignored").unwrap();

        tokio::time::sleep(SETTLE * 4).await;
        stop.send(()).unwrap();
        let summary = handle.await.unwrap();

        assert_eq!(summary, WatchSummary { saved: 1, skipped: 0, failed: 0 });
        let output = output.path().join("slow_LC_only.tif");
        assert_eq!(crate::testing::page_values(&output), vec![20]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_drains_running_jobs_and_drops_pending_ones() {
        let input = tempdir().unwrap();
        let output = tempdir().unwrap();
        let settle = Duration::from_millis(100);
        let classifier = ScriptedClassifier::new()
            .predict_after(1, "lc", 0.99, Duration::from_millis(400));
        let session = ingestor(classifier, output.path(), settle)
            .subscribe(input.path())
            .unwrap();

        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(session.run(async move {
            let _ = stopped.await;
        }));

        // Moved in whole, the way atomic writers deliver files
        let staging = tempdir().unwrap();
        let staged = staging.path().join("first.tif");
        write_rgb_stack(&staged, &[1]);
        std::fs::rename(&staged, input.path().join("first.tif"))
            .or_else(|_| std::fs::copy(&staged, input.path().join("first.tif")).map(|_| ()))
            .unwrap();

        // Job is now running inside its slow classify call
        tokio::time::sleep(Duration::from_millis(250)).await;
        write_rgb_stack(&input.path().join("late.tif"), &[1]);
        stop.send(()).unwrap();

        let summary = handle.await.unwrap();
        assert_eq!(summary.processed(), 1);
        assert!(output.path().join("first_LC_only.tif").exists());
        assert!(!output.path().join("late_LC_only.tif").exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stack_arriving_before_run_is_picked_up() {
        let input = tempdir().unwrap();
        let output = tempdir().unwrap();
        let classifier = ScriptedClassifier::new().predict(5, "lc", 0.97);
        let session = ingestor(classifier, output.path(), Duration::from_millis(100))
            .subscribe(input.path())
            .unwrap();

        // Lands while the caller is still busy, e.g. with the initial batch
        write_rgb_stack(&input.path().join("early.tif"), &[5, 6]);
        tokio::time::sleep(Duration::from_millis(200)).await;

        let summary = session.run(tokio::time::sleep(Duration::from_millis(800))).await;
        assert_eq!(summary.saved, 1);
        assert_eq!(
            crate::testing::page_values(&output.path().join("early_LC_only.tif")),
            vec![5]
        );
    }
}
