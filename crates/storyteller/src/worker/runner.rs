use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info};

use crate::config::WorkerConfig;
use crate::error::QueueError;
use crate::pipeline::{JobOutcome, Pipeline};

use super::scanner::{oldest_first, QueueScanner, Selector};

/// Waits between polls. Tests substitute one that does not sleep.
pub trait Pause {
    fn pause(&self, duration: Duration);
}

pub struct ThreadPause;

impl Pause for ThreadPause {
    fn pause(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    pub completed: usize,
    pub failed: usize,
}

/// Single-threaded polling loop: one job at a time, oldest first.
pub struct Worker {
    scanner: QueueScanner,
    pipeline: Pipeline,
    select: Selector,
    poll_interval: Duration,
    post_job_pause: Duration,
}

impl Worker {
    pub fn new(scanner: QueueScanner, pipeline: Pipeline, config: &WorkerConfig) -> Self {
        Self {
            scanner,
            pipeline,
            select: oldest_first,
            poll_interval: config.poll_interval(),
            post_job_pause: config.post_job_pause(),
        }
    }

    pub fn with_selector(mut self, select: Selector) -> Self {
        self.select = select;
        self
    }

    /// Processes at most one job. `Ok(None)` means the queue was empty.
    pub fn run_once(&self) -> Result<Option<JobOutcome>, QueueError> {
        let entries = self.scanner.scan()?;
        let Some(entry) = (self.select)(&entries) else {
            return Ok(None);
        };

        info!("Processing job {}", entry.request_id);
        Ok(Some(self.pipeline.run(entry)))
    }

    /// Loops until `shutdown` is set. Job failures and scan errors are
    /// logged; neither ends the loop.
    pub fn run(&self, shutdown: &AtomicBool, pause: &dyn Pause) -> WorkerSummary {
        info!(
            "Worker polling {} every {:?}",
            self.scanner.queue_directory().display(),
            self.poll_interval
        );

        let mut summary = WorkerSummary::default();
        while !shutdown.load(Ordering::Relaxed) {
            match self.run_once() {
                Ok(Some(outcome)) => {
                    if outcome.is_completed() {
                        summary.completed += 1;
                    } else {
                        summary.failed += 1;
                    }
                    pause.pause(self.post_job_pause);
                }
                Ok(None) => {
                    debug!("Queue empty, sleeping for {:?}", self.poll_interval);
                    pause.pause(self.poll_interval);
                }
                Err(e) => {
                    error!("Queue scan failed: {}", e);
                    pause.pause(self.poll_interval);
                }
            }
        }

        info!(
            "Worker stopped after {} completed and {} failed jobs",
            summary.completed, summary.failed
        );
        summary
    }
}

/// Sets `shutdown` on Ctrl+C / SIGTERM.
pub fn setup_signal_handler(shutdown: Arc<AtomicBool>) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        info!("Received shutdown signal, finishing current job...");
        shutdown.store(true, Ordering::Relaxed);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::Narrator;
    use crate::job::record::tests::sample_record;
    use crate::job::{JobRecord, JobState, JobStore};
    use crate::pipeline::runner::tests::{FakeGenerator, FakeSource};
    use crate::storage::FileStorage;
    use crate::worker::QueueEntry;
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Records requested pauses and raises the shutdown flag after `limit`.
    struct CountingPause<'a> {
        shutdown: &'a AtomicBool,
        pauses: Mutex<Vec<Duration>>,
        limit: usize,
    }

    impl Pause for CountingPause<'_> {
        fn pause(&self, duration: Duration) {
            let mut pauses = self.pauses.lock().unwrap();
            pauses.push(duration);
            if pauses.len() >= self.limit {
                self.shutdown.store(true, Ordering::Relaxed);
            }
        }
    }

    fn worker(base: &Path, reply: Result<String, u16>) -> Worker {
        let jobs = JobStore::new(base.join("queue"), base.join("processed"), base.join("error"));
        let pipeline = Pipeline::new(
            jobs,
            Arc::new(FakeSource(Arc::new(FakeGenerator { reply }))),
            Narrator::disabled(base.join("stories/audio")),
            FileStorage::new(base.join("stories")),
        );
        let config = WorkerConfig {
            poll_interval_ms: 2000,
            post_job_pause_ms: 1000,
            ..WorkerConfig::default()
        };
        Worker::new(QueueScanner::new(base.join("queue")), pipeline, &config)
    }

    fn newest_first(entries: &[QueueEntry]) -> Option<&QueueEntry> {
        entries.iter().max_by(|a, b| a.created.cmp(&b.created))
    }

    #[test]
    fn test_run_once_on_empty_queue() {
        let temp = TempDir::new().unwrap();
        let worker = worker(temp.path(), Ok("Story.".to_string()));
        assert!(worker.run_once().unwrap().is_none());
    }

    #[test]
    fn test_run_once_processes_one_job() {
        let temp = TempDir::new().unwrap();
        let worker = worker(temp.path(), Ok("Story.".to_string()));
        let jobs = JobStore::new(
            temp.path().join("queue"),
            temp.path().join("processed"),
            temp.path().join("error"),
        );
        jobs.enqueue(&sample_record()).unwrap();
        jobs.enqueue(&sample_record()).unwrap();

        let outcome = worker.run_once().unwrap().unwrap();
        assert!(outcome.is_completed());
        let counts = jobs.counts().unwrap();
        assert_eq!((counts.queued, counts.processed), (1, 1));
    }

    /// Enqueues two records far enough apart for their file times to differ.
    fn enqueue_two(base: &Path) -> (JobRecord, JobRecord) {
        let jobs = JobStore::new(base.join("queue"), base.join("processed"), base.join("error"));
        let first = sample_record();
        jobs.enqueue(&first).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        let second = sample_record();
        jobs.enqueue(&second).unwrap();
        (first, second)
    }

    #[test]
    fn test_run_once_takes_the_oldest_file() {
        let temp = TempDir::new().unwrap();
        let worker = worker(temp.path(), Ok("Story.".to_string()));
        let (first, second) = enqueue_two(temp.path());

        assert_eq!(worker.run_once().unwrap().unwrap().request_id(), first.id());
        assert_eq!(worker.run_once().unwrap().unwrap().request_id(), second.id());
        assert!(worker.run_once().unwrap().is_none());
    }

    #[test]
    fn test_custom_selector_is_used() {
        let temp = TempDir::new().unwrap();
        let worker = worker(temp.path(), Ok("Story.".to_string())).with_selector(newest_first);
        let (first, second) = enqueue_two(temp.path());

        assert_eq!(worker.run_once().unwrap().unwrap().request_id(), second.id());
        assert_eq!(worker.run_once().unwrap().unwrap().request_id(), first.id());
    }

    #[test]
    fn test_loop_survives_failures_and_pauses() {
        let temp = TempDir::new().unwrap();
        let worker = worker(temp.path(), Err(500));
        let jobs = JobStore::new(
            temp.path().join("queue"),
            temp.path().join("processed"),
            temp.path().join("error"),
        );
        jobs.enqueue(&sample_record()).unwrap();
        jobs.enqueue(&sample_record()).unwrap();

        let shutdown = AtomicBool::new(false);
        let pause = CountingPause {
            shutdown: &shutdown,
            pauses: Mutex::new(Vec::new()),
            limit: 3,
        };
        let summary = worker.run(&shutdown, &pause);

        assert_eq!(summary, WorkerSummary { completed: 0, failed: 2 });
        assert_eq!(
            *pause.pauses.lock().unwrap(),
            vec![
                Duration::from_millis(1000),
                Duration::from_millis(1000),
                Duration::from_millis(2000)
            ]
        );
        assert_eq!(jobs.list(JobState::Failed).unwrap().len(), 2);
    }

    #[test]
    fn test_loop_exits_when_already_shut_down() {
        let temp = TempDir::new().unwrap();
        let worker = worker(temp.path(), Ok("Story.".to_string()));
        let shutdown = AtomicBool::new(true);
        let summary = worker.run(&shutdown, &ThreadPause);
        assert_eq!(summary, WorkerSummary::default());
    }
}
