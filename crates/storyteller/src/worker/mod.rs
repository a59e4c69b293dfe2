pub mod runner;
pub mod scanner;

pub use runner::{setup_signal_handler, Pause, ThreadPause, Worker, WorkerSummary};
pub use scanner::{oldest_first, QueueEntry, QueueScanner, Selector};
