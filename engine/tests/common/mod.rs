//! Shared helpers for engine integration tests.
#![allow(dead_code)]

use crossbeam_channel::{bounded, Sender};
use engine::{CopyEvent, JobReport, ProgressUpdate};
use std::fs;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Write `len` bytes of a non-repeating-per-block pattern to `dir/source.bin`.
pub fn write_source(dir: &Path, len: usize) -> (PathBuf, Vec<u8>) {
    let data: Vec<u8> = (0..len).map(|i| ((i * 31 + i / 997) % 256) as u8).collect();
    let path = dir.join("source.bin");
    fs::write(&path, &data).expect("Failed to write source");
    (path, data)
}

pub fn make_dir(parent: &Path, name: &str) -> PathBuf {
    let dir = parent.join(name);
    fs::create_dir(&dir).expect("Failed to create dir");
    dir
}

pub fn dir_is_empty(dir: &Path) -> bool {
    fs::read_dir(dir).expect("Failed to read dir").next().is_none()
}

/// Concatenate every segment of a report in worker-index order.
pub fn concat_segments(report: &JobReport) -> Vec<u8> {
    let mut joined = Vec::new();
    for path in report.segment_paths() {
        joined.extend(fs::read(path).expect("Failed to read segment"));
    }
    joined
}

pub fn progress_updates(events: &[CopyEvent]) -> Vec<ProgressUpdate> {
    events
        .iter()
        .filter_map(|event| match event {
            CopyEvent::Progress(update) => Some(*update),
            _ => None,
        })
        .collect()
}

/// Poll `condition` until it holds, failing the test after `timeout`.
pub fn wait_until<F: FnMut() -> bool>(timeout: Duration, what: &str, mut condition: F) {
    let deadline = Instant::now() + timeout;
    while !condition() {
        assert!(Instant::now() < deadline, "Timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(2));
    }
}

/// Collects events from a rendezvous channel.
///
/// The collector accepts the job-started event, then stops receiving until
/// `release` is called. Until then every worker blocks on its first progress
/// event, which lets a test issue controls at a known point of the copy.
pub struct GatedCollector {
    go: Sender<()>,
    handle: JoinHandle<Vec<CopyEvent>>,
}

pub fn gated_channel() -> (Sender<CopyEvent>, GatedCollector) {
    let (tx, rx) = bounded::<CopyEvent>(0);
    let (go, go_rx) = bounded::<()>(1);
    let handle = thread::spawn(move || {
        let mut events = Vec::new();
        if let Ok(event) = rx.recv() {
            events.push(event);
        }
        let _ = go_rx.recv();
        for event in rx.iter() {
            let done = matches!(event, CopyEvent::JobFinished(_));
            events.push(event);
            if done {
                break;
            }
        }
        events
    });
    (tx, GatedCollector { go, handle })
}

impl GatedCollector {
    pub fn release(&self) {
        self.go.send(()).expect("Collector exited early");
    }

    pub fn finish(self) -> Vec<CopyEvent> {
        drop(self.go);
        self.handle.join().expect("Collector panicked")
    }
}
