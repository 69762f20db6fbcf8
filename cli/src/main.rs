//! ChunkCopy - Command-line interface for the chunked copy engine.
//!
//! Splits one file into N segments copied in parallel, prints a progress line
//! to stderr and accepts pause/resume/cancel commands on stdin while the copy
//! runs.

use chrono::{DateTime, Local};
use clap::Parser;
use crossbeam_channel::{never, select, unbounded, Receiver};
use engine::{
    ControlError, CopyConfig, CopyEvent, CopyOrchestrator, FileCopyJob, JobHandle, JobOutcome,
    JobReport, WorkerReport, WorkerStatus,
};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

/// ChunkCopy - copy one file as parallel segments
#[derive(Parser, Debug)]
#[command(name = "chunkcopy")]
#[command(version = "0.1.0")]
#[command(about = "Copy a file into N segment files using parallel workers")]
struct Args {
    /// Source file
    #[arg(long, value_name = "FILE")]
    src: PathBuf,

    /// Destination directory for the segment files
    #[arg(long, value_name = "DIR")]
    dst: PathBuf,

    /// Number of parallel workers (one segment each)
    #[arg(long, value_name = "N", default_value_t = 4)]
    workers: usize,

    /// Bytes read and written per step
    #[arg(long, value_name = "BYTES", default_value_t = engine::config::DEFAULT_BLOCK_SIZE)]
    block_size: usize,

    /// Segment file name prefix
    #[arg(long, value_name = "PREFIX", default_value = engine::config::DEFAULT_SEGMENT_PREFIX)]
    prefix: String,

    /// Enable verbose output
    #[arg(long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Only print errors
    #[arg(long, conflicts_with_all = ["verbose", "debug"])]
    quiet: bool,

    /// Do not read pause/resume/cancel commands from stdin
    #[arg(long)]
    no_interactive: bool,
}

/// A control command typed on stdin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Pause,
    Resume,
    Cancel,
}

fn parse_command(line: &str) -> Option<Command> {
    match line.trim().to_lowercase().as_str() {
        "p" | "pause" => Some(Command::Pause),
        "r" | "resume" => Some(Command::Resume),
        "c" | "cancel" | "q" => Some(Command::Cancel),
        _ => None,
    }
}

fn apply_command(handle: &JobHandle, command: Command) -> Result<&'static str, ControlError> {
    match command {
        Command::Pause => handle.pause().map(|()| "Paused (r to resume)"),
        Command::Resume => handle.resume().map(|()| "Resumed"),
        Command::Cancel => handle.cancel().map(|()| "Cancelling..."),
    }
}

/// Forward stdin lines as commands. Unknown input is reported and skipped.
fn spawn_command_reader() -> Receiver<Command> {
    let (tx, rx) = unbounded();
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match parse_command(&line) {
                Some(command) => {
                    if tx.send(command).is_err() {
                        break;
                    }
                }
                None => eprintln!(
                    "\nUnknown command '{}' (p = pause, r = resume, c = cancel)",
                    line.trim()
                ),
            }
        }
    });
    rx
}

/// Terminal progress display fed from the engine's event channel.
struct CliProgress {
    verbose: bool,
    quiet: bool,
    job_id: Option<Uuid>,
    start_time: Instant,
    last_progress_update: Option<Instant>,
}

impl CliProgress {
    fn new(verbose: bool, quiet: bool) -> Self {
        CliProgress {
            verbose,
            quiet,
            job_id: None,
            start_time: Instant::now(),
            last_progress_update: None,
        }
    }

    /// Binary-prefixed size, e.g. `1.50 KiB`.
    fn format_bytes(bytes: u64) -> String {
        const UNITS: [&str; 5] = ["KiB", "MiB", "GiB", "TiB", "PiB"];
        if bytes < 1024 {
            return format!("{} B", bytes);
        }
        let mut value = bytes as f64 / 1024.0;
        let mut unit = UNITS[0];
        for next in &UNITS[1..] {
            if value < 1024.0 {
                break;
            }
            value /= 1024.0;
            unit = next;
        }
        format!("{:.2} {}", value, unit)
    }

    /// Elapsed time as `HH:MM:SS`.
    fn format_elapsed(elapsed: Duration) -> String {
        let total = elapsed.as_secs();
        format!("{:02}:{:02}:{:02}", total / 3600, total / 60 % 60, total % 60)
    }

    fn progress_bar(percent: f64) -> String {
        const WIDTH: usize = 30;
        let percent = percent.clamp(0.0, 100.0);
        let filled = ((percent / 100.0) * WIDTH as f64).round() as usize;
        format!("[{}{}] {:5.1}%", "#".repeat(filled), "-".repeat(WIDTH - filled), percent)
    }

    fn handle_event(&mut self, event: &CopyEvent) {
        match event {
            CopyEvent::JobStarted { job_id, ranges } => {
                self.job_id = Some(*job_id);
                if self.quiet {
                    return;
                }
                let now: DateTime<Local> = Local::now();
                eprintln!("Job {} started at {}", job_id, now.format("%Y-%m-%d %H:%M:%S"));
                if self.verbose {
                    for range in ranges {
                        eprintln!(
                            "  [worker {:2}] bytes {}..{} ({})",
                            range.worker_index,
                            range.start_offset,
                            range.end_offset_exclusive,
                            Self::format_bytes(range.len())
                        );
                    }
                }
            }
            CopyEvent::Progress(update) => {
                if self.quiet {
                    return;
                }
                let done = update.overall.bytes_copied >= update.overall.total_bytes;
                // At most one line every 200ms, but always show the final step
                if let Some(last) = self.last_progress_update {
                    if !done && last.elapsed() < Duration::from_millis(200) {
                        return;
                    }
                }
                self.last_progress_update = Some(Instant::now());

                eprint!(
                    "\rProgress: {} | {}/{}",
                    Self::progress_bar(update.overall.percent),
                    Self::format_bytes(update.overall.bytes_copied),
                    Self::format_bytes(update.overall.total_bytes)
                );
                let _ = io::stderr().flush();
            }
            CopyEvent::WorkerFinished(report) => {
                if self.verbose {
                    eprintln!("\n{}", Self::describe_worker(report));
                }
            }
            CopyEvent::JobFinished(_) => {}
        }
    }

    fn describe_worker(report: &WorkerReport) -> String {
        let state = &report.state;
        let mut line = format!(
            "[worker {:2}] {}: {}/{}",
            report.worker_index,
            state.status,
            Self::format_bytes(state.bytes_copied),
            Self::format_bytes(state.range.len())
        );
        if let Some(ref error) = state.error {
            line.push_str(&format!(" ({})", error));
        }
        line
    }

    fn print_summary(&self, report: &JobReport) {
        if self.quiet && report.outcome.is_completed() {
            return;
        }
        eprintln!();
        let job_id = self.job_id.unwrap_or(report.job_id);
        eprintln!("Job {} {}", job_id, report.outcome.to_string().to_lowercase());
        eprintln!(
            "Bytes copied: {} of {}",
            Self::format_bytes(report.bytes_copied),
            Self::format_bytes(report.file_size_bytes)
        );
        eprintln!("Elapsed: {}", Self::format_elapsed(self.start_time.elapsed()));

        if let JobOutcome::Failed(failures) = &report.outcome {
            eprintln!();
            eprintln!("Failed workers:");
            for failure in failures {
                eprintln!("  [worker {:2}] {}", failure.worker_index, failure.error);
            }
        }

        if self.verbose || !report.outcome.is_completed() {
            eprintln!();
            eprintln!("Segments:");
            for worker in &report.workers {
                let marker = if worker.state.status == WorkerStatus::Completed {
                    ""
                } else {
                    " (incomplete)"
                };
                eprintln!("  {}{}", worker.segment_path.display(), marker);
            }
        }
    }
}

/// Initialize tracing. `RUST_LOG` takes precedence over the flags.
fn init_logging(args: &Args) {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .try_init();
}

fn main() {
    let args = Args::parse();
    init_logging(&args);

    let exit_code = match run_cli(&args) {
        Ok(JobOutcome::Completed) => 0,
        Ok(JobOutcome::Cancelled) => 1,
        Ok(JobOutcome::Failed(_)) => 2,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            2
        }
    };

    std::process::exit(exit_code);
}

/// Main CLI logic - separated for testability
fn run_cli(args: &Args) -> Result<JobOutcome, String> {
    let config = CopyConfig::default()
        .with_block_size(args.block_size)
        .with_segment_prefix(&args.prefix);

    debug!(
        src = %args.src.display(),
        dst = %args.dst.display(),
        workers = args.workers,
        block_size = args.block_size,
        "Parsed arguments"
    );

    let job = FileCopyJob::from_source(&args.src, &args.dst, args.workers)
        .map_err(|e| format!("Invalid job: {}", e))?;

    let (tx, events) = unbounded();
    let handle = CopyOrchestrator::new(config)
        .start(job, tx)
        .map_err(|e| format!("Failed to start copy: {}", e))?;

    let commands = if args.no_interactive {
        never()
    } else {
        if !args.quiet {
            eprintln!("Commands: p = pause, r = resume, c = cancel (then Enter)");
        }
        spawn_command_reader()
    };
    let stdin_closed = never();
    let mut stdin_open = true;

    let mut progress = CliProgress::new(args.verbose, args.quiet);
    loop {
        let command_rx = if stdin_open { &commands } else { &stdin_closed };
        select! {
            recv(events) -> event => match event {
                Ok(CopyEvent::JobFinished(_)) | Err(_) => break,
                Ok(event) => progress.handle_event(&event),
            },
            recv(command_rx) -> command => match command {
                Ok(command) => match apply_command(&handle, command) {
                    Ok(message) => eprintln!("\n{}", message),
                    Err(e) => warn!(command = ?command, "Control request rejected: {}", e),
                },
                // stdin closed; keep copying without controls
                Err(_) => stdin_open = false,
            },
        }
    }

    let report = handle.wait();
    progress.print_summary(&report);
    Ok(report.outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::{ByteRange, WorkerError, WorkerErrorKind, WorkerState};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn write_source(dir: &Path, len: usize) -> (PathBuf, Vec<u8>) {
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        let path = dir.join("input.bin");
        fs::write(&path, &data).expect("Failed to write file");
        (path, data)
    }

    fn args_for(src: &Path, dst: &Path, workers: usize) -> Args {
        Args {
            src: src.to_path_buf(),
            dst: dst.to_path_buf(),
            workers,
            block_size: 4096,
            prefix: "Part_".to_string(),
            verbose: false,
            debug: false,
            quiet: true,
            no_interactive: true,
        }
    }

    #[test]
    fn test_cli_copies_into_segments() {
        let src_dir = TempDir::new().expect("Failed to create temp dir");
        let dst_dir = TempDir::new().expect("Failed to create temp dir");
        let (src, data) = write_source(src_dir.path(), 50_000);

        let result = run_cli(&args_for(&src, dst_dir.path(), 3));
        assert_eq!(result, Ok(JobOutcome::Completed));

        let mut joined = Vec::new();
        for index in 0..3 {
            let segment = dst_dir.path().join(format!("Part_{}.dat", index));
            joined.extend(fs::read(segment).expect("Failed to read segment"));
        }
        assert_eq!(joined, data);
    }

    #[test]
    fn test_cli_uses_custom_prefix_and_block_size() {
        let src_dir = TempDir::new().expect("Failed to create temp dir");
        let dst_dir = TempDir::new().expect("Failed to create temp dir");
        let (src, data) = write_source(src_dir.path(), 1000);

        let mut args = args_for(&src, dst_dir.path(), 1);
        args.prefix = "chunk-".to_string();
        args.block_size = 7;
        args.quiet = false;
        args.verbose = true;

        assert_eq!(run_cli(&args), Ok(JobOutcome::Completed));
        let segment = fs::read(dst_dir.path().join("chunk-0.dat")).expect("Failed to read segment");
        assert_eq!(segment, data);
    }

    #[test]
    fn test_cli_rejects_missing_source() {
        let dst_dir = TempDir::new().expect("Failed to create temp dir");
        let args = args_for(Path::new("/nonexistent/input.bin"), dst_dir.path(), 2);

        let result = run_cli(&args);
        assert!(result.is_err(), "CLI should reject missing source");
    }

    #[test]
    fn test_cli_rejects_zero_workers() {
        let src_dir = TempDir::new().expect("Failed to create temp dir");
        let dst_dir = TempDir::new().expect("Failed to create temp dir");
        let (src, _) = write_source(src_dir.path(), 10);

        let result = run_cli(&args_for(&src, dst_dir.path(), 0));
        assert!(result.is_err(), "CLI should reject zero workers");
        assert!(fs::read_dir(dst_dir.path())
            .expect("Failed to read dir")
            .next()
            .is_none());
    }

    #[test]
    fn test_cli_rejects_zero_block_size() {
        let src_dir = TempDir::new().expect("Failed to create temp dir");
        let dst_dir = TempDir::new().expect("Failed to create temp dir");
        let (src, _) = write_source(src_dir.path(), 10);

        let mut args = args_for(&src, dst_dir.path(), 2);
        args.block_size = 0;
        assert!(run_cli(&args).is_err(), "CLI should reject zero block size");
    }

    #[test]
    fn test_cli_rejects_directory_as_source() {
        let src_dir = TempDir::new().expect("Failed to create temp dir");
        let dst_dir = TempDir::new().expect("Failed to create temp dir");

        let result = run_cli(&args_for(src_dir.path(), dst_dir.path(), 2));
        assert!(result.is_err(), "CLI should reject a directory source");
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("p"), Some(Command::Pause));
        assert_eq!(parse_command("  Pause\n"), Some(Command::Pause));
        assert_eq!(parse_command("r"), Some(Command::Resume));
        assert_eq!(parse_command("cancel"), Some(Command::Cancel));
        assert_eq!(parse_command("q"), Some(Command::Cancel));
        assert_eq!(parse_command("x"), None);
        assert_eq!(parse_command(""), None);
    }

    #[test]
    fn test_format_helpers() {
        assert_eq!(CliProgress::format_bytes(512), "512 B");
        assert_eq!(CliProgress::format_bytes(1536), "1.50 KiB");
        assert_eq!(CliProgress::format_bytes(10 * 1024 * 1024), "10.00 MiB");
        assert_eq!(CliProgress::format_elapsed(Duration::from_secs(42)), "00:00:42");
        assert_eq!(CliProgress::format_elapsed(Duration::from_secs(125)), "00:02:05");
        assert_eq!(CliProgress::format_elapsed(Duration::from_secs(3725)), "01:02:05");
        assert_eq!(
            CliProgress::progress_bar(50.0),
            format!("[{}{}]  50.0%", "#".repeat(15), "-".repeat(15))
        );
        assert_eq!(
            CliProgress::progress_bar(100.0),
            format!("[{}] 100.0%", "#".repeat(30))
        );
        assert_eq!(
            CliProgress::progress_bar(-3.0),
            format!("[{}]   0.0%", "-".repeat(30))
        );
    }

    #[test]
    fn test_describe_worker_includes_error() {
        let report = WorkerReport {
            worker_index: 1,
            segment_path: PathBuf::from("Part_1.dat"),
            state: WorkerState {
                range: ByteRange {
                    start_offset: 0,
                    end_offset_exclusive: 2048,
                    worker_index: 1,
                },
                bytes_copied: 1024,
                status: WorkerStatus::Failed,
                error: Some(WorkerError::new(WorkerErrorKind::Write, "Part_1.dat", "disk full")),
            },
        };

        let line = CliProgress::describe_worker(&report);
        assert!(line.contains("Failed"));
        assert!(line.contains("1.00 KiB/2.00 KiB"));
        assert!(line.contains("disk full"));
    }
}
