use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use ems::config::EmsConfig;
use ems::context::EmsContext;
use ems::executor::Sink;
use ems::{filepool, logger, procpool};

/// File-stage EMS runner: processes every `.jobs` file in `directory`
/// through its own File Thread Pool, `max_processes` files at a time.
#[derive(Parser, Debug)]
#[command(name = "ems-cli", about = "Run EMS command files from a directory")]
struct Args {
    /// Directory containing `.jobs` input files.
    directory: PathBuf,

    /// Maximum number of input files processed concurrently.
    max_processes: usize,

    /// Maximum number of worker threads per input file.
    max_threads: usize,

    /// Per-access delay, in milliseconds, simulating a slow Store.
    #[arg(default_value_t = 0)]
    access_delay_ms: u64,
}

const JOB_EXTENSION: &str = "jobs";
const OUTPUT_EXTENSION: &str = "out";

fn main() -> ExitCode {
    logger::init();

    // A re-exec'd child has `EMS_WORKER_FILE` set and `max_threads`/
    // `access_delay_ms` as its only two CLI args (see `procpool::spawn_child`);
    // it runs exactly one file and skips the orchestrator's own argument
    // grammar entirely.
    if let Ok(single_file) = std::env::var(procpool::WORKER_FILE_ENV) {
        let mut raw = std::env::args().skip(1);
        let max_threads: usize = raw.next().and_then(|s| s.parse().ok()).unwrap_or(1);
        let delay_ms: u64 = raw.next().and_then(|s| s.parse().ok()).unwrap_or(0);
        return run_one_file(PathBuf::from(single_file), max_threads, Duration::from_millis(delay_ms));
    }

    let args = Args::parse();
    let files = match collect_job_files(&args.directory) {
        Ok(f) => f,
        Err(e) => {
            log::error!("failed to scan {}: {e}", args.directory.display());
            return ExitCode::FAILURE;
        }
    };

    let mut pool = procpool::ProcessPool::new(args.max_processes);
    let delay = Duration::from_millis(args.access_delay_ms);
    match pool.run(files, args.max_threads, delay) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("process pool run failed: {e}");
            ExitCode::FAILURE
        }
    }
}

fn collect_job_files(dir: &std::path::Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().map(|ext| ext == JOB_EXTENSION).unwrap_or(false))
        .collect();
    files.sort();
    Ok(files)
}

fn run_one_file(path: PathBuf, max_threads: usize, delay: Duration) -> ExitCode {
    let ctx = EmsContext::new(EmsConfig::new(delay, 1, max_threads));
    if let Err(e) = ctx.store.initialize(delay) {
        log::error!("initialize failed for {}: {e}", path.display());
        return ExitCode::FAILURE;
    }

    let reader = match File::open(&path) {
        Ok(f) => BufReader::new(f),
        Err(e) => {
            log::error!("cannot open {}: {e}", path.display());
            return ExitCode::FAILURE;
        }
    };
    let lines: Vec<String> = reader.lines().filter_map(|l| l.ok()).collect();

    let out_path = path.with_extension(OUTPUT_EXTENSION);
    let out_file = match File::create(&out_path) {
        Ok(f) => f,
        Err(e) => {
            log::error!("cannot create {}: {e}", out_path.display());
            return ExitCode::FAILURE;
        }
    };
    let sink = Arc::new(Sink::new(out_file));

    match filepool::drain(&ctx, lines, &sink, max_threads) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("run failed for {}: {e}", path.display());
            ExitCode::FAILURE
        }
    }
}
