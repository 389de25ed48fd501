use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use ems::config::EmsConfig;
use ems::context::EmsContext;
use ems::server::SessionServer;
use ems::logger;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};

/// Long-running EMS session server, accepting clients over a named FIFO.
#[derive(Parser, Debug)]
#[command(name = "ems-server", about = "Run the EMS session server")]
struct Args {
    /// Path of the well-known server FIFO clients connect through.
    server_pipe: String,

    /// Per-access delay, in microseconds, simulating a slow Store.
    #[arg(default_value_t = 0)]
    access_delay_us: u64,
}

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);
static DUMP_REQUESTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_sigint(_: i32) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

extern "C" fn on_sigusr1(_: i32) {
    DUMP_REQUESTED.store(true, Ordering::SeqCst);
}

fn install_signal_handlers() -> Result<(), nix::Error> {
    let sigint_action = SigAction::new(SigHandler::Handler(on_sigint), SaFlags::empty(), SigSet::empty());
    let sigusr1_action = SigAction::new(SigHandler::Handler(on_sigusr1), SaFlags::empty(), SigSet::empty());
    unsafe {
        signal::sigaction(Signal::SIGINT, &sigint_action)?;
        signal::sigaction(Signal::SIGUSR1, &sigusr1_action)?;
    }
    Ok(())
}

fn main() -> ExitCode {
    logger::init();
    let args = Args::parse();

    if let Err(e) = install_signal_handlers() {
        log::error!("failed to install signal handlers: {e}");
        return ExitCode::FAILURE;
    }

    let delay = Duration::from_micros(args.access_delay_us);
    let ctx = EmsContext::new(EmsConfig::for_server(delay));
    if let Err(e) = ctx.store.initialize(delay) {
        log::error!("store initialize failed: {e}");
        return ExitCode::FAILURE;
    }

    let server = Arc::new(SessionServer::new(ctx));

    let watcher_server = server.clone();
    std::thread::spawn(move || loop {
        std::thread::sleep(Duration::from_millis(50));
        if DUMP_REQUESTED.swap(false, Ordering::SeqCst) {
            watcher_server.dump_events();
        }
        if SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
            watcher_server.shutdown();
            break;
        }
    });

    match server.run(&args.server_pipe) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("server exited with error: {e}");
            ExitCode::FAILURE
        }
    }
}
