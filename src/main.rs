use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};

use fbmirror::{MirrorConfig, MirrorStats, Result};
use tracing::{error, info, warn};

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

extern "C" fn request_shutdown(_signal: libc::c_int) {
  SHUTDOWN.store(true, Ordering::Relaxed);
}

fn install_signal_handlers() -> nix::Result<()> {
  use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

  let action = SigAction::new(
    SigHandler::Handler(request_shutdown),
    SaFlags::empty(),
    SigSet::empty(),
  );
  unsafe {
    sigaction(Signal::SIGINT, &action)?;
    sigaction(Signal::SIGTERM, &action)?;
  }
  Ok(())
}

#[cfg(feature = "dispmanx")]
fn run(config: &MirrorConfig) -> Result<MirrorStats> {
  let index = config.display_index;
  fbmirror::run_mirror(
    || fbmirror::DispmanxDisplay::open(index),
    config,
    &SHUTDOWN,
  )
}

#[cfg(not(feature = "dispmanx"))]
fn run(config: &MirrorConfig) -> Result<MirrorStats> {
  error!("no capture backend compiled in; rebuild with --features dispmanx");
  Err(fbmirror::Error::DisplayUnavailable {
    index: config.display_index,
  })
}

fn main() -> ExitCode {
  let filter = tracing_subscriber::EnvFilter::try_from_default_env()
    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_target(false)
    .init();

  info!("fbmirror v{} starting", env!("CARGO_PKG_VERSION"));

  if let Err(err) = install_signal_handlers() {
    warn!("unable to install signal handlers: {err}");
  }

  match run(&MirrorConfig::default()) {
    Ok(stats) => {
      info!(
        "mirrored {} cycles ({} snapshot failures, {} readback failures)",
        stats.cycles, stats.snapshot_failures, stats.readback_failures
      );
      ExitCode::SUCCESS
    }
    Err(err) => {
      error!("{err}");
      ExitCode::FAILURE
    }
  }
}
