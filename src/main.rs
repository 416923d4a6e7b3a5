//! CLI entry point: parse `ExplorerConfig`, load the root trace, and run
//! the exploration loop (spec.md §1 "Out of scope: ... CLI argument
//! parsing", carried anyway as ambient stack the way `isgasho-rd` wires
//! its own `RdOptions`-driven `main`).

use mreplay::config::ExplorerConfig;
use mreplay::error::ReplayError;
use mreplay::explorer::Explorer;
use mreplay::replay_driver::{ReplayDriver, ReplayDriverFactory, ReplayObserver};
use mreplay::session::Session;
use std::path::Path;
use std::rc::Rc;
use structopt::StructOpt;

/// The kernel-side scribe replay facility (spec.md §1's "Out of scope":
/// event codec, `Context`, `Popen`-equivalent driver) has no Rust
/// reimplementation here — it's an external collaborator reached over a
/// kernel module this build doesn't assume is present. Wiring a real
/// `ReplayDriverFactory` against it is the one integration point left for
/// whoever deploys this against an actual scribe-enabled kernel.
struct UnavailableDriverFactory;

impl ReplayDriverFactory for UnavailableDriverFactory {
    fn open(
        &self,
        _logfile_path: &Path,
        _observer: Box<dyn ReplayObserver>,
    ) -> Result<Box<dyn ReplayDriver>, ReplayError> {
        Err(ReplayError::Driver(
            "no scribe replay driver wired into this build".to_string(),
        ))
    }
}

fn main() {
    let config = ExplorerConfig::from_args();
    mreplay::log!(mreplay::log::LogLevel::LogDebug, "config: {}", config.dump());

    let root_session = match Session::load(&config.logfile_path) {
        Ok(session) => Rc::new(session),
        Err(e) => {
            eprintln!("failed to load {:?}: {}", config.logfile_path, e);
            std::process::exit(1);
        }
    };

    let explorer = match Explorer::new(config, root_session) {
        Ok(explorer) => explorer,
        Err(e) => {
            eprintln!("failed to set up mreplay working directory: {}", e);
            std::process::exit(1);
        }
    };

    let factory = UnavailableDriverFactory;
    if let Err(e) = Explorer::run(&explorer, &factory) {
        eprintln!("exploration aborted: {}", e);
        std::process::exit(1);
    }
}
