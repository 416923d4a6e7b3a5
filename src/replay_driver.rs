//! Glue to the external replay facility (spec.md §1/§4.3): out of scope to
//! reimplement, but the `Explorer`/`Replayer` need a stable trait boundary
//! to drive it against. Grounded on `explorer.py`'s `Replayer.run`, which
//! wraps `scribe.Context`/`scribe.Popen` the same way.

use crate::error::ReplayError;
use crate::isolation::IsolationContext;
use std::path::Path;

/// Callbacks the driver invokes while a replay is in flight
/// (`ReplayContext.on_mutation`/`on_bookmark` in `explorer.py`).
pub trait ReplayObserver {
    /// The live replay diverged from the mutated log at `event`. For
    /// on-the-fly mode the driver expects the observer to keep running;
    /// for the default mode the observer should treat this the same as a
    /// `ReplayError::Diverge` from `wait()`.
    fn on_mutation(&mut self, event: crate::event::DivergeEvent);

    /// A `Bookmark` event was reached; `npr` processes are expected to
    /// reach the same id before the driver proceeds.
    fn on_bookmark(&mut self, id: u64, npr: usize);
}

/// A single driven replay session, bound to one mutated trace log
/// (`scribe.Context`/`scribe.Popen` in `explorer.py`).
pub trait ReplayDriver {
    /// Install the hook run inside the traced program before its first
    /// exec, used to apply `IsolationContext::prepare`.
    fn add_init_loader(&mut self, isolation: &dyn IsolationContext) -> Result<(), ReplayError>;

    /// Poll for a stalled replay; recoverable failures are reported
    /// through `wait()`, not this call.
    fn check_deadlock(&mut self) -> Result<(), ReplayError>;

    /// Block until the replay finishes, diverges, deadlocks, or the
    /// context is closed.
    fn wait(&mut self) -> Result<(), ReplayError>;

    /// Resume a replay paused at a bookmark.
    fn resume(&mut self) -> Result<(), ReplayError>;

    /// Tear down the replay, e.g. in response to a user-requested stop.
    fn close(&mut self) -> Result<(), ReplayError>;
}

/// Opens a `ReplayDriver` bound to the mutated log at `logfile_path`,
/// forwarding driver callbacks to `observer` (`load_session`/`scribe.Popen`
/// construction in `explorer.py`'s `Replayer.run`).
pub trait ReplayDriverFactory {
    fn open(
        &self,
        logfile_path: &Path,
        observer: Box<dyn ReplayObserver>,
    ) -> Result<Box<dyn ReplayDriver>, ReplayError>;
}
