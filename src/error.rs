use crate::event::DivergeEvent;
use std::path::PathBuf;
use thiserror::Error;

/// Outcome of driving a single replay to completion. `Deadlock` and
/// `Diverge` are recoverable per spec.md §7: the caller marks the current
/// Execution FAILED and keeps exploring. `ContextClosed` is the expected
/// shape of a user-requested stop and is swallowed by the scheduler.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("replay deadlocked")]
    Deadlock,

    #[error("replay diverged: {0:?}")]
    Diverge(DivergeEvent),

    #[error("replay context closed")]
    ContextClosed,

    #[error("replay driver error: {0}")]
    Driver(String),
}

/// Programmer errors in the mutation pipeline: a malformed pipe of
/// mutators whose after-anchors could not be normalised to a before-anchor
/// before streaming began. These abort rather than propagate, matching
/// spec.md §7 ("Pipeline malformedness ... programmer error; aborts").
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("cannot anchor after the last event of pid {0}'s stream")]
    AfterAnchorOnLastEvent(libc::pid_t),

    #[error("before/after anchors collapse onto the same event")]
    BeforeAfterCollapse,
}

#[derive(Debug, Error)]
pub enum IsolationError {
    #[error("mount/bind operation on {path:?} failed: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("external command {cmd:?} exited with status {status}")]
    CommandFailed { cmd: String, status: i32 },
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to read trace log {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed event stream: {0}")]
    Malformed(String),
}
