//! Command-line configuration (spec.md §6). Every option the `Explorer`
//! needs is gathered here via `structopt`, matching the teacher's use of
//! `structopt`-derived option structs for its own CLI surface
//! (`commands/rd_options.rs`'s sibling pattern).

use serde::Serialize;
use std::path::PathBuf;
use structopt::StructOpt;

/// Tunables for the `Explorer`'s search and scoring (spec.md §6 "External
/// Interfaces": logfile path, on-the-fly mode, isolation, scoring
/// constants, per-pid replace/insert/delete pattern, and deletion/on-the-fly
/// search bounds).
#[derive(Debug, Clone, Serialize, StructOpt)]
#[structopt(name = "mreplay", about = "Explore variant executions of a recorded scribe trace")]
pub struct ExplorerConfig {
    /// Path to the recorded trace log to explore from.
    #[structopt(long, parse(from_os_str))]
    pub logfile_path: PathBuf,

    /// Mutate the replay live instead of only between runs.
    #[structopt(long)]
    pub on_the_fly: bool,

    /// Treat I/O results as non-deterministic (`SCRIBE_PS_FIXED_IO` cleared).
    #[structopt(long)]
    pub var_io: bool,

    /// Stop after this many successful executions.
    #[structopt(long, default_value = "1")]
    pub num_success_to_stop: u32,

    /// Run each replay inside a chroot + unionfs-fuse jail.
    #[structopt(long)]
    pub isolate: bool,

    /// Use linear scoring instead of the default non-linear (sqrt) formula.
    #[structopt(long)]
    pub linear: bool,

    /// Per-depth mutation pattern, e.g. `"+-*"` (`+` insert, `-` delete,
    /// `r` replace, `.`/`*` unconstrained). `*` expands to `-+` the way
    /// `explorer.py`'s constructor does.
    #[structopt(long)]
    pub pattern: Option<String>,

    /// Score delta applied when an `InsertEvent` mutation is taken.
    #[structopt(long, default_value = "0")]
    pub add_constant: i64,

    /// Score delta (per deleted event) applied when a `DeleteEvent`
    /// mutation is taken.
    #[structopt(long, default_value = "0")]
    pub del_constant: i64,

    /// Score delta per event successfully replayed before a divergence.
    #[structopt(long, default_value = "1")]
    pub match_constant: i64,

    /// Upper bound on how many syscalls `DeleteEvent` will scan forward
    /// looking for a matching syscall to resynchronise on.
    #[structopt(long, default_value = "16")]
    pub max_delete: usize,

    /// Upper bound on on-the-fly mutation attempts per divergence.
    #[structopt(long, default_value = "16")]
    pub max_otf: usize,
}

impl ExplorerConfig {
    /// `explorer.py`'s `pattern.replace('*', '-+')`.
    pub fn normalized_pattern(&self) -> Option<String> {
        self.pattern.as_ref().map(|p| p.replace('*', "-+"))
    }

    /// Renders the parsed configuration for a startup log line, the way
    /// `trace_info_command.rs` serializes its header with `serde_json`
    /// before printing it.
    pub fn dump(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "<unserializable ExplorerConfig>".to_string())
    }
}
