//! Event representation.
//!
//! spec.md treats `Event` as an opaque record owned by the external scribe
//! codec. This module fixes one concrete representation so the rest of the
//! crate (mutators, `AdjustResources`, `take_until_match`) has real bytes
//! and real fields to operate on; it stands in for the kernel-owned wire
//! format described in spec.md §6 and is not a reimplementation of scribe.

pub mod codec;

use bitflags::bitflags;
use libc::pid_t;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Per-session replay-facility flags, the Rust analogue of scribe's
    /// `SCRIBE_PS_*` bitmask (spec.md §4.1, `SetFlagsInit`/`MutateOnTheFly`).
    #[derive(Serialize, Deserialize)]
    pub struct ReplayFlags: u32 {
        const ENABLE_ALL        = 0xffff_ffff;
        const STRICT_REPLAY     = 1 << 0;
        const FIXED_IO          = 1 << 1;
    }
}

/// `SCRIBE_UNTIL_NEXT_SYSCALL` / `SCRIBE_PERMANENT` from
/// `examples/original_source/mreplay/mutator/set_flags.py`.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub enum FlagDuration {
    UntilNextSyscall,
    Permanent,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub enum DataKind {
    /// `SCRIBE_DATA_INPUT | SCRIBE_DATA_STRING`
    InputString,
    Other(u32),
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub enum BookmarkKind {
    PreSyscall,
    PostSyscall,
}

/// Tagged union of event kinds (spec.md §6's "Events of interest" list).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum EventKind {
    Init,
    Pid(pid_t),
    SyscallExtra {
        nr: i32,
        ret: i64,
        args: Vec<u8>,
    },
    SyscallEnd,
    DataExtra {
        data_type: DataKind,
        data: Vec<u8>,
    },
    Data {
        data: Vec<u8>,
    },
    Fence,
    Rdtsc,
    ResourceLockExtra {
        id: u32,
        serial: u32,
    },
    ResourceLock,
    ResourceUnlock,
    MemOwnedReadExtra {
        address: u64,
    },
    MemOwnedWriteExtra {
        address: u64,
    },
    SetFlags {
        flags: u32,
        duration: FlagDuration,
        extra: Option<Vec<u8>>,
    },
    /// A no-op placeholder carrying the encoded bytes of some other event,
    /// used by the on-the-fly path (`diverge_handler.py::add_event`) to pad
    /// the live stream with events that mirror a to-be-materialised mutation
    /// without re-triggering it.
    Nop {
        encoded: Vec<u8>,
    },
    IgnoreSyscall,
    Signal {
        signo: i32,
    },
    QueueEof,
    Bookmark {
        id: u64,
        npr: usize,
        kind: BookmarkKind,
    },
}

impl EventKind {
    pub fn is_syscall_start(&self) -> bool {
        matches!(self, EventKind::SyscallExtra { .. })
    }

    pub fn is_syscall_end(&self) -> bool {
        matches!(self, EventKind::SyscallEnd)
    }

    pub fn is_resource_lock(&self) -> bool {
        matches!(
            self,
            EventKind::ResourceLockExtra { .. } | EventKind::ResourceLock
        )
    }

    pub fn is_resource_unlock(&self) -> bool {
        matches!(self, EventKind::ResourceUnlock)
    }

    pub fn is_pid(&self) -> bool {
        matches!(self, EventKind::Pid(_))
    }

    pub fn is_queue_eof(&self) -> bool {
        matches!(self, EventKind::QueueEof)
    }

    pub fn is_bookmark(&self) -> bool {
        matches!(self, EventKind::Bookmark { .. })
    }

    pub fn is_memory_access(&self) -> bool {
        matches!(
            self,
            EventKind::MemOwnedReadExtra { .. } | EventKind::MemOwnedWriteExtra { .. }
        )
    }

    pub fn memory_address(&self) -> Option<u64> {
        match self {
            EventKind::MemOwnedReadExtra { address } | EventKind::MemOwnedWriteExtra { address } => {
                Some(*address)
            }
            _ => None,
        }
    }

    pub fn is_signal(&self) -> bool {
        matches!(self, EventKind::Signal { .. })
    }

    pub fn is_data(&self) -> bool {
        matches!(self, EventKind::DataExtra { .. } | EventKind::Data { .. })
    }

    /// `is_string_data` from `diverge_handler.py`.
    pub fn is_string_data(&self) -> bool {
        matches!(
            self,
            EventKind::DataExtra {
                data_type: DataKind::InputString,
                ..
            }
        )
    }

    pub fn data_bytes(&self) -> Option<&[u8]> {
        match self {
            EventKind::DataExtra { data, .. } | EventKind::Data { data } => Some(data),
            _ => None,
        }
    }

    /// Syscall number, for the `SyscallExtra` kind only.
    pub fn syscall_nr(&self) -> Option<i32> {
        match self {
            EventKind::SyscallExtra { nr, .. } => Some(*nr),
            _ => None,
        }
    }

    pub fn syscall_args(&self) -> Option<&[u8]> {
        match self {
            EventKind::SyscallExtra { args, .. } => Some(args),
            _ => None,
        }
    }
}

/// Divergence sub-kinds reported by the replay driver (spec.md §4.4/§6).
/// These never appear in an event stream; they arrive out-of-band on a
/// `DivergeEvent` from the `ReplayDriver`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum DivergeKind {
    Syscall {
        nr: i32,
        args: Vec<u8>,
        num_args: usize,
    },
    SyscallRet {
        ret: i64,
    },
    EventType {
        is_rdtsc: bool,
    },
    DataContent {
        data: Vec<u8>,
        size: usize,
    },
    MemOwned {
        address: u64,
        write_access: bool,
    },
    Other,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DivergeEvent {
    pub pid: pid_t,
    pub num_ev_consumed: usize,
    pub fatal: bool,
    pub kind: DivergeKind,
}

/// A stable integer handle into a `Session`'s event arena (spec.md §9's
/// "arena-per-Session with stable integer handles" strategy for the
/// event/process/event-list cyclic graph).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct EventId(pub u32);

static_assertions::assert_eq_size!(EventId, u32);

/// A lightweight, pipeline-local event value. Events that originate from a
/// parsed `Session` carry `source`, the arena handle mutators use to
/// resolve `Location`s and walk `before`/`after`/`children`. Events
/// synthesised by a mutator (inserted, replaced, bookmarked) carry
/// `source: None`; they exist only for the duration of one pipeline pass,
/// after which the materialised log is re-parsed into a fresh `Session`
/// (spec.md §3 "Lifecycle").
#[derive(Clone, Debug)]
pub struct StreamEvent {
    pub kind: EventKind,
    pub proc: Option<pid_t>,
    pub source: Option<EventId>,
}

impl StreamEvent {
    pub fn synthetic(kind: EventKind, proc: pid_t) -> StreamEvent {
        StreamEvent {
            kind,
            proc: Some(proc),
            source: None,
        }
    }

    pub fn from_session(kind: EventKind, proc: Option<pid_t>, source: EventId) -> StreamEvent {
        StreamEvent {
            kind,
            proc,
            source: Some(source),
        }
    }
}
