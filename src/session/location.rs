use crate::event::EventId;
use libc::pid_t;

/// Which side of the matched event an insertion/flag/bookmark anchors to
/// (spec.md §3 "Location").
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Anchor {
    Before,
    After,
}

/// What a `Location` anchors against: a concrete event, or one of the two
/// sentinels from `examples/original_source/mreplay/location.py`
/// (`Start`/`End`) used when anchoring relative to a process's stream
/// rather than to a specific event — e.g. `MutateOnTheFly` anchors
/// "after init", and `SplitOnBookmark`/`TruncateQueue` track a process's
/// `last_anchor` as an `End`.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum LocationTarget {
    Event(EventId),
    Start(pid_t),
    End(pid_t),
}

/// A pair (event, before|after) identifying an insertion point
/// (spec.md §3 "Location").
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Location {
    pub target: LocationTarget,
    pub anchor: Anchor,
}

impl Location {
    pub fn before(target: LocationTarget) -> Location {
        Location {
            target,
            anchor: Anchor::Before,
        }
    }

    pub fn after(target: LocationTarget) -> Location {
        Location {
            target,
            anchor: Anchor::After,
        }
    }
}
