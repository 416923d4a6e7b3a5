//! Resolves `Location`s against a parsed `Session` into concrete event
//! identities a pipeline stage can test a `StreamEvent` against
//! (`mutator/location_matcher.py`).

use crate::error::PipelineError;
use crate::event::{EventId, StreamEvent};
use crate::session::{Anchor, Location, LocationTarget, Session};
use std::collections::HashMap;

/// Like `location_matcher.py`, every anchor is collapsed to an equivalent
/// "before event X" rule at construction time
/// (`convert_after_to_end_syscalls` + `convert_after_to_before`), so a
/// pipeline only ever has to test matches in forward stream order. The
/// stored value is the *original* anchor, needed by `Bookmark` to decide
/// `PreSyscall` vs `PostSyscall`.
pub struct LocationMatcher {
    before: HashMap<EventId, Anchor>,
}

impl LocationMatcher {
    pub fn new(session: &Session, locations: impl IntoIterator<Item = Location>) -> LocationMatcher {
        let mut before = HashMap::new();
        for loc in locations {
            if let (Some(id), anchor) = Self::resolve(session, loc) {
                if let Some(&existing) = before.get(&id) {
                    crate::pipeline_assert!(existing == anchor, "{}", PipelineError::BeforeAfterCollapse);
                }
                before.insert(id, anchor);
            }
        }
        LocationMatcher { before }
    }

    pub fn single(session: &Session, location: Location) -> LocationMatcher {
        LocationMatcher::new(session, std::iter::once(location))
    }

    fn resolve(session: &Session, loc: Location) -> (Option<EventId>, Anchor) {
        let id = match loc.target {
            LocationTarget::Event(id) => match loc.anchor {
                Anchor::Before => Some(id),
                Anchor::After => {
                    // convert_after_to_end_syscalls: an "after" match on a
                    // syscall-start really means after its matching end, so
                    // scan the rest of the process's events (not just the
                    // ones `children()` would bound to this syscall) for
                    // the first `SyscallEnd`.
                    let anchor_point = if session.kind(id).is_syscall_start() {
                        session
                            .proc_of(id)
                            .and_then(|pid| session.processes.get(&pid))
                            .and_then(|proc| {
                                proc.events
                                    .after(&session.arena, id)
                                    .find(|c| session.kind(*c).is_syscall_end())
                            })
                            .unwrap_or(id)
                    } else {
                        id
                    };
                    let next = session.next_event(anchor_point);
                    crate::pipeline_assert!(
                        next.is_some(),
                        "{}",
                        PipelineError::AfterAnchorOnLastEvent(session.proc_of(anchor_point).unwrap_or(0))
                    );
                    next
                }
            },
            // Start sentinel always resolves to the process's first event,
            // regardless of which side it was anchored on.
            LocationTarget::Start(pid) => session.processes.get(&pid).and_then(|p| p.events.get(0)),
            // The End sentinel has no concrete successor; callers that need
            // "this process's last known event" (e.g. `TruncateQueue`'s
            // drain-to-session-end path) compare `EventId`s directly
            // instead of going through a matcher.
            LocationTarget::End(_) => None,
        };
        (id, loc.anchor)
    }

    pub fn match_event(&self, event: &StreamEvent) -> Option<Anchor> {
        event.source.and_then(|id| self.before.get(&id).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;

    /// `test_location_matcher`: anchoring "after" the process `Start`
    /// sentinel resolves to the process's very first event.
    #[test]
    fn after_start_matches_first_event_of_the_process() {
        let raw = vec![EventKind::Pid(1), EventKind::Fence, EventKind::Fence];
        let session = Session::from_raw_events(raw);
        let first = session.processes[&1].events.get(0).unwrap();

        let matcher = LocationMatcher::single(&session, Location::after(LocationTarget::Start(1)));
        let event = StreamEvent::from_session(EventKind::Fence, Some(1), first);
        assert_eq!(matcher.match_event(&event), Some(Anchor::After));
    }

    /// An "after" anchor on a syscall-start collapses onto the event right
    /// after its matching `SyscallEnd`, not the start's immediate successor.
    #[test]
    fn after_syscall_start_collapses_past_its_end() {
        let raw = vec![
            EventKind::Pid(1),
            EventKind::SyscallExtra { nr: 0, ret: 0, args: Vec::new() },
            EventKind::Fence,
            EventKind::SyscallEnd,
            EventKind::Rdtsc,
        ];
        let session = Session::from_raw_events(raw);
        let start = session.processes[&1].events.get(0).unwrap();
        let after_end = session.processes[&1].events.get(3).unwrap();

        let matcher = LocationMatcher::single(&session, Location::after(LocationTarget::Event(start)));
        let event = StreamEvent::from_session(EventKind::Rdtsc, Some(1), after_end);
        assert_eq!(matcher.match_event(&event), Some(Anchor::After));
    }

    /// `LocationTarget::End` has no concrete successor to resolve to.
    #[test]
    fn end_sentinel_never_matches() {
        let raw = vec![EventKind::Pid(1), EventKind::Fence];
        let session = Session::from_raw_events(raw);
        let matcher = LocationMatcher::single(&session, Location::after(LocationTarget::End(1)));
        let fence = session.processes[&1].events.get(0).unwrap();
        let event = StreamEvent::from_session(EventKind::Fence, Some(1), fence);
        assert_eq!(matcher.match_event(&event), None);
    }

    /// Anchoring "after" the last concrete event of a process's stream is a
    /// malformed pipeline, not a silently-dropped location.
    #[test]
    #[should_panic(expected = "last event")]
    fn after_anchor_on_last_event_aborts() {
        let raw = vec![EventKind::Pid(1), EventKind::Fence];
        let session = Session::from_raw_events(raw);
        let last = session.processes[&1].events.get(0).unwrap();
        LocationMatcher::single(&session, Location::after(LocationTarget::Event(last)));
    }

    /// A before-anchor and an after-anchor that resolve to the same event
    /// is a malformed pipeline, not a silent overwrite.
    #[test]
    #[should_panic(expected = "before/after")]
    fn before_after_collapse_onto_same_event_aborts() {
        let raw = vec![EventKind::Pid(1), EventKind::Fence, EventKind::Fence];
        let session = Session::from_raw_events(raw);
        let first = session.processes[&1].events.get(0).unwrap();
        let second = session.processes[&1].events.get(1).unwrap();

        LocationMatcher::new(
            &session,
            vec![Location::before(LocationTarget::Event(second)), Location::after(LocationTarget::Event(first))],
        );
    }
}
