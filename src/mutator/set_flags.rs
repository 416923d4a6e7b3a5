use super::location_matcher::LocationMatcher;
use super::{EventStream, Mutator, PipelineEnv};
use crate::event::{EventKind, FlagDuration, StreamEvent};
use crate::session::{Location, LocationTarget};
use libc::pid_t;

/// `SCRIBE_PS_ENABLE_STRICT_RPY`, the one flag bit `MutateOnTheFly` clears
/// (`mutator/set_flags.py`'s `MutateOnTheFly`).
const SCRIBE_PS_ENABLE_STRICT_RPY: u32 = 1 << 0;

/// Inserts a `SetFlags` event at a matched location (`mutator/set_flags.py`).
pub struct SetFlags {
    location: Location,
    matcher: Option<LocationMatcher>,
    flags: u32,
    duration: FlagDuration,
    extra: Option<Vec<u8>>,
}

impl SetFlags {
    pub fn new(location: Location, flags: u32, duration: FlagDuration, extra: Option<Vec<u8>>) -> SetFlags {
        SetFlags {
            location,
            matcher: None,
            flags,
            duration,
            extra,
        }
    }

    /// Force the next syscall (optionally substituting its number) to be
    /// ignored by the replay facility (`IgnoreNextSyscall`).
    pub fn ignore_next_syscall(location: Location, new_syscall: i32) -> SetFlags {
        let extra = if new_syscall != 0 {
            Some(
                EventKind::SyscallExtra {
                    nr: new_syscall,
                    ret: 0,
                    args: Vec::new(),
                }
                .encode(),
            )
        } else {
            None
        };
        SetFlags::new(location, 0, FlagDuration::UntilNextSyscall, extra)
    }

    /// Switch a live replay out of strict mode right after init, enabling
    /// on-the-fly mutation for the rest of the run (`MutateOnTheFly`).
    pub fn mutate_on_the_fly(init_pid: pid_t) -> SetFlags {
        SetFlags::new(
            Location::after(LocationTarget::Start(init_pid)),
            u32::MAX & !SCRIBE_PS_ENABLE_STRICT_RPY,
            FlagDuration::Permanent,
            None,
        )
    }
}

impl Mutator for SetFlags {
    fn start(&mut self, env: &mut PipelineEnv) {
        self.matcher = Some(LocationMatcher::single(&env.session, self.location));
    }

    fn process(self: Box<Self>, input: EventStream) -> EventStream {
        let matcher = self.matcher.expect("start() must run before process()");
        let flags = self.flags;
        let duration = self.duration;
        let extra = self.extra;
        Box::new(input.flat_map(move |event| {
            let mut out = Vec::new();
            if matcher.match_event(&event).is_some() {
                let proc = event.proc.expect("set-flags target must have an owning process");
                out.push(StreamEvent::synthetic(
                    EventKind::SetFlags {
                        flags,
                        duration,
                        extra: extra.clone(),
                    },
                    proc,
                ));
            }
            out.push(event);
            out.into_iter()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use std::rc::Rc;

    /// `mutate_on_the_fly` clears strict-replay and nothing else, and
    /// anchors right after the init process's very first event.
    #[test]
    fn mutate_on_the_fly_clears_only_strict_replay() {
        let raw = vec![EventKind::Pid(1), EventKind::Fence, EventKind::Fence];
        let session = Rc::new(Session::from_raw_events(raw));
        let first = session.processes[&1].events.get(0).unwrap();

        let mut env = PipelineEnv::new(Rc::clone(&session));
        let mut mutator: Box<dyn Mutator> = Box::new(SetFlags::mutate_on_the_fly(1));
        mutator.start(&mut env);

        let source: EventStream = Box::new(vec![StreamEvent::from_session(EventKind::Fence, Some(1), first)].into_iter());
        let out: Vec<StreamEvent> = mutator.process(source).collect();

        match &out[0].kind {
            EventKind::SetFlags { flags, duration, .. } => {
                assert_eq!(*flags, u32::MAX & !SCRIBE_PS_ENABLE_STRICT_RPY);
                assert_eq!(*duration, FlagDuration::Permanent);
            }
            other => panic!("expected SetFlags, got {:?}", other),
        }
    }

    /// `ignore_next_syscall` embeds the substitute syscall number in the
    /// extra payload only when one is actually provided.
    #[test]
    fn ignore_next_syscall_embeds_substitution_only_when_given() {
        let raw = vec![EventKind::Pid(1), EventKind::Fence];
        let session = Rc::new(Session::from_raw_events(raw));
        let target = session.processes[&1].events.get(0).unwrap();
        let loc = Location::before(LocationTarget::Event(target));

        let mut env = PipelineEnv::new(Rc::clone(&session));
        let mut mutator: Box<dyn Mutator> = Box::new(SetFlags::ignore_next_syscall(loc, 0));
        mutator.start(&mut env);
        let source: EventStream = Box::new(vec![StreamEvent::from_session(EventKind::Fence, Some(1), target)].into_iter());
        let out: Vec<StreamEvent> = mutator.process(source).collect();
        match &out[0].kind {
            EventKind::SetFlags { extra, .. } => assert!(extra.is_none()),
            other => panic!("expected SetFlags, got {:?}", other),
        }
    }
}
