use super::{EventStream, Mutator, PipelineEnv};
use crate::event::{EventKind, StreamEvent};
use libc::pid_t;

/// Inserts a `Pid` event whenever the owning process changes, dropping any
/// `Pid` events already present in the stream (`mutator/insert_pid_events.py`).
pub struct InsertPidEvents;

impl InsertPidEvents {
    pub fn new() -> InsertPidEvents {
        InsertPidEvents
    }
}

impl Mutator for InsertPidEvents {
    fn start(&mut self, _env: &mut PipelineEnv) {}

    fn process(self: Box<Self>, input: EventStream) -> EventStream {
        let mut current: Option<pid_t> = None;
        Box::new(input.filter(|e| !e.kind.is_pid()).flat_map(move |event| {
            let mut out = Vec::new();
            if event.proc != current {
                if let Some(pid) = event.proc {
                    out.push(StreamEvent::synthetic(EventKind::Pid(pid), pid));
                }
                current = event.proc;
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

    fn pid(p: pid_t) -> StreamEvent {
        StreamEvent::synthetic(EventKind::Pid(p), p)
    }

    fn fence(p: pid_t) -> StreamEvent {
        StreamEvent::synthetic(EventKind::Fence, p)
    }

    /// `test_insert_pid_events`: collapses repeated/no-op pid switches and
    /// drops the original `Pid` events.
    #[test]
    fn collapses_pid_switches_to_one_marker_per_change() {
        let events = vec![
            pid(1),
            fence(1),
            fence(1),
            pid(3),
            pid(2),
            pid(2),
            fence(2),
            pid(3),
            fence(3),
        ];

        let mut env = PipelineEnv::new(std::rc::Rc::new(Session::new()));
        let mut mutator: Box<dyn Mutator> = Box::new(InsertPidEvents::new());
        mutator.start(&mut env);
        let out: Vec<StreamEvent> = mutator.process(Box::new(events.into_iter())).collect();

        let pids: Vec<Option<pid_t>> = out
            .iter()
            .map(|e| match e.kind {
                EventKind::Pid(p) => Some(p),
                _ => None,
            })
            .collect();
        assert_eq!(pids, vec![Some(1), None, None, Some(2), None, Some(3), None]);
    }
}
