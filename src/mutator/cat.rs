use super::{EventStream, Mutator, PipelineEnv};
use crate::event::StreamEvent;

/// Pipeline source that simply replays a pre-built sequence of events
/// (`mutator/cat.py`).
pub struct Cat {
    events: Vec<StreamEvent>,
}

impl Cat {
    pub fn new(events: Vec<StreamEvent>) -> Cat {
        Cat { events }
    }
}

impl Mutator for Cat {
    fn start(&mut self, _env: &mut PipelineEnv) {}

    fn process(self: Box<Self>, _input: EventStream) -> EventStream {
        Box::new(self.events.into_iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use std::rc::Rc;

    #[test]
    fn replays_its_events_ignoring_any_upstream_input() {
        let events = vec![StreamEvent::synthetic(EventKind::Fence, 1)];
        let mut env = PipelineEnv::new(Rc::new(crate::session::Session::new()));
        let mut mutator: Box<dyn Mutator> = Box::new(Cat::new(events));
        mutator.start(&mut env);
        let out: Vec<StreamEvent> = mutator
            .process(Box::new(vec![StreamEvent::synthetic(EventKind::Rdtsc, 1)].into_iter()))
            .collect();
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0].kind, EventKind::Fence));
    }
}
