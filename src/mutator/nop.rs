use super::{EventStream, Mutator, PipelineEnv};

/// Identity stage: passes the stream through unchanged. Used for
/// `RootExecution` when no init flags need setting (`mutator.Nop()` in
/// `explorer.py`; not present in the retrieved distillation but implied by
/// `mutator/__init__.py`'s `from nop import Nop`).
pub struct Nop;

impl Nop {
    pub fn new() -> Nop {
        Nop
    }
}

impl Mutator for Nop {
    fn start(&mut self, _env: &mut PipelineEnv) {}

    fn process(self: Box<Self>, input: EventStream) -> EventStream {
        input
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventKind, StreamEvent};
    use std::rc::Rc;

    #[test]
    fn passes_the_stream_through_unchanged() {
        let events = vec![
            StreamEvent::synthetic(EventKind::Fence, 1),
            StreamEvent::synthetic(EventKind::Rdtsc, 1),
        ];
        let mut env = PipelineEnv::new(Rc::new(crate::session::Session::new()));
        let mut mutator: Box<dyn Mutator> = Box::new(Nop::new());
        mutator.start(&mut env);
        let out: Vec<StreamEvent> = mutator.process(Box::new(events.into_iter())).collect();
        assert_eq!(out.len(), 2);
        assert!(matches!(out[0].kind, EventKind::Fence));
        assert!(matches!(out[1].kind, EventKind::Rdtsc));
    }
}
