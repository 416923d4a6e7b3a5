use super::{EventStream, Mutator, PipelineEnv};
use crate::event::StreamEvent;
use crate::session::Session;
use std::rc::Rc;

/// Pipeline source that replays every event of a parsed `Session`: the
/// flat list's init event first, then each process's events in pid order
/// (`mutator/cat_session.py`). Captures the session into the pipeline env
/// so downstream stages can resolve `Location`s against it.
pub struct CatSession {
    session: Rc<Session>,
}

impl CatSession {
    pub fn new(session: Rc<Session>) -> CatSession {
        CatSession { session }
    }
}

impl Mutator for CatSession {
    fn start(&mut self, env: &mut PipelineEnv) {
        env.session = Rc::clone(&self.session);
    }

    fn process(self: Box<Self>, _input: EventStream) -> EventStream {
        let session = self.session;
        let procs: Vec<_> = session.processes.keys().copied().collect();

        let init_session = Rc::clone(&session);
        let init = init_session.events.get(0).map(move |id| {
            StreamEvent::from_session(init_session.kind(id).clone(), init_session.proc_of(id), id)
        });

        let rest = procs.into_iter().flat_map(move |pid| {
            let session = Rc::clone(&session);
            let ids: Vec<_> = session.processes[&pid].events.iter().collect();
            ids.into_iter().map(move |id| {
                let session = Rc::clone(&session);
                StreamEvent::from_session(session.kind(id).clone(), session.proc_of(id), id)
            })
        });

        Box::new(init.into_iter().chain(rest))
    }
}
