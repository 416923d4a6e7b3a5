//! Streaming mutation pipeline (spec.md §4.2).
//!
//! Mirrors `examples/original_source/mreplay/mutator/mutator.py`: a
//! `Mutator` transforms a whole lazy stream of `StreamEvent`s into another
//! lazy stream via `process`, and pipelines chain two mutators' `process`
//! calls end to end (`mutator/pipe.py`'s `Pipe`). Built with `pipe_boxed`,
//! the Rust analogue of the Python `__or__`-based composition.

pub mod adjust_resources;
pub mod bookmark;
pub mod cat;
pub mod cat_session;
pub mod delete_event;
pub mod delete_syscall;
pub mod ignore_syscall;
pub mod insert_event;
pub mod insert_eoq_events;
pub mod insert_pid_events;
pub mod location_matcher;
pub mod nop;
pub mod replace;
pub mod set_flags;
pub mod split_on_bookmark;
pub mod to_raw_events;
pub mod truncate_queue;

use crate::event::StreamEvent;
use crate::session::Session;
use std::rc::Rc;

pub type EventStream = Box<dyn Iterator<Item = StreamEvent>>;

/// State threaded through a pipeline at `start()` time: the bookmark-id
/// counter (spec.md §3 "Bookmark") and the parsed `Session` being mutated,
/// needed by any stage that resolves a `Location` against the canonical
/// event graph (`mutator/mutator.py`'s `self.session`, set via `__ror__`
/// when a `Session` starts the pipe).
pub struct PipelineEnv {
    pub session: Rc<Session>,
    next_bookmark_id: u64,
}

impl PipelineEnv {
    pub fn new(session: Rc<Session>) -> PipelineEnv {
        PipelineEnv {
            session,
            next_bookmark_id: 0,
        }
    }

    pub fn next_bookmark_id(&mut self) -> u64 {
        let id = self.next_bookmark_id;
        self.next_bookmark_id += 1;
        id
    }
}

/// A pipeline stage (spec.md §4.2 "Mutator"). `process` is pull-based: it
/// wraps `input` in whatever lazy adapter the stage needs and returns the
/// result without eagerly consuming it. `start` runs once per stage, in
/// pipeline order, before the first pull.
pub trait Mutator {
    fn start(&mut self, env: &mut PipelineEnv);
    fn process(self: Box<Self>, input: EventStream) -> EventStream;
}

/// Two mutators chained so `downstream.process` wraps `upstream.process`'s
/// output (`mutator/pipe.py`'s `Pipe`).
pub struct Pipe {
    upstream: Box<dyn Mutator>,
    downstream: Box<dyn Mutator>,
}

impl Mutator for Pipe {
    fn start(&mut self, env: &mut PipelineEnv) {
        self.upstream.start(env);
        self.downstream.start(env);
    }

    fn process(self: Box<Self>, input: EventStream) -> EventStream {
        let me = *self;
        me.downstream.process(me.upstream.process(input))
    }
}

/// Compose two already-boxed stages, for code building a pipeline in a
/// loop over a dynamically-sized list of mutations (e.g. `Execution`
/// replaying its whole ancestor chain).
pub fn pipe_boxed(upstream: Box<dyn Mutator>, downstream: Box<dyn Mutator>) -> Box<dyn Mutator> {
    Box::new(Pipe { upstream, downstream })
}

/// Run a fully composed pipeline: `start` every stage, then pull the
/// resulting stream to completion into a `Vec` (`mutator.py`'s `__iter__`).
pub fn run(mut pipeline: Box<dyn Mutator>, env: &mut PipelineEnv, source: EventStream) -> Vec<StreamEvent> {
    pipeline.start(env);
    pipeline.process(source).collect()
}
