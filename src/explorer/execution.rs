//! A single node in the exploration tree (spec.md §4.3 "Execution"),
//! grounded on `examples/original_source/mreplay/explorer.py`'s
//! `Execution`/`RootExecution`.

use crate::event::{EventId, StreamEvent};
use crate::mutator::cat_session::CatSession;
use crate::mutator::insert_event::InsertEvent;
use crate::mutator::replace::Replace;
use crate::mutator::set_flags::SetFlags;
use crate::mutator::{adjust_resources::AdjustResources, delete_event::DeleteEvent};
use crate::mutator::{insert_pid_events::InsertPidEvents, nop::Nop};
use crate::mutator::{pipe_boxed, to_raw_events::to_raw_events, Mutator, PipelineEnv};
use crate::session::{Location, LocationTarget, Session};
use crate::util::isqrt;
use libc::pid_t;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::rc::Rc;

/// x86-64 `exit`/`exit_group`. Deleting these entirely is almost always a
/// dead end, so it's heavily penalised (`explorer.py`'s `unistd.SYS_exit`
/// check in `Execution.__init__`).
const SYS_EXIT: &[i32] = &[60, 231];

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ExecutionState {
    Todo,
    Running,
    Success,
    Failed,
}

/// Integer-only score (spec.md §9 "Score arithmetic uses integers only").
/// `Unreachable` marks an execution the scorer has given up on entirely
/// (e.g. a pattern-forced mutation with no candidates), so it never gets
/// scheduled even if every other execution fails.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Score {
    Value(i64),
    Unreachable,
}

impl Score {
    pub fn as_i64(self) -> i64 {
        match self {
            Score::Value(v) => v,
            Score::Unreachable => i64::MIN,
        }
    }
}

/// What distinguishes one `Execution` from its parent: the single mutator
/// applied on top of the parent's whole chain (`explorer.py`'s
/// `Execution.__init__` dispatch on `mutation.__class__`).
#[derive(Clone)]
pub enum MutationKind {
    /// The unmutated root log, or the root with its init flags adjusted
    /// (`RootExecution`'s `Nop()`/`SetFlagsInit`).
    Root { set_flags: Option<u32>, init_pid: pid_t },
    Insert { location: Location, event: StreamEvent },
    Delete { starts: Vec<EventId> },
    Replace { target: EventId, replacement: StreamEvent },
}

impl MutationKind {
    fn sig_suffix(&self) -> &'static str {
        match self {
            MutationKind::Root { .. } => "",
            MutationKind::Insert { .. } => "+",
            MutationKind::Delete { .. } => "-",
            MutationKind::Replace { .. } => "+-",
        }
    }

    fn build(&self) -> Box<dyn Mutator> {
        match self.clone() {
            MutationKind::Root { set_flags: None, .. } => Box::new(Nop::new()),
            MutationKind::Root {
                set_flags: Some(flags),
                init_pid,
            } => Box::new(SetFlags::new(
                Location::after(LocationTarget::Start(init_pid)),
                flags,
                crate::event::FlagDuration::Permanent,
                None,
            )),
            MutationKind::Insert { location, event } => Box::new(InsertEvent::new(location, vec![event])),
            MutationKind::Delete { starts } => Box::new(DeleteEvent::new(starts)),
            MutationKind::Replace { target, replacement } => {
                let mut map = HashMap::new();
                map.insert(target, replacement);
                Box::new(Replace::new(map))
            }
        }
    }
}

pub struct Execution {
    pub id: u64,
    pub parent: Option<Rc<RefCell<Execution>>>,
    pub depth: i64,
    pub score: Score,
    pub mutation: MutationKind,
    pub state: ExecutionState,
    pub mutation_indices: HashMap<pid_t, usize>,
    pub sig_list: Vec<String>,
    pub sig: String,
    pub num_run: u32,
    pub num_success: u32,
    root_session: Rc<Session>,
    running_session: RefCell<Option<Rc<Session>>>,
    session_cache: RefCell<Option<Rc<Session>>>,
    mreplay_dir: Rc<PathBuf>,
    linear: bool,
    match_constant: i64,
    add_constant: i64,
    del_constant: i64,
}

impl Execution {
    /// `RootExecution.__init__`.
    #[allow(clippy::too_many_arguments)]
    pub fn root(
        id: u64,
        root_session: Rc<Session>,
        mreplay_dir: Rc<PathBuf>,
        on_the_fly: bool,
        var_io: bool,
        linear: bool,
        match_constant: i64,
        add_constant: i64,
        del_constant: i64,
    ) -> Execution {
        const SCRIBE_PS_STRICT_REPLAY: u32 = 1 << 0;
        const SCRIBE_PS_FIXED_IO: u32 = 1 << 1;

        let mut neg_flags = 0u32;
        if on_the_fly {
            neg_flags |= SCRIBE_PS_STRICT_REPLAY;
        }
        if var_io {
            neg_flags |= SCRIBE_PS_FIXED_IO;
        }
        let set_flags = if neg_flags != 0 {
            Some(u32::MAX & !neg_flags)
        } else {
            None
        };

        let init_pid = root_session.init_proc().pid;

        Execution {
            id,
            parent: None,
            depth: 0,
            score: Score::Value(0),
            mutation: MutationKind::Root { set_flags, init_pid },
            state: ExecutionState::Todo,
            mutation_indices: HashMap::new(),
            sig_list: Vec::new(),
            sig: String::new(),
            num_run: 0,
            num_success: 0,
            root_session,
            running_session: RefCell::new(None),
            session_cache: RefCell::new(None),
            mreplay_dir,
            linear,
            match_constant,
            add_constant,
            del_constant,
        }
    }

    /// `Execution.__init__` for a non-root node.
    pub fn child(
        id: u64,
        parent: &Rc<RefCell<Execution>>,
        mutation: MutationKind,
        state: ExecutionState,
        mutation_pid: pid_t,
        mutation_index: usize,
        running_session: Option<Rc<Session>>,
    ) -> Execution {
        let parent_ref = parent.borrow();

        let mut score = parent_ref.score.as_i64();
        let mut sacred = matches!(parent_ref.score, Score::Unreachable);
        let mut sig = parent_ref.sig.clone();

        match &mutation {
            MutationKind::Insert { event, .. } => {
                // Inserting an exit/exit_group is just as dead-ending as
                // deleting one: the rest of the recorded log past this point
                // becomes unreachable.
                if let Some(nr) = event.kind.syscall_nr() {
                    if SYS_EXIT.contains(&nr) {
                        sacred = true;
                    }
                }
                score += parent_ref.add_constant;
            }
            MutationKind::Delete { starts } => {
                if let Some(&last) = starts.last() {
                    if let Some(nr) = parent_ref.root_session.kind(last).syscall_nr() {
                        if SYS_EXIT.contains(&nr) {
                            sacred = true;
                        }
                    }
                }
                score += parent_ref.del_constant * starts.len() as i64 + parent_ref.match_constant;
            }
            MutationKind::Replace { .. } => {}
            MutationKind::Root { .. } => {}
        }
        sig.push_str(mutation.sig_suffix());

        let mut mutation_indices = parent_ref.mutation_indices.clone();
        mutation_indices.insert(mutation_pid, mutation_index);

        Execution {
            id,
            parent: Some(Rc::clone(parent)),
            depth: parent_ref.depth + 1,
            score: if sacred { Score::Unreachable } else { Score::Value(score) },
            mutation,
            state,
            mutation_indices,
            sig_list: parent_ref.sig_list.clone(),
            sig,
            num_run: 0,
            num_success: 0,
            root_session: Rc::clone(&parent_ref.root_session),
            running_session: RefCell::new(running_session),
            session_cache: RefCell::new(None),
            mreplay_dir: Rc::clone(&parent_ref.mreplay_dir),
            linear: parent_ref.linear,
            match_constant: parent_ref.match_constant,
            add_constant: parent_ref.add_constant,
            del_constant: parent_ref.del_constant,
        }
    }

    pub fn logfile_path(&self) -> PathBuf {
        self.mreplay_dir.join(self.id.to_string())
    }

    fn mutation_chain(&self, parent: &Option<Rc<RefCell<Execution>>>) -> Vec<MutationKind> {
        let mut chain = vec![self.mutation.clone()];
        let mut current = parent.clone();
        while let Some(node) = current {
            let node_ref = node.borrow();
            chain.push(node_ref.mutation.clone());
            current = node_ref.parent.clone();
        }
        chain.reverse();
        chain
    }

    /// `Execution.generate_log`: materialise this execution's whole
    /// ancestor chain of mutations into a concrete log file, idempotent
    /// per execution id.
    pub fn generate_log(&self, parent: &Option<Rc<RefCell<Execution>>>) -> io::Result<()> {
        let path = self.logfile_path();
        if path.exists() {
            return Ok(());
        }
        std::fs::create_dir_all(self.mreplay_dir.as_path())?;

        let chain = self.mutation_chain(parent);
        let mut pipeline: Box<dyn Mutator> = Box::new(CatSession::new(Rc::clone(&self.root_session)));
        for mutation in &chain {
            pipeline = pipe_boxed(pipeline, mutation.build());
        }
        pipeline = pipe_boxed(pipeline, Box::new(AdjustResources::new()));
        pipeline = pipe_boxed(pipeline, Box::new(InsertPidEvents::new()));

        let mut env = PipelineEnv::new(Rc::clone(&self.root_session));
        let events = crate::mutator::run(pipeline, &mut env, Box::new(std::iter::empty()));

        let mut file = File::create(&path)?;
        for bytes in to_raw_events(events.into_iter()) {
            file.write_all(&bytes)?;
        }
        Ok(())
    }

    /// `Execution.session`: the parsed result of this execution's own
    /// materialised log, cached for the lifetime of the execution.
    pub fn session(&self, parent: &Option<Rc<RefCell<Execution>>>) -> io::Result<Rc<Session>> {
        if let Some(s) = self.session_cache.borrow().as_ref() {
            return Ok(Rc::clone(s));
        }
        self.generate_log(parent)?;
        let parsed = Rc::new(Session::load(&self.logfile_path()).map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?);
        *self.session_cache.borrow_mut() = Some(Rc::clone(&parsed));
        Ok(parsed)
    }

    /// `Execution.running_session`: the session a live on-the-fly replay
    /// is already running against, if any, else this execution's own.
    pub fn running_session(&self, parent: &Option<Rc<RefCell<Execution>>>) -> io::Result<Rc<Session>> {
        if let Some(s) = self.running_session.borrow().as_ref() {
            return Ok(Rc::clone(s));
        }
        self.session(parent)
    }

    pub fn signature(&self) -> Vec<String> {
        let mut sig_list = self.sig_list.clone();
        sig_list.push(self.sig.clone());
        sig_list
    }

    /// `Execution.update_progress`: fold in how far this execution got
    /// past its last recorded progress point for `pid` before diverging
    /// again, using either linear or non-linear (sqrt) scoring.
    pub fn update_progress(&mut self, pid: pid_t, index: usize) {
        let baseline = *self.mutation_indices.get(&pid).unwrap_or(&0);
        let segment_length = index as i64 - baseline as i64;

        if segment_length > 0 {
            self.sig_list.push(self.sig.clone());
            self.sig.clear();
        }

        // A sacred-event penalty marks the whole subtree unreachable; later
        // progress on other pids must not resurrect it into a finite score.
        if self.score == Score::Unreachable {
            return;
        }

        let old_score = self.score.as_i64();
        let new_score = if self.linear {
            old_score + segment_length * self.match_constant
        } else {
            isqrt(old_score * old_score + segment_length * segment_length * self.match_constant)
        };
        self.score = Score::Value(new_score);
    }
}
