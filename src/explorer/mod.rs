//! Priority-driven search over `Execution` nodes (spec.md §4.2), grounded
//! on `examples/original_source/mreplay/explorer.py`'s `Explorer`.

pub mod diverge_handler;
pub mod execution;
pub mod replayer;

use crate::config::ExplorerConfig;
use crate::error::ReplayError;
use crate::event::DivergeEvent;
use crate::event::DivergeKind;
use crate::isolation::{IsolationContext, Jailed, Unisolated};
use crate::replay_driver::ReplayDriverFactory;
use crate::session::Session;
use crate::log::LogLevel;
use execution::{Execution, ExecutionState};
use nix::sys::signal::{self, SigHandler, Signal};
use replayer::Replayer;
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Node plus the parent edge needed to walk its mutation chain
/// (`mutation_chain`/`session` on `Execution` take the parent explicitly
/// rather than storing a second strong reference to it on themselves).
struct Node {
    execution: Rc<RefCell<Execution>>,
}

pub struct Explorer {
    config: ExplorerConfig,
    mreplay_dir: Rc<PathBuf>,
    nodes: Vec<Node>,
    next_id: u64,
    num_run: u32,
}

impl Explorer {
    /// `Explorer.__init__` + `make_mreplay_dir` + `RootExecution`.
    pub fn new(config: ExplorerConfig, root_session: Rc<Session>) -> std::io::Result<Rc<RefCell<Explorer>>> {
        let mreplay_dir = Rc::new(PathBuf::from("/tmp/mreplay"));
        if mreplay_dir.exists() {
            std::fs::remove_dir_all(mreplay_dir.as_path())?;
        }
        std::fs::create_dir_all(mreplay_dir.as_path())?;

        let on_the_fly = config.on_the_fly;
        let var_io = config.var_io;
        let linear = config.linear;
        let match_constant = config.match_constant;
        let add_constant = config.add_constant;
        let del_constant = config.del_constant;

        let root = Execution::root(
            0,
            root_session,
            Rc::clone(&mreplay_dir),
            on_the_fly,
            var_io,
            linear,
            match_constant,
            add_constant,
            del_constant,
        );

        let explorer = Rc::new(RefCell::new(Explorer {
            config,
            mreplay_dir,
            nodes: Vec::new(),
            next_id: 1,
            num_run: 0,
        }));

        let root_node = Rc::new(RefCell::new(root));
        explorer.borrow_mut().add_execution(None, root_node);
        Ok(explorer)
    }

    fn get_new_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// `Explorer.add_execution`: drop the candidate if a TODO execution
    /// with an identical signature already exists, otherwise enqueue it.
    fn add_execution(&mut self, parent: Option<&Rc<RefCell<Execution>>>, child: Rc<RefCell<Execution>>) {
        let is_todo = child.borrow().state == ExecutionState::Todo;
        if is_todo {
            let sig = child.borrow().signature();
            let duplicate = self
                .nodes
                .iter()
                .any(|n| n.execution.borrow().state == ExecutionState::Todo && n.execution.borrow().signature() == sig);
            if duplicate {
                if let Some(parent) = parent {
                    crate::log!(
                        LogLevel::LogInfo,
                        "[{}] NOT adding [{}], duplicate signature",
                        parent.borrow().id,
                        child.borrow().id
                    );
                }
                return;
            }
        }
        if let Some(parent) = parent {
            crate::log!(
                LogLevel::LogInfo,
                "[{}] Adding [{}], score {:?}",
                parent.borrow().id,
                child.borrow().id,
                child.borrow().score
            );
        }
        self.nodes.push(Node { execution: child });
    }

    fn num_state(&self, state: ExecutionState) -> usize {
        self.nodes.iter().filter(|n| n.execution.borrow().state == state).count()
    }

    fn print_status(&self) {
        crate::log!(LogLevel::LogInfo, "{}", "-".repeat(80));
        crate::log!(
            LogLevel::LogInfo,
            "Success: {}, Failed: {}, Todo: {}",
            self.num_state(ExecutionState::Success),
            self.num_state(ExecutionState::Failed),
            self.num_state(ExecutionState::Todo)
        );
        crate::log!(LogLevel::LogInfo, "{}", "-".repeat(80));
    }

    pub(crate) fn find_running(&self) -> Option<Rc<RefCell<Execution>>> {
        self.nodes
            .iter()
            .find(|n| n.execution.borrow().state == ExecutionState::Running)
            .map(|n| Rc::clone(&n.execution))
    }

    fn max_todo(&self) -> Option<Rc<RefCell<Execution>>> {
        self.nodes
            .iter()
            .filter(|n| n.execution.borrow().state == ExecutionState::Todo)
            .max_by_key(|n| n.execution.borrow().score.as_i64())
            .map(|n| Rc::clone(&n.execution))
    }

    fn user_pattern_at(&self, depth: i64) -> Option<char> {
        let pattern = self.config.normalized_pattern()?;
        let chars: Vec<char> = pattern.chars().collect();
        let idx = usize::try_from(depth).ok()?;
        let c = *chars.get(idx)?;
        if c == '.' {
            None
        } else {
            Some(c)
        }
    }

    /// `Execution.diverged` / `DivergeHandler`: compute which event the
    /// divergence actually points at, update scoring, and enqueue every
    /// candidate mutation `diverge_handler::handle` proposes.
    pub(crate) fn on_diverge(&mut self, execution: &Rc<RefCell<Execution>>, event: DivergeEvent, fatal: bool) {
        let pid = event.pid;
        let mut num = event.num_ev_consumed.saturating_sub(1);
        if !fatal {
            if matches!(event.kind, DivergeKind::Syscall { .. } | DivergeKind::MemOwned { .. }) {
                num += 1;
            }
        }
        if matches!(event.kind, DivergeKind::DataContent { .. }) {
            num += 1;
        }

        execution.borrow_mut().update_progress(pid, num);
        execution.borrow_mut().state = ExecutionState::Failed;

        let parent = execution.borrow().parent.clone();
        let session = match execution.borrow().running_session(&parent) {
            Ok(s) => s,
            Err(_) => return,
        };

        let culprit = match session.processes.get(&pid).and_then(|p| p.events.get(num)) {
            Some(e) => e,
            None => return,
        };
        let syscall = session.syscall_of(culprit);

        let depth = execution.borrow().depth;
        let user_pattern = self.user_pattern_at(depth);

        let candidates = diverge_handler::handle(
            &session,
            pid,
            culprit,
            syscall,
            &event.kind,
            fatal,
            user_pattern,
            self.config.max_delete,
        );

        for candidate in candidates {
            let running_session = match candidate.state {
                ExecutionState::Running => Some(Rc::clone(&session)),
                _ => None,
            };
            let child = Execution::child(
                self.get_new_id(),
                execution,
                candidate.mutation,
                candidate.state,
                candidate.mutation_pid,
                candidate.mutation_index,
                running_session,
            );
            self.add_execution(Some(execution), Rc::new(RefCell::new(child)));
        }
    }

    fn open_isolation(&self) -> Box<dyn IsolationContext> {
        if self.config.isolate {
            Box::new(Jailed::new(PathBuf::from("/"), None).expect("failed to prepare jail scratch dirs"))
        } else {
            Box::new(Unisolated)
        }
    }

    /// `Explorer.run`: repeatedly replay the highest-scoring TODO
    /// execution until `num_success_to_stop` successes are reached, no
    /// TODO executions remain, or the user sends SIGINT
    /// (`explorer.py`'s `signal.signal(SIGINT, do_stop)`).
    pub fn run(explorer: &Rc<RefCell<Explorer>>, factory: &dyn ReplayDriverFactory) -> Result<(), ReplayError> {
        STOP_REQUESTED.store(false, Ordering::SeqCst);
        let previous = unsafe { signal::signal(Signal::SIGINT, SigHandler::Handler(request_stop)) };

        let result = Explorer::run_loop(explorer, factory);

        if let Ok(previous) = previous {
            unsafe {
                let _ = signal::signal(Signal::SIGINT, previous);
            }
        }
        result
    }

    fn run_loop(explorer: &Rc<RefCell<Explorer>>, factory: &dyn ReplayDriverFactory) -> Result<(), ReplayError> {
        loop {
            if STOP_REQUESTED.load(Ordering::SeqCst) {
                crate::log!(LogLevel::LogInfo, "Stop Requested");
                break;
            }
            let stop = explorer.borrow().num_state(ExecutionState::Success) >= explorer.borrow().config.num_success_to_stop as usize;
            if stop {
                break;
            }
            let execution = match explorer.borrow().max_todo() {
                Some(e) => e,
                None => break,
            };
            explorer.borrow().print_status();

            let mut isolation = explorer.borrow().open_isolation();
            isolation.open().map_err(|e| ReplayError::Driver(e.to_string()))?;
            explorer.borrow_mut().num_run += 1;
            let num_run = explorer.borrow().num_run;
            execution.borrow_mut().num_run = num_run;
            execution.borrow_mut().state = ExecutionState::Running;

            let replayer = Replayer::new(Rc::clone(&execution));
            replayer.run(explorer, factory, isolation.as_mut())?;
            isolation.close().ok();
        }

        explorer.borrow().print_status();
        crate::log!(LogLevel::LogInfo, "Number of Replays: {}", explorer.borrow().num_run);
        Ok(())
    }
}

static STOP_REQUESTED: AtomicBool = AtomicBool::new(false);

extern "C" fn request_stop(_signum: libc::c_int) {
    STOP_REQUESTED.store(true, Ordering::SeqCst);
}
