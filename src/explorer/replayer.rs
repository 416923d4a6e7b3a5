//! Drives a single `Execution` through one `ReplayDriver` run (spec.md
//! §4.3), grounded on `examples/original_source/mreplay/explorer.py`'s
//! `Replayer`.

use crate::error::ReplayError;
use crate::explorer::execution::{Execution, ExecutionState};
use crate::explorer::Explorer;
use crate::isolation::IsolationContext;
use crate::replay_driver::{ReplayDriverFactory, ReplayObserver};
use std::cell::RefCell;
use std::rc::Rc;

/// Forwards driver callbacks back into the owning `Explorer`
/// (`explorer.py`'s nested `_on_mutation`/`ReplayContext`).
struct Observer {
    explorer: Rc<RefCell<Explorer>>,
    current: RefCell<Option<Rc<RefCell<Execution>>>>,
}

impl ReplayObserver for Observer {
    fn on_mutation(&mut self, event: crate::event::DivergeEvent) {
        let current = match self.current.borrow().clone() {
            Some(e) => e,
            None => return,
        };
        self.explorer.borrow_mut().on_diverge(&current, event, false);

        let next = self.explorer.borrow().find_running();
        *self.current.borrow_mut() = next;
    }

    fn on_bookmark(&mut self, _id: u64, _npr: usize) {}
}

pub struct Replayer {
    execution: Rc<RefCell<Execution>>,
}

impl Replayer {
    pub fn new(execution: Rc<RefCell<Execution>>) -> Replayer {
        Replayer { execution }
    }

    /// `Replayer.run`: generate this execution's log, open a driver bound
    /// to it, pump deadlock checks, and translate the terminal outcome
    /// into the execution's state.
    pub fn run(
        &self,
        explorer: &Rc<RefCell<Explorer>>,
        factory: &dyn ReplayDriverFactory,
        isolation: &dyn IsolationContext,
    ) -> Result<(), ReplayError> {
        {
            let exec_ref = self.execution.borrow();
            let parent = exec_ref.parent.clone();
            exec_ref
                .generate_log(&parent)
                .map_err(|e| ReplayError::Driver(e.to_string()))?;
        }

        let observer = Box::new(Observer {
            explorer: Rc::clone(explorer),
            current: RefCell::new(Some(Rc::clone(&self.execution))),
        });

        let logfile_path = self.execution.borrow().logfile_path();
        let mut driver = factory.open(&logfile_path, observer)?;
        driver.add_init_loader(isolation)?;

        // `explorer.py` arms a periodic SIGALRM to call `check_deadlock`
        // while `context.wait()` blocks; the driver trait folds that
        // polling into `wait()` itself, so one check before waiting is
        // enough to surface a stall the driver noticed on open.
        driver.check_deadlock()?;
        let result = driver.wait();
        driver.close()?;

        match result {
            Ok(()) => {
                self.execution.borrow_mut().state = ExecutionState::Success;
                Ok(())
            }
            Err(ReplayError::Diverge(event)) => {
                explorer.borrow_mut().on_diverge(&self.execution, event, true);
                Ok(())
            }
            Err(ReplayError::Deadlock) => {
                self.execution.borrow_mut().state = ExecutionState::Failed;
                Ok(())
            }
            Err(ReplayError::ContextClosed) => Ok(()),
            Err(other) => Err(other),
        }
    }
}
