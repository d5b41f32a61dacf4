//! Scheduler: reschedule, ready transitions, and deferral
//!
//! The scheduling policy is strict priority with FIFO among equals. The one
//! asymmetry worth stating: the incumbent keeps the processor on a tie. A
//! reschedule only displaces the current process when the head of the ready
//! list is strictly higher priority, which together with FIFO insertion is
//! what gives equal-priority processes round-robin behavior under the clock.
//!
//! Deferral brackets (`defer_start` / `defer_stop`) let multi-wakeup
//! operations make several processes ready and pay for at most one context
//! switch when the bracket closes.

use ember_hal::Platform;

use crate::error::{KernelError, Result};
use crate::state::Kernel;
use crate::types::{Pid, Priority, ProcessState, QUANTUM};

/// Raw deferral request code: begin deferring rescheduling.
pub const DEFER_START: i32 = 1;

/// Raw deferral request code: stop deferring rescheduling.
pub const DEFER_STOP: i32 = 0;

impl<P: Platform> Kernel<P> {
    /// Pick the highest-priority ready process and switch to it.
    ///
    /// Must be called with interrupts disabled. If deferral is active this
    /// only records that a reschedule is wanted. If the current process is
    /// still runnable and at least as high priority as every ready process,
    /// it simply keeps running.
    pub(crate) fn reschedule(&mut self) -> Result<()> {
        if self.halted {
            return Ok(());
        }
        if self.defer_depth > 0 {
            self.defer_pending = true;
            return Ok(());
        }

        let old = self.current;
        if self.processes[old.0].state == ProcessState::Current {
            let highest_ready = self
                .queues
                .first_key(self.ready_list)?
                .unwrap_or(Priority::MIN);
            if self.processes[old.0].priority >= highest_ready {
                return Ok(());
            }
            // Displaced, not blocked: back onto the ready list behind its
            // priority peers.
            self.processes[old.0].state = ProcessState::Ready;
            let priority = self.processes[old.0].priority;
            self.queues.insert_by_key(old, self.ready_list, priority)?;
        }

        let next = match self.queues.dequeue(self.ready_list)? {
            Some(pid) => pid,
            // Current process blocked with nothing ready. Cannot happen while
            // the null process exists, since it is always runnable.
            None => return Ok(()),
        };

        self.current = next;
        self.processes[next.0].state = ProcessState::Current;
        self.preempt = QUANTUM;

        let to = self.processes[next.0].stack_pointer;
        let mut from = self.processes[old.0].stack_pointer;
        self.platform.context_switch(&mut from, to);
        self.processes[old.0].stack_pointer = from;
        Ok(())
    }

    /// Move a process to the ready state, insert it into the ready list by
    /// priority, and reschedule.
    ///
    /// Must be called with interrupts disabled; the caller vouches that the
    /// process exists and is not already on a list.
    pub(crate) fn set_ready(&mut self, pid: Pid) -> Result<()> {
        let slot = self.check_live_pid(pid)?;
        self.processes[slot].state = ProcessState::Ready;
        let priority = self.processes[slot].priority;
        self.queues.insert_by_key(pid, self.ready_list, priority)?;
        self.reschedule()
    }

    /// Begin deferring rescheduling. Brackets nest; the outermost start
    /// clears any stale pending flag.
    pub fn defer_start(&mut self) -> Result<()> {
        let mask = self.platform.disable_interrupts();
        let result = self.defer_start_locked();
        self.platform.restore_interrupts(mask);
        result
    }

    /// Stop deferring rescheduling. When the outermost bracket closes and a
    /// reschedule was requested in the interim, it runs now - once.
    pub fn defer_stop(&mut self) -> Result<()> {
        let mask = self.platform.disable_interrupts();
        let result = self.defer_stop_locked();
        self.platform.restore_interrupts(mask);
        result
    }

    /// Raw-code deferral entry point for callers holding a request word.
    pub fn resched_control(&mut self, request: i32) -> Result<()> {
        match request {
            DEFER_START => self.defer_start(),
            DEFER_STOP => self.defer_stop(),
            _ => Err(KernelError::DeferUnknownCommand),
        }
    }

    pub(crate) fn defer_start_locked(&mut self) -> Result<()> {
        if self.defer_depth == 0 {
            self.defer_pending = false;
        }
        self.defer_depth += 1;
        Ok(())
    }

    pub(crate) fn defer_stop_locked(&mut self) -> Result<()> {
        if self.defer_depth == 0 {
            return Err(KernelError::DeferHandling);
        }
        self.defer_depth -= 1;
        if self.defer_depth == 0 && self.defer_pending {
            self.defer_pending = false;
            self.reschedule()?;
        }
        Ok(())
    }
}
