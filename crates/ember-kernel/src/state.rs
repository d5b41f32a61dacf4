//! Kernel state container
//!
//! All mutable scheduling state lives in one [`Kernel`] value: the process
//! table, the semaphore table, the node table, the identity of the current
//! process, and the rescheduling-deferral bookkeeping. Nothing is global;
//! the kernel is generic over a [`Platform`] collaborator that supplies the
//! machine-dependent pieces (interrupt masking, context switching, stack
//! memory).
//!
//! Public operations follow a uniform shape: disable interrupts, run the
//! operation body against the tables, restore the saved mask, return the
//! body's `Result`. Any value derived from mutable state (a priority, an id)
//! is read inside the masked region, never after.

use alloc::format;
use alloc::vec::Vec;

use ember_hal::{Platform, StackPointer, CONSOLE};

use crate::error::{KernelError, Result};
use crate::process::Process;
use crate::queue::QueueTable;
use crate::semaphore::Semaphore;
use crate::types::{
    Pid, Priority, ProcessName, ProcessState, Qid, SemaphoreState, Sid, MAX_PROCESSES,
    MIN_STACK_SIZE, PID_NULL, QUANTUM, SEMAPHORE_COUNT,
};

/// The scheduling core.
///
/// Owns every table the scheduler touches plus the platform collaborator.
/// One instance per system; constructed once by [`Kernel::boot`].
pub struct Kernel<P: Platform> {
    pub(crate) platform: P,
    /// Node table backing the ready list and all semaphore waiter lists
    pub(crate) queues: QueueTable,
    /// Fixed process table, slot 0 reserved for the null process
    pub(crate) processes: [Process; MAX_PROCESSES],
    /// Fixed semaphore table
    pub(crate) semaphores: [Semaphore; SEMAPHORE_COUNT],
    /// The process that owns the processor
    pub(crate) current: Pid,
    /// Ready list, ordered by descending priority
    pub(crate) ready_list: Qid,
    /// Rescheduling-deferral nesting depth
    pub(crate) defer_depth: usize,
    /// Whether a reschedule was requested while deferral was active
    pub(crate) defer_pending: bool,
    /// Live (non-free) process table slots, the null process included
    pub(crate) active_count: usize,
    /// Clock ticks remaining in the current process's time slice
    pub(crate) preempt: u32,
    /// Rotating cursor for process id allocation
    pub(crate) next_pid: usize,
    /// Rotating cursor for semaphore id allocation
    pub(crate) next_sem: usize,
    /// Set once the last user process exits; scheduling stops afterwards
    pub(crate) halted: bool,
}

impl<P: Platform> Kernel<P> {
    /// Bring the system up: allocate the ready list and one waiter list per
    /// semaphore slot, then install the null process as the current process.
    ///
    /// The null process has priority 0 so any created process outranks it,
    /// and it is never suspended or killed - it is what runs when nothing
    /// else can.
    pub fn boot(platform: P) -> Result<Self> {
        let mut queues = QueueTable::new();
        let ready_list = queues.alloc_queue()?;

        let mut waiter_lists = [Qid(0); SEMAPHORE_COUNT];
        for list in waiter_lists.iter_mut() {
            *list = queues.alloc_queue()?;
        }
        let semaphores = core::array::from_fn(|i| Semaphore::new(waiter_lists[i]));

        let null_stack_len = platform.round_stack_size(MIN_STACK_SIZE);
        let null_stack = platform.alloc_stack(null_stack_len)?;

        let mut processes: [Process; MAX_PROCESSES] = core::array::from_fn(|_| Process::free());
        processes[PID_NULL.0] = Process {
            state: ProcessState::Current,
            priority: 0,
            stack_pointer: StackPointer(null_stack.0 + null_stack_len),
            stack_base: null_stack,
            stack_len: null_stack_len,
            name: ProcessName::new("prnull"),
            semaphore: None,
            parent: PID_NULL,
            pending_message: None,
            devices: [CONSOLE; crate::types::DEVICE_SLOTS],
        };

        platform.debug_write("[kernel] boot complete, null process running");

        Ok(Self {
            platform,
            queues,
            processes,
            semaphores,
            current: PID_NULL,
            ready_list,
            defer_depth: 0,
            defer_pending: false,
            active_count: 1,
            preempt: QUANTUM,
            next_pid: PID_NULL.0 + 1,
            next_sem: 0,
            halted: false,
        })
    }

    // =========================================================================
    // Validation helpers
    // =========================================================================

    /// Index of a process table slot that currently holds a live process.
    pub(crate) fn check_live_pid(&self, pid: Pid) -> Result<usize> {
        if pid.0 >= MAX_PROCESSES || self.processes[pid.0].state == ProcessState::Free {
            return Err(KernelError::BadProcessId);
        }
        Ok(pid.0)
    }

    /// Index of a semaphore table slot that currently holds a live semaphore.
    pub(crate) fn check_live_sid(&self, sid: Sid) -> Result<usize> {
        if sid.0 >= SEMAPHORE_COUNT {
            return Err(KernelError::BadSemaphoreId);
        }
        if self.semaphores[sid.0].state != SemaphoreState::Used {
            return Err(KernelError::BadSemaphoreState);
        }
        Ok(sid.0)
    }

    // =========================================================================
    // Inspection (read-only; used by callers and tests)
    // =========================================================================

    /// Id of the process that owns the processor.
    pub fn current_pid(&self) -> Pid {
        self.current
    }

    /// Process table entry, if the id is in range.
    pub fn process(&self, pid: Pid) -> Option<&Process> {
        self.processes.get(pid.0)
    }

    /// Semaphore table entry, if the id is in range.
    pub fn semaphore(&self, sid: Sid) -> Option<&Semaphore> {
        self.semaphores.get(sid.0)
    }

    /// Live process count, the null process included.
    pub fn active_count(&self) -> usize {
        self.active_count
    }

    /// Whether the last user process has exited.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Ticks left in the current process's time slice.
    pub fn preemption(&self) -> u32 {
        self.preempt
    }

    /// Snapshot of the ready list: `(pid, priority)` from highest to lowest.
    pub fn ready_members(&self) -> Vec<(Pid, Priority)> {
        self.queues.members(self.ready_list).unwrap_or_default()
    }

    /// Snapshot of a semaphore's waiter list, head (oldest) first.
    pub fn semaphore_waiters(&self, sid: Sid) -> Vec<Pid> {
        self.semaphores
            .get(sid.0)
            .and_then(|sem| self.queues.members(sem.queue).ok())
            .map(|members| members.into_iter().map(|(pid, _)| pid).collect())
            .unwrap_or_default()
    }

    /// Borrow the platform collaborator, for callers that need direct access
    /// (device drivers, test assertions).
    pub fn platform(&self) -> &P {
        &self.platform
    }

    // =========================================================================
    // Clock
    // =========================================================================

    /// Called once per clock tick by the timer interrupt handler. Burns one
    /// tick of the current time slice and forces a reschedule when it runs
    /// out, so equal-priority processes round-robin.
    pub fn clock_tick(&mut self) -> Result<()> {
        let mask = self.platform.disable_interrupts();
        let result = self.clock_tick_locked();
        self.platform.restore_interrupts(mask);
        result
    }

    fn clock_tick_locked(&mut self) -> Result<()> {
        if self.halted {
            return Ok(());
        }
        if self.preempt > 0 {
            self.preempt -= 1;
        }
        if self.preempt == 0 {
            self.preempt = QUANTUM;
            self.reschedule()?;
        }
        Ok(())
    }
}

impl<P: Platform> core::fmt::Debug for Kernel<P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&format!(
            "Kernel {{ current: {}, active: {}, defer: {}/{}, halted: {} }}",
            self.current.0, self.active_count, self.defer_depth, self.defer_pending, self.halted
        ))
    }
}
