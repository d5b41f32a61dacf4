//! Counting semaphores
//!
//! Each semaphore is a count plus a FIFO waiter list. The count encodes the
//! waiter population: a negative count means exactly that many processes are
//! blocked on the list, a non-negative count means the list is empty. Every
//! transition below preserves that relationship.
//!
//! Delete and reset wake every waiter; they bracket the drain in a
//! rescheduling deferral so the batch costs at most one context switch.

use ember_hal::Platform;

use crate::error::{KernelError, Result};
use crate::state::Kernel;
use crate::types::{ProcessState, Qid, SemaphoreState, Sid, SEMAPHORE_COUNT};

/// One semaphore table entry.
#[derive(Clone, Copy, Debug)]
pub struct Semaphore {
    /// Whether the slot holds a live semaphore
    pub state: SemaphoreState,
    /// Semaphore count; negative magnitude equals the waiter population
    pub count: i32,
    /// Waiter list, allocated once at boot and reused across create/delete
    pub queue: Qid,
}

impl Semaphore {
    /// A free slot bound to its permanent waiter list.
    pub fn new(queue: Qid) -> Self {
        Self {
            state: SemaphoreState::Free,
            count: 0,
            queue,
        }
    }
}

impl<P: Platform> Kernel<P> {
    /// Claim a free semaphore slot with the given initial count.
    pub fn create_semaphore(&mut self, initial_count: i32) -> Result<Sid> {
        let mask = self.platform.disable_interrupts();
        let result = self.create_semaphore_locked(initial_count);
        self.platform.restore_interrupts(mask);
        result
    }

    fn create_semaphore_locked(&mut self, initial_count: i32) -> Result<Sid> {
        if initial_count < 0 {
            return Err(KernelError::NegativeSemaphoreCount);
        }
        let sid = self.alloc_sid()?;
        self.semaphores[sid.0].state = SemaphoreState::Used;
        self.semaphores[sid.0].count = initial_count;
        Ok(sid)
    }

    /// Claim the next free semaphore slot, scanning from a rotating cursor.
    fn alloc_sid(&mut self) -> Result<Sid> {
        for _ in 0..SEMAPHORE_COUNT {
            let slot = self.next_sem;
            self.next_sem = (self.next_sem + 1) % SEMAPHORE_COUNT;
            if self.semaphores[slot].state == SemaphoreState::Free {
                return Ok(Sid(slot));
            }
        }
        Err(KernelError::SemaphoreIdAllocationFailed)
    }

    /// Decrement the count; if it goes negative the current process joins
    /// the waiter list and gives up the processor.
    pub fn semaphore_wait(&mut self, sid: Sid) -> Result<()> {
        let mask = self.platform.disable_interrupts();
        let result = self.semaphore_wait_locked(sid);
        self.platform.restore_interrupts(mask);
        result
    }

    fn semaphore_wait_locked(&mut self, sid: Sid) -> Result<()> {
        let slot = self.check_live_sid(sid)?;
        self.semaphores[slot].count -= 1;
        if self.semaphores[slot].count < 0 {
            let current = self.current;
            self.processes[current.0].state = ProcessState::WaitingSemaphore;
            self.processes[current.0].semaphore = Some(sid);
            self.queues.enqueue(current, self.semaphores[slot].queue)?;
            self.reschedule()?;
        }
        Ok(())
    }

    /// Increment the count; if a process is waiting, the oldest waiter is
    /// made ready instead of the count going up for nothing.
    ///
    /// The waiter test reads the count before the increment: a negative
    /// count is the waiter population, so the wakeup and the increment
    /// happen together and the count/list relationship holds.
    pub fn semaphore_signal(&mut self, sid: Sid) -> Result<()> {
        let mask = self.platform.disable_interrupts();
        let result = self.semaphore_signal_locked(sid);
        self.platform.restore_interrupts(mask);
        result
    }

    fn semaphore_signal_locked(&mut self, sid: Sid) -> Result<()> {
        let slot = self.check_live_sid(sid)?;
        if self.semaphores[slot].count < 0 {
            if let Some(pid) = self.queues.dequeue(self.semaphores[slot].queue)? {
                self.semaphores[slot].count += 1;
                self.processes[pid.0].semaphore = None;
                self.set_ready(pid)?;
                return Ok(());
            }
        }
        self.semaphores[slot].count += 1;
        Ok(())
    }

    /// Destroy a semaphore, waking every waiter. The waiters resume as if
    /// their wait was satisfied; the slot becomes reusable.
    pub fn delete_semaphore(&mut self, sid: Sid) -> Result<()> {
        let mask = self.platform.disable_interrupts();
        let result = self.delete_semaphore_locked(sid);
        self.platform.restore_interrupts(mask);
        result
    }

    fn delete_semaphore_locked(&mut self, sid: Sid) -> Result<()> {
        let slot = self.check_live_sid(sid)?;
        self.semaphores[slot].state = SemaphoreState::Free;

        self.defer_start_locked()?;
        while self.semaphores[slot].count < 0 {
            self.semaphores[slot].count += 1;
            if let Some(pid) = self.queues.dequeue(self.semaphores[slot].queue)? {
                self.processes[pid.0].semaphore = None;
                self.set_ready(pid)?;
            }
        }
        self.semaphores[slot].count = 0;
        self.defer_stop_locked()?;
        Ok(())
    }

    /// Wake every waiter and reinitialize the count in one atomic step.
    pub fn reset_semaphore(&mut self, sid: Sid, count: i32) -> Result<()> {
        let mask = self.platform.disable_interrupts();
        let result = self.reset_semaphore_locked(sid, count);
        self.platform.restore_interrupts(mask);
        result
    }

    fn reset_semaphore_locked(&mut self, sid: Sid, count: i32) -> Result<()> {
        if count < 0 {
            return Err(KernelError::NegativeSemaphoreCount);
        }
        let slot = self.check_live_sid(sid)?;

        self.defer_start_locked()?;
        while let Some(pid) = self.queues.dequeue(self.semaphores[slot].queue)? {
            self.processes[pid.0].semaphore = None;
            self.set_ready(pid)?;
        }
        self.semaphores[slot].count = count;
        self.defer_stop_locked()?;
        Ok(())
    }

    /// A live semaphore's current count, read under the interrupt mask.
    pub fn semaphore_count(&self, sid: Sid) -> Result<i32> {
        let mask = self.platform.disable_interrupts();
        let result = self.semaphore_count_locked(sid);
        self.platform.restore_interrupts(mask);
        result
    }

    fn semaphore_count_locked(&self, sid: Sid) -> Result<i32> {
        let slot = self.check_live_sid(sid)?;
        Ok(self.semaphores[slot].count)
    }
}
