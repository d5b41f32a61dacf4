//! Process lifecycle: create, resume, suspend, kill, priority control
//!
//! Every process is a fixed slot in the kernel's process table. Creation
//! builds a suspended process with a freshly allocated stack and a synthetic
//! initial context; the process does not run until it is resumed. Teardown
//! notifies the parent, releases the stack and device handles, and detaches
//! the process from whatever list or semaphore it was blocked on before
//! freeing the slot.

use alloc::format;

use ember_hal::{DeviceHandle, EntryPoint, Platform, StackBase, StackPointer, CONSOLE};

use crate::error::{KernelError, Result};
use crate::state::Kernel;
use crate::types::{
    Message, Pid, Priority, ProcessName, ProcessState, Sid, DEVICE_SLOTS, MAX_PROCESSES,
    MIN_STACK_SIZE, PID_NULL,
};

/// One process table entry.
#[derive(Clone, Debug)]
pub struct Process {
    /// Lifecycle state
    pub state: ProcessState,
    /// Scheduling priority; higher runs first
    pub priority: Priority,
    /// Saved stack pointer while the process is not running
    pub stack_pointer: StackPointer,
    /// Base of the process's stack allocation
    pub stack_base: StackBase,
    /// Length of the stack allocation in bytes
    pub stack_len: usize,
    /// Human-readable name, for diagnostics
    pub name: ProcessName,
    /// Semaphore the process is blocked on, while `WaitingSemaphore`
    pub semaphore: Option<Sid>,
    /// Process that created this one; notified when it exits
    pub parent: Pid,
    /// Single-slot mailbox
    pub pending_message: Option<Message>,
    /// Per-process device descriptors (stdin, stdout, stderr)
    pub devices: [DeviceHandle; DEVICE_SLOTS],
}

impl Process {
    /// An unclaimed table slot.
    pub fn free() -> Self {
        Self {
            state: ProcessState::Free,
            priority: 0,
            stack_pointer: StackPointer(0),
            stack_base: StackBase(0),
            stack_len: 0,
            name: ProcessName::empty(),
            semaphore: None,
            parent: PID_NULL,
            pending_message: None,
            devices: [CONSOLE; DEVICE_SLOTS],
        }
    }
}

impl<P: Platform> Kernel<P> {
    /// Create a suspended process.
    ///
    /// The stack request is clamped to [`MIN_STACK_SIZE`] and rounded per the
    /// platform's alignment rule. The platform builds the initial stack image
    /// so that a context switch into the new process enters `entry` with
    /// `args` and falls into the exit trampoline on return. The creator
    /// becomes the parent.
    pub fn create(
        &mut self,
        entry: EntryPoint,
        stack_size: usize,
        priority: Priority,
        name: &str,
        args: &[usize],
    ) -> Result<Pid> {
        let mask = self.platform.disable_interrupts();
        let result = self.create_locked(entry, stack_size, priority, name, args);
        self.platform.restore_interrupts(mask);
        result
    }

    fn create_locked(
        &mut self,
        entry: EntryPoint,
        stack_size: usize,
        priority: Priority,
        name: &str,
        args: &[usize],
    ) -> Result<Pid> {
        if priority < 1 {
            return Err(KernelError::BadPriority);
        }
        let stack_len = self.platform.round_stack_size(stack_size.max(MIN_STACK_SIZE));
        let pid = self.alloc_pid()?;
        let stack_base = self
            .platform
            .alloc_stack(stack_len)
            .map_err(|_| KernelError::StackAllocationFailed)?;

        self.active_count += 1;
        let stack_pointer = self
            .platform
            .build_initial_context(stack_base, stack_len, entry, args);

        self.processes[pid.0] = Process {
            state: ProcessState::Suspended,
            priority,
            stack_pointer,
            stack_base,
            stack_len,
            name: ProcessName::new(name),
            semaphore: None,
            parent: self.current,
            pending_message: None,
            devices: [CONSOLE; DEVICE_SLOTS],
        };

        self.platform.debug_write(&format!(
            "[kernel] created process {} '{}' priority {}",
            pid.0, name, priority
        ));
        Ok(pid)
    }

    /// Claim the next free process table slot, scanning from a rotating
    /// cursor so ids are not reused immediately.
    fn alloc_pid(&mut self) -> Result<Pid> {
        for _ in 0..MAX_PROCESSES {
            let slot = self.next_pid;
            self.next_pid = (self.next_pid + 1) % MAX_PROCESSES;
            if self.processes[slot].state == ProcessState::Free {
                return Ok(Pid(slot));
            }
        }
        Err(KernelError::ProcessIdAllocationFailed)
    }

    /// Take a suspended process out of hibernation and make it eligible to
    /// run. Returns the priority it was resumed at, read before the process
    /// can run and change it.
    pub fn resume(&mut self, pid: Pid) -> Result<Priority> {
        let mask = self.platform.disable_interrupts();
        let result = self.resume_locked(pid);
        self.platform.restore_interrupts(mask);
        result
    }

    fn resume_locked(&mut self, pid: Pid) -> Result<Priority> {
        let slot = self.check_live_pid(pid)?;
        if self.processes[slot].state != ProcessState::Suspended {
            return Err(KernelError::BadProcessState);
        }
        let priority = self.processes[slot].priority;
        self.set_ready(pid)?;
        Ok(priority)
    }

    /// Place a ready or current process in hibernation. Returns its
    /// priority. The null process cannot be suspended.
    pub fn suspend(&mut self, pid: Pid) -> Result<Priority> {
        let mask = self.platform.disable_interrupts();
        let result = self.suspend_locked(pid);
        self.platform.restore_interrupts(mask);
        result
    }

    fn suspend_locked(&mut self, pid: Pid) -> Result<Priority> {
        if pid == PID_NULL {
            return Err(KernelError::BadProcessId);
        }
        let slot = self.check_live_pid(pid)?;
        match self.processes[slot].state {
            ProcessState::Ready => {
                self.queues.unlink(pid)?;
                self.processes[slot].state = ProcessState::Suspended;
            }
            ProcessState::Current => {
                self.processes[slot].state = ProcessState::Suspended;
                self.reschedule()?;
            }
            _ => return Err(KernelError::BadProcessState),
        }
        Ok(self.processes[slot].priority)
    }

    /// Destroy a process and release everything it holds.
    ///
    /// Teardown order: notify the parent, close devices, release the stack,
    /// then detach from scheduler structures according to the victim's state,
    /// and finally free the slot. If this was the last user process the
    /// platform's completion handler runs instead and scheduling stops.
    pub fn kill(&mut self, pid: Pid) -> Result<()> {
        let mask = self.platform.disable_interrupts();
        let result = self.kill_locked(pid);
        self.platform.restore_interrupts(mask);
        result
    }

    fn kill_locked(&mut self, pid: Pid) -> Result<()> {
        if pid == PID_NULL {
            return Err(KernelError::BadProcessId);
        }
        let slot = self.check_live_pid(pid)?;

        self.active_count -= 1;
        if self.active_count <= 1 {
            self.platform
                .debug_write("[kernel] last user process exited");
            self.platform.system_done();
            self.halted = true;
            return Ok(());
        }

        // The parent may not be receiving; an undeliverable notification is
        // not an error here.
        let parent = self.processes[slot].parent;
        let _ = self.send_message_locked(parent, pid.0 as Message);

        for i in 0..DEVICE_SLOTS {
            self.platform.close_device(self.processes[slot].devices[i]);
        }
        self.platform
            .free_stack(self.processes[slot].stack_base, self.processes[slot].stack_len);

        match self.processes[slot].state {
            ProcessState::Current => {
                self.processes[slot].state = ProcessState::Free;
                self.reschedule()?;
            }
            ProcessState::Sleeping | ProcessState::ReceivingTimerOrMessage => {
                self.platform.cancel_timer(slot);
                self.processes[slot] = Process::free();
            }
            ProcessState::WaitingSemaphore => {
                if let Some(sid) = self.processes[slot].semaphore {
                    // The victim's reservation goes back to the semaphore.
                    self.semaphores[sid.0].count += 1;
                }
                self.queues.unlink(pid)?;
                self.processes[slot] = Process::free();
            }
            ProcessState::Ready => {
                self.queues.unlink(pid)?;
                self.processes[slot] = Process::free();
            }
            _ => {
                self.processes[slot] = Process::free();
            }
        }
        Ok(())
    }

    /// Exit trampoline: a process's entry function returned, so it kills
    /// itself. Installed by the platform at the bottom of every initial
    /// stack image.
    pub fn exit_current(&mut self) -> Result<()> {
        let pid = self.current;
        self.kill(pid)
    }

    /// A process's scheduling priority, read under the interrupt mask.
    pub fn get_priority(&self, pid: Pid) -> Result<Priority> {
        let mask = self.platform.disable_interrupts();
        let result = self.get_priority_locked(pid);
        self.platform.restore_interrupts(mask);
        result
    }

    fn get_priority_locked(&self, pid: Pid) -> Result<Priority> {
        let slot = self.check_live_pid(pid)?;
        Ok(self.processes[slot].priority)
    }

    /// Change a process's scheduling priority; returns the old value. Takes
    /// effect at the next scheduling decision involving the process.
    pub fn set_priority(&mut self, pid: Pid, priority: Priority) -> Result<Priority> {
        let mask = self.platform.disable_interrupts();
        let result = self.set_priority_locked(pid, priority);
        self.platform.restore_interrupts(mask);
        result
    }

    fn set_priority_locked(&mut self, pid: Pid, priority: Priority) -> Result<Priority> {
        if priority < 1 {
            return Err(KernelError::BadPriority);
        }
        let slot = self.check_live_pid(pid)?;
        let old = self.processes[slot].priority;
        self.processes[slot].priority = priority;
        Ok(old)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_hal_mock::MockPlatform;

    fn booted() -> Kernel<MockPlatform> {
        Kernel::boot(MockPlatform::new()).unwrap()
    }

    fn spawn(kernel: &mut Kernel<MockPlatform>, name: &str, priority: Priority) -> Pid {
        kernel
            .create(EntryPoint(0x800_0000), 512, priority, name, &[])
            .unwrap()
    }

    #[test]
    fn test_create_builds_suspended_process() {
        let mut kernel = booted();
        let pid = kernel
            .create(EntryPoint(0x800_0100), 300, 25, "shell", &[3, 4])
            .unwrap();

        let proc = kernel.process(pid).unwrap();
        assert_eq!(proc.state, ProcessState::Suspended);
        assert_eq!(proc.priority, 25);
        assert_eq!(proc.name.as_str(), "shell");
        assert_eq!(proc.parent, PID_NULL);
        assert_eq!(kernel.active_count(), 2);

        // Stack request was clamped and rounded before allocation.
        assert!(proc.stack_len >= 300);
        let built = kernel.platform().built_contexts();
        assert_eq!(built.len(), 1);
        assert_eq!(built[0].entry, EntryPoint(0x800_0100));
        assert_eq!(built[0].args, alloc::vec![3, 4]);
        assert_eq!(built[0].stack_len, proc.stack_len);
        assert!(kernel.platform().has_log_containing("'shell'"));
    }

    #[test]
    fn test_create_rejects_bad_priority() {
        let mut kernel = booted();
        let err = kernel.create(EntryPoint(0x800_0000), 512, 0, "p", &[]);
        assert_eq!(err.unwrap_err(), KernelError::BadPriority);
        assert_eq!(kernel.active_count(), 1);
    }

    #[test]
    fn test_create_stack_failure_leaves_slot_free() {
        let mut kernel = booted();
        kernel.platform().limit_arena(0);

        let err = kernel.create(EntryPoint(0x800_0000), 512, 5, "p", &[]);
        assert_eq!(err.unwrap_err(), KernelError::StackAllocationFailed);
        assert_eq!(kernel.active_count(), 1);
        // No slot was claimed permanently.
        kernel.platform().limit_arena(1 << 20);
        assert!(spawn(&mut kernel, "p", 5).0 < MAX_PROCESSES);
    }

    #[test]
    fn test_pid_allocation_rotates() {
        let mut kernel = booted();
        let a = spawn(&mut kernel, "a", 5);
        let b = spawn(&mut kernel, "b", 5);
        kernel.kill(a).unwrap();
        let c = spawn(&mut kernel, "c", 5);
        // The cursor moved past a's slot, so c does not reuse it immediately.
        assert_ne!(c, a);
        assert_ne!(c, b);
    }

    #[test]
    fn test_table_exhaustion() {
        let mut kernel = booted();
        for i in 0..MAX_PROCESSES - 1 {
            spawn(&mut kernel, "p", (i + 1) as Priority);
        }
        let err = kernel.create(EntryPoint(0x800_0000), 512, 1, "extra", &[]);
        assert_eq!(err.unwrap_err(), KernelError::ProcessIdAllocationFailed);
    }

    #[test]
    fn test_resume_returns_priority_and_requires_suspended() {
        let mut kernel = booted();
        let pid = spawn(&mut kernel, "worker", 12);

        assert_eq!(kernel.resume(pid), Ok(12));
        assert_eq!(kernel.current_pid(), pid);
        // Already running, not suspended.
        assert_eq!(kernel.resume(pid), Err(KernelError::BadProcessState));
        assert_eq!(kernel.resume(Pid(9)), Err(KernelError::BadProcessId));
    }

    #[test]
    fn test_suspend_ready_process_unlinks_it() {
        let mut kernel = booted();
        let low = spawn(&mut kernel, "low", 5);
        let high = spawn(&mut kernel, "high", 10);
        kernel.resume(low).unwrap();
        kernel.resume(high).unwrap();
        assert_eq!(kernel.current_pid(), high);

        assert_eq!(kernel.suspend(low), Ok(5));
        assert_eq!(kernel.process(low).unwrap().state, ProcessState::Suspended);
        let ready: alloc::vec::Vec<Pid> =
            kernel.ready_members().into_iter().map(|(p, _)| p).collect();
        assert!(!ready.contains(&low));
    }

    #[test]
    fn test_suspend_current_switches_away() {
        let mut kernel = booted();
        let pid = spawn(&mut kernel, "worker", 10);
        kernel.resume(pid).unwrap();
        let switches = kernel.platform().switch_count();

        assert_eq!(kernel.suspend(pid), Ok(10));
        assert_eq!(kernel.current_pid(), PID_NULL);
        assert_eq!(kernel.platform().switch_count(), switches + 1);
    }

    #[test]
    fn test_suspend_rejects_null_and_blocked() {
        let mut kernel = booted();
        assert_eq!(kernel.suspend(PID_NULL), Err(KernelError::BadProcessId));

        let pid = spawn(&mut kernel, "worker", 10);
        // Still suspended from creation.
        assert_eq!(kernel.suspend(pid), Err(KernelError::BadProcessState));
    }

    #[test]
    fn test_kill_ready_process_releases_resources() {
        let mut kernel = booted();
        let a = spawn(&mut kernel, "a", 5);
        let b = spawn(&mut kernel, "b", 10);
        kernel.resume(a).unwrap();
        kernel.resume(b).unwrap();

        kernel.kill(a).unwrap();
        assert_eq!(kernel.process(a).unwrap().state, ProcessState::Free);
        assert_eq!(kernel.active_count(), 2);
        assert_eq!(kernel.platform().freed_stacks().len(), 1);
        assert_eq!(kernel.platform().closed_devices().len(), DEVICE_SLOTS);
        let ready: alloc::vec::Vec<Pid> =
            kernel.ready_members().into_iter().map(|(p, _)| p).collect();
        assert!(!ready.contains(&a));
    }

    #[test]
    fn test_kill_current_switches_away() {
        let mut kernel = booted();
        let a = spawn(&mut kernel, "a", 5);
        let b = spawn(&mut kernel, "b", 10);
        kernel.resume(a).unwrap();
        kernel.resume(b).unwrap();
        assert_eq!(kernel.current_pid(), b);

        kernel.kill(b).unwrap();
        assert_eq!(kernel.current_pid(), a);
        assert_eq!(kernel.process(b).unwrap().state, ProcessState::Free);
    }

    #[test]
    fn test_kill_notifies_parent() {
        let mut kernel = booted();
        let a = spawn(&mut kernel, "a", 5);
        let b = spawn(&mut kernel, "b", 10);
        kernel.resume(a).unwrap();
        kernel.resume(b).unwrap();

        // a and b were both created by the null process.
        kernel.kill(a).unwrap();
        assert_eq!(
            kernel.process(PID_NULL).unwrap().pending_message,
            Some(a.0 as Message)
        );
    }

    #[test]
    fn test_kill_last_user_process_halts_once() {
        let mut kernel = booted();
        let pid = spawn(&mut kernel, "only", 10);
        kernel.resume(pid).unwrap();

        kernel.kill(pid).unwrap();
        assert!(kernel.is_halted());
        assert_eq!(kernel.platform().completion_count(), 1);

        // Scheduling is inert after the halt.
        kernel.clock_tick().unwrap();
        assert_eq!(kernel.platform().completion_count(), 1);
    }

    #[test]
    fn test_kill_rejects_null_and_free() {
        let mut kernel = booted();
        assert_eq!(kernel.kill(PID_NULL), Err(KernelError::BadProcessId));
        assert_eq!(kernel.kill(Pid(4)), Err(KernelError::BadProcessId));
    }

    #[test]
    fn test_priority_get_and_set() {
        let mut kernel = booted();
        let pid = spawn(&mut kernel, "worker", 10);

        assert_eq!(kernel.get_priority(pid), Ok(10));
        assert_eq!(kernel.set_priority(pid, 30), Ok(10));
        assert_eq!(kernel.get_priority(pid), Ok(30));
        assert_eq!(kernel.set_priority(pid, 0), Err(KernelError::BadPriority));
        assert_eq!(
            kernel.set_priority(Pid(9), 5),
            Err(KernelError::BadProcessId)
        );
    }

    #[test]
    fn test_get_priority_reads_under_interrupt_mask() {
        let kernel = booted();
        assert_eq!(kernel.platform().max_int_depth(), 0);

        assert_eq!(kernel.get_priority(PID_NULL), Ok(0));
        assert_eq!(kernel.platform().max_int_depth(), 1);
        assert_eq!(kernel.platform().int_depth(), 0);

        // The error path releases the mask too.
        assert_eq!(kernel.get_priority(Pid(9)), Err(KernelError::BadProcessId));
        assert_eq!(kernel.platform().int_depth(), 0);
    }

    #[test]
    fn test_exit_current() {
        let mut kernel = booted();
        let a = spawn(&mut kernel, "a", 5);
        let b = spawn(&mut kernel, "b", 10);
        kernel.resume(a).unwrap();
        kernel.resume(b).unwrap();

        kernel.exit_current().unwrap();
        assert_eq!(kernel.process(b).unwrap().state, ProcessState::Free);
        assert_eq!(kernel.current_pid(), a);
    }
}
