//! Mock Platform implementation for testing Ember OS
//!
//! This provides a mock implementation of the `Platform` trait that can be
//! used for unit testing the scheduling core without hardware. Context
//! switches are recorded instead of performed, stacks come from a simulated
//! bump arena, and interrupt masking is tracked so tests can assert that
//! every critical section was balanced.

#![no_std]
extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::sync::atomic::{AtomicUsize, Ordering};
use ember_hal::{DeviceHandle, EntryPoint, HalError, Platform, StackBase, StackPointer};

/// A recorded call to `context_switch`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwitchRecord {
    /// Stack pointer the suspended context was saved as
    pub from: StackPointer,
    /// Stack pointer that was switched to
    pub to: StackPointer,
}

/// A recorded call to `build_initial_context`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContextRecord {
    pub stack: StackBase,
    pub stack_len: usize,
    pub entry: EntryPoint,
    pub args: Vec<usize>,
}

/// Mock Platform for unit testing
///
/// Simulates interrupt masking, stack allocation, and context switching for
/// testing kernel logic on the host.
pub struct MockPlatform {
    /// Current interrupt-disable nesting depth
    int_depth: AtomicUsize,
    /// Deepest nesting level observed (for balance assertions)
    max_int_depth: AtomicUsize,
    /// Next fake stack base address to hand out
    next_stack_base: AtomicUsize,
    /// Outstanding stack allocations (base, len)
    live_stacks: RefCell<Vec<(StackBase, usize)>>,
    /// Stacks released via `free_stack`
    freed_stacks: RefCell<Vec<(StackBase, usize)>>,
    /// Recorded context switches, in order
    switches: RefCell<Vec<SwitchRecord>>,
    /// Recorded initial-context constructions, in order
    built_contexts: RefCell<Vec<ContextRecord>>,
    /// Devices closed during process teardown
    closed_devices: RefCell<Vec<DeviceHandle>>,
    /// Process slots whose timers were cancelled
    cancelled_timers: RefCell<Vec<usize>>,
    /// Number of `system_done` invocations
    completions: AtomicUsize,
    /// Captured debug messages
    debug_log: RefCell<Vec<String>>,
    /// Remaining arena bytes; allocations fail once exhausted
    arena_remaining: RefCell<usize>,
}

/// Simulated stack arena size. Large enough that tests only hit exhaustion
/// when they ask for it via `limit_arena`.
const ARENA_SIZE: usize = 1 << 20;

/// Fake base address the simulated arena starts at.
const ARENA_START: usize = 0x2000_0000;

impl MockPlatform {
    /// Create a new mock platform
    pub fn new() -> Self {
        Self {
            int_depth: AtomicUsize::new(0),
            max_int_depth: AtomicUsize::new(0),
            next_stack_base: AtomicUsize::new(ARENA_START),
            live_stacks: RefCell::new(Vec::new()),
            freed_stacks: RefCell::new(Vec::new()),
            switches: RefCell::new(Vec::new()),
            built_contexts: RefCell::new(Vec::new()),
            closed_devices: RefCell::new(Vec::new()),
            cancelled_timers: RefCell::new(Vec::new()),
            completions: AtomicUsize::new(0),
            debug_log: RefCell::new(Vec::new()),
            arena_remaining: RefCell::new(ARENA_SIZE),
        }
    }

    /// Shrink the remaining stack arena so the next oversized allocation
    /// fails, for exercising the allocation-failure paths.
    pub fn limit_arena(&self, bytes: usize) {
        *self.arena_remaining.borrow_mut() = bytes;
    }

    /// Current interrupt-disable nesting depth (0 = interrupts enabled)
    pub fn int_depth(&self) -> usize {
        self.int_depth.load(Ordering::SeqCst)
    }

    /// Deepest interrupt-disable nesting observed
    pub fn max_int_depth(&self) -> usize {
        self.max_int_depth.load(Ordering::SeqCst)
    }

    /// All recorded context switches, in order
    pub fn switches(&self) -> Vec<SwitchRecord> {
        self.switches.borrow().clone()
    }

    /// Number of context switches performed
    pub fn switch_count(&self) -> usize {
        self.switches.borrow().len()
    }

    /// All recorded initial-context constructions
    pub fn built_contexts(&self) -> Vec<ContextRecord> {
        self.built_contexts.borrow().clone()
    }

    /// Stacks currently outstanding (allocated and not freed)
    pub fn live_stack_count(&self) -> usize {
        self.live_stacks.borrow().len()
    }

    /// Stacks released via `free_stack`
    pub fn freed_stacks(&self) -> Vec<(StackBase, usize)> {
        self.freed_stacks.borrow().clone()
    }

    /// Devices closed via `close_device`
    pub fn closed_devices(&self) -> Vec<DeviceHandle> {
        self.closed_devices.borrow().clone()
    }

    /// Process slots whose timers were cancelled
    pub fn cancelled_timers(&self) -> Vec<usize> {
        self.cancelled_timers.borrow().clone()
    }

    /// Number of times the completion handler ran
    pub fn completion_count(&self) -> usize {
        self.completions.load(Ordering::SeqCst)
    }

    /// Get all captured debug messages
    pub fn get_debug_log(&self) -> Vec<String> {
        self.debug_log.borrow().clone()
    }

    /// Check if a specific message was logged
    pub fn has_log_containing(&self, substr: &str) -> bool {
        self.debug_log
            .borrow()
            .iter()
            .any(|msg| msg.contains(substr))
    }
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for MockPlatform {
    // The saved mask is the nesting depth at the time of the save; restoring
    // it pops back to exactly that depth, mirroring PRIMASK semantics.
    type IntMask = usize;

    fn disable_interrupts(&self) -> usize {
        let prev = self.int_depth.fetch_add(1, Ordering::SeqCst);
        self.max_int_depth.fetch_max(prev + 1, Ordering::SeqCst);
        prev
    }

    fn restore_interrupts(&self, mask: usize) {
        self.int_depth.store(mask, Ordering::SeqCst);
    }

    fn context_switch(&self, from: &mut StackPointer, to: StackPointer) {
        // Pretend the suspended context was saved 32 bytes below its base.
        let saved = StackPointer(from.0.wrapping_sub(32));
        *from = saved;
        self.switches
            .borrow_mut()
            .push(SwitchRecord { from: saved, to });
    }

    fn build_initial_context(
        &self,
        stack: StackBase,
        stack_len: usize,
        entry: EntryPoint,
        args: &[usize],
    ) -> StackPointer {
        self.built_contexts.borrow_mut().push(ContextRecord {
            stack,
            stack_len,
            entry,
            args: args.to_vec(),
        });
        // Stacks grow downward: the initial frame sits near the top.
        StackPointer(stack.0 + stack_len - 64)
    }

    fn round_stack_size(&self, size: usize) -> usize {
        (size + 7) & !7
    }

    fn alloc_stack(&self, size: usize) -> Result<StackBase, HalError> {
        let mut remaining = self.arena_remaining.borrow_mut();
        if size > *remaining {
            return Err(HalError::OutOfStackMemory);
        }
        *remaining -= size;
        let base = StackBase(self.next_stack_base.fetch_add(size, Ordering::SeqCst));
        self.live_stacks.borrow_mut().push((base, size));
        Ok(base)
    }

    fn free_stack(&self, base: StackBase, len: usize) {
        let mut live = self.live_stacks.borrow_mut();
        if let Some(pos) = live.iter().position(|&(b, _)| b == base) {
            live.remove(pos);
            *self.arena_remaining.borrow_mut() += len;
            self.freed_stacks.borrow_mut().push((base, len));
        }
    }

    fn close_device(&self, device: DeviceHandle) {
        self.closed_devices.borrow_mut().push(device);
    }

    fn cancel_timer(&self, pid: usize) {
        self.cancelled_timers.borrow_mut().push(pid);
    }

    fn system_done(&self) {
        self.completions.fetch_add(1, Ordering::SeqCst);
        self.debug_log
            .borrow_mut()
            .push(String::from("[mock-hal] All processes have completed, halting"));
    }

    fn debug_write(&self, msg: &str) {
        self.debug_log.borrow_mut().push(String::from(msg));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_mask_nesting() {
        let hal = MockPlatform::new();
        assert_eq!(hal.int_depth(), 0);

        let outer = hal.disable_interrupts();
        let inner = hal.disable_interrupts();
        assert_eq!(hal.int_depth(), 2);

        hal.restore_interrupts(inner);
        assert_eq!(hal.int_depth(), 1);
        hal.restore_interrupts(outer);
        assert_eq!(hal.int_depth(), 0);
        assert_eq!(hal.max_int_depth(), 2);
    }

    #[test]
    fn test_stack_alloc_and_free() {
        let hal = MockPlatform::new();

        let a = hal.alloc_stack(256).unwrap();
        let b = hal.alloc_stack(256).unwrap();
        assert_ne!(a, b);
        assert_eq!(hal.live_stack_count(), 2);

        hal.free_stack(a, 256);
        assert_eq!(hal.live_stack_count(), 1);
        assert_eq!(hal.freed_stacks(), alloc::vec![(a, 256)]);
    }

    #[test]
    fn test_stack_exhaustion() {
        let hal = MockPlatform::new();
        hal.limit_arena(128);

        assert_eq!(hal.alloc_stack(256), Err(HalError::OutOfStackMemory));
        assert!(hal.alloc_stack(128).is_ok());
    }

    #[test]
    fn test_context_switch_recorded() {
        let hal = MockPlatform::new();
        let mut from = StackPointer(0x2000_1000);
        hal.context_switch(&mut from, StackPointer(0x2000_2000));

        assert_eq!(hal.switch_count(), 1);
        let rec = hal.switches()[0];
        assert_eq!(rec.to, StackPointer(0x2000_2000));
        assert_eq!(rec.from, from);
    }

    #[test]
    fn test_build_initial_context() {
        let hal = MockPlatform::new();
        let base = hal.alloc_stack(512).unwrap();
        let sp = hal.build_initial_context(base, 512, EntryPoint(0x800_0100), &[1, 2]);

        assert!(sp.0 > base.0);
        assert!(sp.0 < base.0 + 512);
        let recs = hal.built_contexts();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].args, alloc::vec![1, 2]);
    }

    #[test]
    fn test_round_stack_size() {
        let hal = MockPlatform::new();
        assert_eq!(hal.round_stack_size(1), 8);
        assert_eq!(hal.round_stack_size(8), 8);
        assert_eq!(hal.round_stack_size(257), 264);
    }

    #[test]
    fn test_completion_recorded() {
        let hal = MockPlatform::new();
        hal.system_done();
        assert_eq!(hal.completion_count(), 1);
        assert!(hal.has_log_containing("completed"));
    }
}
