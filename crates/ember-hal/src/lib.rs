//! Hardware Abstraction Layer trait for Ember OS
//!
//! This crate defines the `Platform` trait that allows the scheduling core to
//! run on different targets (Cortex-M boards, QEMU, host-side tests) by
//! abstracting the handful of operations the kernel cannot express portably:
//! interrupt masking, the register-level context switch, stack memory, and
//! the byte layout of a freshly built execution context.
//!
//! # Platform Implementations
//!
//! - **stm32f103**: PRIMASK save/restore, PendSV context switch, stacks carved
//!   from a static arena
//! - **Mock**: deterministic in-memory simulation for unit tests

#![no_std]

/// Saved stack pointer of a suspended process.
///
/// The kernel never dereferences this value; it only stores it in the process
/// table and hands it back to [`Platform::context_switch`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StackPointer(pub usize);

/// Base address of an allocated stack region.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StackBase(pub usize);

/// Address of a process entry function.
///
/// Opaque to the kernel; the platform knows how to arrange for a call to it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntryPoint(pub usize);

/// Handle to an open device descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceHandle(pub i32);

/// The console device, installed as stdin/stdout/stderr of new processes.
pub const CONSOLE: DeviceHandle = DeviceHandle(1);

/// Platform trait - the collaborator contracts of the scheduling core.
///
/// Implementations provide target-specific functionality for:
/// - Interrupt mask save/restore (critical sections)
/// - Context switching between saved stack pointers
/// - Stack allocation and initial execution-context construction
/// - Device close, timer cancellation, system completion
/// - Debug output
///
/// # Associated Types
///
/// - `IntMask`: opaque saved interrupt state. Callers must restore the exact
///   token they received so that nested critical sections reactivate
///   interrupts only at the outermost boundary.
pub trait Platform: 'static {
    /// Saved interrupt state (PRIMASK on Cortex-M, a counter on the mock)
    type IntMask: Copy;

    // === Critical sections ===

    /// Disable interrupts, returning the previous mask state.
    ///
    /// Every kernel operation that touches the shared tables brackets itself
    /// with `disable_interrupts` / `restore_interrupts`. Nesting is safe as
    /// long as each caller restores the token it was given.
    fn disable_interrupts(&self) -> Self::IntMask;

    /// Restore a previously saved interrupt mask.
    fn restore_interrupts(&self, mask: Self::IntMask);

    // === Context switching ===

    /// Switch execution from the context saved at `from` to the context in
    /// `to`.
    ///
    /// The platform pushes the caller's registers, stores the resulting stack
    /// pointer into `from`, then resumes the continuation saved in `to`.
    /// Control returns to the caller only when some later switch selects the
    /// `from` context again.
    fn context_switch(&self, from: &mut StackPointer, to: StackPointer);

    /// Synthesize an initial execution context on a freshly allocated stack.
    ///
    /// The returned stack pointer, once passed to [`Self::context_switch`],
    /// must begin execution at `entry` with `args` bound per the target's
    /// calling convention. A normal return from `entry` must land in the
    /// process-exit trampoline rather than undefined memory.
    fn build_initial_context(
        &self,
        stack: StackBase,
        stack_len: usize,
        entry: EntryPoint,
        args: &[usize],
    ) -> StackPointer;

    // === Stack memory ===

    /// Round a requested stack size up to the allocator's granularity.
    fn round_stack_size(&self, size: usize) -> usize;

    /// Allocate a stack of `size` bytes.
    fn alloc_stack(&self, size: usize) -> Result<StackBase, HalError>;

    /// Release a stack previously returned by [`Self::alloc_stack`].
    fn free_stack(&self, base: StackBase, len: usize);

    // === Process teardown collaborators ===

    /// Close an open device descriptor.
    fn close_device(&self, device: DeviceHandle);

    /// Cancel any pending timer armed for the given process slot.
    fn cancel_timer(&self, pid: usize);

    /// The last active process has exited; print a completion message and
    /// halt the target. The kernel treats the system as halted afterwards.
    fn system_done(&self);

    // === Debug ===

    /// Write a debug message to the target's console/log.
    fn debug_write(&self, msg: &str);
}

/// HAL errors
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HalError {
    /// Not enough stack memory available
    OutOfStackMemory,
    /// Operation not supported on this platform
    NotSupported,
    /// Invalid argument
    InvalidArgument,
}
