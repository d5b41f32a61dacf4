//! Kernel error taxonomy
//!
//! Every public operation returns a `Result` whose error side is a distinct
//! variant here - an error code never shares a channel with a valid priority
//! or id. Validation happens at the top of each operation, before any table
//! mutation, so a returned error implies zero side effects.

use ember_hal::HalError;

/// Kernel errors
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KernelError {
    /// Queue id out of range or not allocated
    BadQueueId,
    /// Process id out of range or names a free slot
    BadProcessId,
    /// Process exists but is in the wrong state for the operation
    BadProcessState,
    /// Priority below the minimum for created processes
    BadPriority,
    /// Semaphore id out of range
    BadSemaphoreId,
    /// Semaphore slot is free
    BadSemaphoreState,
    /// No head/tail sentinel pairs left in the node table
    QueueTableFull,
    /// Defer stop without a matching defer start
    DeferHandling,
    /// Unrecognized defer request code
    DeferUnknownCommand,
    /// No free process table slot
    ProcessIdAllocationFailed,
    /// The stack allocator collaborator reported failure
    StackAllocationFailed,
    /// No free semaphore table slot
    SemaphoreIdAllocationFailed,
    /// Negative count passed to semaphore create/reset
    NegativeSemaphoreCount,
    /// Recipient already holds an undelivered message
    MessageOutstanding,
    /// No message available (blocked receive resumed without delivery)
    WouldBlock,
    /// HAL error
    Hal(HalError),
}

impl From<HalError> for KernelError {
    fn from(e: HalError) -> Self {
        KernelError::Hal(e)
    }
}

/// Convenience alias used throughout the core.
pub type Result<T> = core::result::Result<T, KernelError>;
