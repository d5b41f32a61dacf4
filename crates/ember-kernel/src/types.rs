//! Core scheduling types
//!
//! This module contains the fundamental types and sizing constants used
//! throughout the scheduling core. All types here are pure data - no behavior
//! that depends on the platform.

use serde::{Deserialize, Serialize};

/// Maximum number of process table slots.
pub const MAX_PROCESSES: usize = 16;

/// Number of semaphore table slots.
pub const SEMAPHORE_COUNT: usize = 8;

/// Number of allocatable queues: the ready list plus one waiter list per
/// semaphore.
pub const QUEUE_COUNT: usize = SEMAPHORE_COUNT + 1;

/// Node table size: one slot per process, plus a head/tail sentinel pair per
/// queue.
pub const NODE_TABLE_SIZE: usize = MAX_PROCESSES + 2 * QUEUE_COUNT;

/// Smallest stack a process may be created with, in bytes.
pub const MIN_STACK_SIZE: usize = 256;

/// Preemption time slice granted to a process when it is switched in, in
/// clock ticks.
pub const QUANTUM: u32 = 0xA5;

/// Process name buffer length, including the forced NUL terminator.
pub const NAME_LEN: usize = 16;

/// Device descriptor slots per process (stdin, stdout, stderr).
pub const DEVICE_SLOTS: usize = 3;

/// Process identifier - an index into the process table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Pid(pub usize);

/// The reserved null process. Always present, never suspended or killed.
pub const PID_NULL: Pid = Pid(0);

/// Queue identifier - the node-table index of a queue's head sentinel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Qid(pub usize);

/// Semaphore identifier - an index into the semaphore table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Sid(pub usize);

/// Scheduling priority. Higher values run first; the null process sits at 0
/// and created processes must be at least 1.
pub type Priority = i32;

/// A single pending message word.
pub type Message = u32;

/// Process state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessState {
    /// Slot is unused and may be claimed by `create`
    Free,
    /// The one process that owns the processor
    Current,
    /// Eligible to run, linked on the ready list
    Ready,
    /// Blocked in `receive_message` until a message arrives
    WaitingMessage,
    /// Blocked until a timer expires
    Sleeping,
    /// Placed in hibernation by `suspend`
    Suspended,
    /// Blocked on a semaphore's waiter list
    WaitingSemaphore,
    /// Blocked until a timer expires or a message arrives
    ReceivingTimerOrMessage,
}

/// Semaphore slot state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SemaphoreState {
    /// Slot is unused and may be claimed by `create_semaphore`
    Free,
    /// Slot holds a live semaphore
    Used,
}

/// Bounded, NUL-terminated process name buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProcessName {
    bytes: [u8; NAME_LEN],
}

impl ProcessName {
    /// An empty name (all NUL).
    pub const fn empty() -> Self {
        Self {
            bytes: [0; NAME_LEN],
        }
    }

    /// Bounded copy with forced termination: at most `NAME_LEN - 1` bytes are
    /// taken from `name`, and the final byte is always NUL.
    pub fn new(name: &str) -> Self {
        let mut bytes = [0u8; NAME_LEN];
        for (dst, src) in bytes[..NAME_LEN - 1].iter_mut().zip(name.bytes()) {
            *dst = src;
        }
        Self { bytes }
    }

    /// The name up to its first NUL.
    pub fn as_str(&self) -> &str {
        let end = self
            .bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(NAME_LEN - 1);
        core::str::from_utf8(&self.bytes[..end]).unwrap_or("")
    }
}

impl Default for ProcessName {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_bounded_copy() {
        let name = ProcessName::new("shell");
        assert_eq!(name.as_str(), "shell");
    }

    #[test]
    fn test_name_truncation_forces_terminator() {
        let name = ProcessName::new("a-process-name-well-past-the-limit");
        assert_eq!(name.as_str().len(), NAME_LEN - 1);
        assert_eq!(name.as_str(), "a-process-name-");
    }

    #[test]
    fn test_name_empty() {
        assert_eq!(ProcessName::empty().as_str(), "");
        assert_eq!(ProcessName::new("").as_str(), "");
    }

    #[test]
    fn test_table_sizing() {
        // Every queue consumes exactly one head/tail sentinel pair.
        assert_eq!(NODE_TABLE_SIZE, MAX_PROCESSES + 2 * QUEUE_COUNT);
        assert!(QUEUE_COUNT >= SEMAPHORE_COUNT + 1);
    }

    #[test]
    fn test_id_ordering() {
        assert!(Pid(1) < Pid(2));
        assert_eq!(Sid(3), Sid(3));
        assert!(Qid(16) < Qid(18));
    }
}
