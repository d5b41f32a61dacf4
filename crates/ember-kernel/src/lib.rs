//! Ember OS Scheduling Core
//!
//! Priority-based preemptive process scheduling for a single-processor
//! embedded system: a fixed process table, a ready list ordered by priority,
//! counting semaphores, single-slot message passing, and a deferral
//! mechanism that batches wakeups into one context switch.
//!
//! The whole core is one [`Kernel`] value, generic over the
//! [`Platform`](ember_hal::Platform) trait from `ember-hal`. Everything
//! machine-dependent - interrupt masking, context switching, stack memory,
//! timers - goes through that trait, so the core runs unmodified on real
//! hardware and under the `ember-hal-mock` test platform.
//!
//! # Module Organization
//!
//! - `types` - Ids, states, names, and sizing constants
//! - `error` - The [`KernelError`] taxonomy and `Result` alias
//! - `queue` - The node table backing the ready and waiter lists
//! - `state` - The [`Kernel`] container and boot
//! - `sched` - Reschedule, ready transitions, and deferral
//! - `process` - Create, resume, suspend, kill, priority control
//! - `semaphore` - Counting semaphores
//! - `message` - Single-slot message passing
//! - `invariants` - Structural checks for tests and debug builds
//!
//! # Concurrency Model
//!
//! One processor, no locks. Mutual exclusion is interrupt masking: every
//! public operation disables interrupts on entry and restores the saved mask
//! on every exit path. Operations therefore run to completion relative to
//! one another, and a context switch inside an operation resumes with the
//! mask exactly as the suspended process left it.

#![no_std]
extern crate alloc;

pub mod error;
pub mod invariants;
pub mod message;
pub mod process;
pub mod queue;
pub mod sched;
pub mod semaphore;
pub mod state;
pub mod types;

pub use error::{KernelError, Result};
pub use invariants::{check_all_invariants, InvariantViolation};
pub use process::Process;
pub use queue::QueueTable;
pub use sched::{DEFER_START, DEFER_STOP};
pub use semaphore::Semaphore;
pub use state::Kernel;
pub use types::{
    Message, Pid, Priority, ProcessName, ProcessState, Qid, SemaphoreState, Sid, DEVICE_SLOTS,
    MAX_PROCESSES, MIN_STACK_SIZE, NAME_LEN, NODE_TABLE_SIZE, PID_NULL, QUANTUM, QUEUE_COUNT,
    SEMAPHORE_COUNT,
};
