//! Structural invariant checks
//!
//! These checks verify the cross-table relationships the scheduler relies
//! on. They are meant for tests and debug builds: run a sequence of
//! operations, then call [`check_all_invariants`] and assert the list comes
//! back empty.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use ember_hal::Platform;

use crate::state::Kernel;
use crate::types::{Pid, ProcessState, SemaphoreState, Sid, MAX_PROCESSES, SEMAPHORE_COUNT};

/// A violated invariant, with enough context to diagnose it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvariantViolation {
    /// Short name of the violated invariant
    pub invariant: &'static str,
    /// Human-readable description of what was found
    pub description: String,
}

/// Check all structural invariants and return any violations.
///
/// Once the kernel has halted only the queue-structure checks remain
/// meaningful; the current-process and count checks are skipped.
pub fn check_all_invariants<P: Platform>(kernel: &Kernel<P>) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    check_ready_list_ordered(kernel, &mut violations);
    check_free_slots_unlinked(kernel, &mut violations);
    check_semaphore_counts(kernel, &mut violations);

    if !kernel.is_halted() {
        check_single_current(kernel, &mut violations);
        check_current_outranks_ready(kernel, &mut violations);
        check_active_count(kernel, &mut violations);
    }

    violations
}

/// Exactly one process is in the `Current` state, and it is the one the
/// kernel names as current.
fn check_single_current<P: Platform>(kernel: &Kernel<P>, out: &mut Vec<InvariantViolation>) {
    let current = kernel.current_pid();
    let mut running = Vec::new();
    for i in 0..MAX_PROCESSES {
        if let Some(proc) = kernel.process(Pid(i)) {
            if proc.state == ProcessState::Current {
                running.push(i);
            }
        }
    }
    if running != alloc::vec![current.0] {
        out.push(InvariantViolation {
            invariant: "single-current",
            description: format!(
                "current pid is {} but Current-state slots are {:?}",
                current.0, running
            ),
        });
    }
    if kernel.ready_members().iter().any(|&(pid, _)| pid == current) {
        out.push(InvariantViolation {
            invariant: "current-not-ready",
            description: format!("current pid {} is linked on the ready list", current.0),
        });
    }
}

/// Ready list keys run from highest to lowest.
fn check_ready_list_ordered<P: Platform>(kernel: &Kernel<P>, out: &mut Vec<InvariantViolation>) {
    let members = kernel.ready_members();
    for pair in members.windows(2) {
        if pair[0].1 < pair[1].1 {
            out.push(InvariantViolation {
                invariant: "ready-list-ordered",
                description: format!(
                    "key {} precedes key {} on the ready list",
                    pair[0].1, pair[1].1
                ),
            });
        }
    }
    for &(pid, _) in &members {
        match kernel.process(pid) {
            Some(proc) if proc.state == ProcessState::Ready => {}
            _ => out.push(InvariantViolation {
                invariant: "ready-list-states",
                description: format!("pid {} is on the ready list but not Ready", pid.0),
            }),
        }
    }
}

/// With deferral inactive, the running process outranks (or equals) every
/// ready process.
fn check_current_outranks_ready<P: Platform>(
    kernel: &Kernel<P>,
    out: &mut Vec<InvariantViolation>,
) {
    if kernel.defer_depth > 0 || kernel.defer_pending {
        return;
    }
    let current = kernel.current_pid();
    let current_proc = match kernel.process(current) {
        Some(proc) if proc.state == ProcessState::Current => proc,
        _ => return,
    };
    if let Some(&(pid, key)) = kernel.ready_members().first() {
        if key > current_proc.priority {
            out.push(InvariantViolation {
                invariant: "highest-priority-runs",
                description: format!(
                    "ready pid {} has priority {} above current priority {}",
                    pid.0, key, current_proc.priority
                ),
            });
        }
    }
}

/// Free process slots are not linked on the ready list or any waiter list.
fn check_free_slots_unlinked<P: Platform>(kernel: &Kernel<P>, out: &mut Vec<InvariantViolation>) {
    let mut linked: Vec<Pid> = kernel.ready_members().into_iter().map(|(p, _)| p).collect();
    for sid in 0..SEMAPHORE_COUNT {
        linked.extend(kernel.semaphore_waiters(Sid(sid)));
    }
    for pid in linked {
        if let Some(proc) = kernel.process(pid) {
            if proc.state == ProcessState::Free {
                out.push(InvariantViolation {
                    invariant: "free-slots-unlinked",
                    description: format!("free slot {} is linked on a queue", pid.0),
                });
            }
        }
    }
}

/// A semaphore's count is negative exactly when processes wait on it, and
/// its magnitude equals the waiter population. Waiters are in the
/// `WaitingSemaphore` state and point back at the semaphore.
fn check_semaphore_counts<P: Platform>(kernel: &Kernel<P>, out: &mut Vec<InvariantViolation>) {
    for i in 0..SEMAPHORE_COUNT {
        let sid = Sid(i);
        let sem = match kernel.semaphore(sid) {
            Some(sem) => *sem,
            None => continue,
        };
        let waiters = kernel.semaphore_waiters(sid);

        if sem.state == SemaphoreState::Used {
            let expected = if sem.count < 0 { (-sem.count) as usize } else { 0 };
            if waiters.len() != expected {
                out.push(InvariantViolation {
                    invariant: "semaphore-count-matches-waiters",
                    description: format!(
                        "semaphore {} count {} but {} waiters",
                        i,
                        sem.count,
                        waiters.len()
                    ),
                });
            }
        } else if !waiters.is_empty() {
            out.push(InvariantViolation {
                invariant: "free-semaphore-has-waiters",
                description: format!("free semaphore {} has {} waiters", i, waiters.len()),
            });
        }

        for pid in waiters {
            match kernel.process(pid) {
                Some(proc)
                    if proc.state == ProcessState::WaitingSemaphore
                        && proc.semaphore == Some(sid) => {}
                _ => out.push(InvariantViolation {
                    invariant: "waiter-state",
                    description: format!(
                        "pid {} waits on semaphore {} without the matching state",
                        pid.0, i
                    ),
                }),
            }
        }
    }
}

/// The live-process count matches the number of non-free slots.
fn check_active_count<P: Platform>(kernel: &Kernel<P>, out: &mut Vec<InvariantViolation>) {
    let live = (0..MAX_PROCESSES)
        .filter_map(|i| kernel.process(Pid(i)))
        .filter(|proc| proc.state != ProcessState::Free)
        .count();
    if live != kernel.active_count() {
        out.push(InvariantViolation {
            invariant: "active-count",
            description: format!(
                "active count {} but {} live slots",
                kernel.active_count(),
                live
            ),
        });
    }
}
