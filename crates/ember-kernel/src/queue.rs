//! Node table and queue service
//!
//! A single fixed array of doubly-linked list nodes backs every list in the
//! system: the ready list and each semaphore's waiter list. Slots
//! `[0, MAX_PROCESSES)` belong to processes (a process can be on at most one
//! list at a time, so its node is its list membership); slots above that hold
//! head/tail sentinel pairs handed out by [`QueueTable::alloc_queue`].
//!
//! The sentinel pair is what keeps the ordered-insertion loop branch-free:
//! the head carries the maximum key and the tail the minimum key, so a scan
//! for the first node with a smaller key always terminates without an
//! empty-list special case.

use alloc::vec::Vec;

use crate::error::{KernelError, Result};
use crate::types::{Pid, Priority, Qid, MAX_PROCESSES, NODE_TABLE_SIZE};

/// Link value meaning "not on any list".
const NIL: usize = usize::MAX;

/// One node table slot.
#[derive(Clone, Copy, Debug)]
struct Node {
    /// Ordering key (scheduling priority for the ready list)
    key: Priority,
    /// Index of the successor slot
    next: usize,
    /// Index of the predecessor slot
    previous: usize,
}

impl Node {
    const fn unlinked() -> Self {
        Self {
            key: 0,
            next: NIL,
            previous: NIL,
        }
    }
}

/// The node table plus its allocation watermark.
///
/// Queue ids are the node-table index of the queue's head sentinel; the tail
/// sentinel always sits at `head + 1`.
pub struct QueueTable {
    nodes: [Node; NODE_TABLE_SIZE],
    /// Next unallocated sentinel slot. Starts at `MAX_PROCESSES` and grows by
    /// two per allocated queue.
    next_queue: usize,
}

impl QueueTable {
    /// Create a table with no allocated queues and every process unlinked.
    pub fn new() -> Self {
        Self {
            nodes: [Node::unlinked(); NODE_TABLE_SIZE],
            next_queue: MAX_PROCESSES,
        }
    }

    /// Reserve the next head/tail sentinel pair and initialize it empty.
    pub fn alloc_queue(&mut self) -> Result<Qid> {
        if self.next_queue + 1 >= NODE_TABLE_SIZE {
            return Err(KernelError::QueueTableFull);
        }
        let head = self.next_queue;
        let tail = head + 1;
        self.next_queue += 2;

        self.nodes[head] = Node {
            key: Priority::MAX,
            next: tail,
            previous: NIL,
        };
        self.nodes[tail] = Node {
            key: Priority::MIN,
            next: NIL,
            previous: head,
        };
        Ok(Qid(head))
    }

    /// A queue id is valid once its sentinel pair has been allocated.
    fn check_queue(&self, queue: Qid) -> Result<usize> {
        let head = queue.0;
        if head < MAX_PROCESSES || head + 1 >= self.next_queue || (head - MAX_PROCESSES) % 2 != 0 {
            return Err(KernelError::BadQueueId);
        }
        Ok(head)
    }

    fn check_pid(&self, pid: Pid) -> Result<usize> {
        if pid.0 >= MAX_PROCESSES {
            return Err(KernelError::BadProcessId);
        }
        Ok(pid.0)
    }

    /// Whether the queue holds no process slots.
    ///
    /// The head's successor indexes the sentinel region exactly when nothing
    /// is linked between head and tail.
    pub fn is_empty(&self, queue: Qid) -> Result<bool> {
        let head = self.check_queue(queue)?;
        Ok(self.nodes[head].next >= MAX_PROCESSES)
    }

    /// First process on the queue, if any. O(1).
    pub fn first_id(&self, queue: Qid) -> Result<Option<Pid>> {
        let head = self.check_queue(queue)?;
        let first = self.nodes[head].next;
        if first >= MAX_PROCESSES {
            return Ok(None);
        }
        Ok(Some(Pid(first)))
    }

    /// Last process on the queue, if any. O(1).
    pub fn last_id(&self, queue: Qid) -> Result<Option<Pid>> {
        let head = self.check_queue(queue)?;
        let last = self.nodes[head + 1].previous;
        if last >= MAX_PROCESSES {
            return Ok(None);
        }
        Ok(Some(Pid(last)))
    }

    /// Key of the first process on the queue, if any. O(1).
    pub fn first_key(&self, queue: Qid) -> Result<Option<Priority>> {
        Ok(self.first_id(queue)?.map(|p| self.nodes[p.0].key))
    }

    /// Key of the last process on the queue, if any. O(1).
    pub fn last_key(&self, queue: Qid) -> Result<Option<Priority>> {
        Ok(self.last_id(queue)?.map(|p| self.nodes[p.0].key))
    }

    /// Link `pid` immediately before the tail sentinel (FIFO insertion).
    ///
    /// The table only range-checks the id. The kernel owns the process
    /// table, so liveness (the slot is not free) and non-membership (the
    /// process is not already linked somewhere) are the caller's contract;
    /// the kernel validates both before calling in.
    pub fn enqueue(&mut self, pid: Pid, queue: Qid) -> Result<Pid> {
        let head = self.check_queue(queue)?;
        let slot = self.check_pid(pid)?;
        let tail = head + 1;
        let previous = self.nodes[tail].previous;

        self.nodes[slot].next = tail;
        self.nodes[slot].previous = previous;
        self.nodes[previous].next = slot;
        self.nodes[tail].previous = slot;
        Ok(pid)
    }

    /// Unlink and return the first process, or `None` if the queue is empty.
    ///
    /// The removed node's links are reset so a stale `unlink` cannot corrupt
    /// its old neighbors.
    pub fn dequeue(&mut self, queue: Qid) -> Result<Option<Pid>> {
        let head = self.check_queue(queue)?;
        let first = self.nodes[head].next;
        if first >= MAX_PROCESSES {
            return Ok(None);
        }
        self.splice_out(first);
        self.nodes[first].next = NIL;
        self.nodes[first].previous = NIL;
        Ok(Some(Pid(first)))
    }

    /// Splice `pid` out of whatever list currently contains it.
    ///
    /// The caller must know the process is actually linked; no membership
    /// check is performed beyond the index range.
    pub fn unlink(&mut self, pid: Pid) -> Result<Pid> {
        let slot = self.check_pid(pid)?;
        self.splice_out(slot);
        self.nodes[slot].next = NIL;
        self.nodes[slot].previous = NIL;
        Ok(pid)
    }

    /// Redirect a linked node's neighbors around it.
    fn splice_out(&mut self, slot: usize) {
        let next = self.nodes[slot].next;
        let previous = self.nodes[slot].previous;
        if previous < NODE_TABLE_SIZE {
            self.nodes[previous].next = next;
        }
        if next < NODE_TABLE_SIZE {
            self.nodes[next].previous = previous;
        }
    }

    /// Insert `pid` into `queue` in descending key order.
    ///
    /// The scan walks from the head while the visited key is `>= key`, so
    /// equal keys land behind existing entries - FIFO among same-priority
    /// processes, which is what makes equal-priority scheduling round-robin.
    ///
    /// Same caller contract as [`Self::enqueue`]: the id is only
    /// range-checked here, liveness and non-membership are validated by the
    /// kernel before the call.
    pub fn insert_by_key(&mut self, pid: Pid, queue: Qid, key: Priority) -> Result<()> {
        let head = self.check_queue(queue)?;
        let slot = self.check_pid(pid)?;
        let tail = head + 1;

        let mut current = self.nodes[head].next;
        while current != tail && self.nodes[current].key >= key {
            current = self.nodes[current].next;
        }

        let previous = self.nodes[current].previous;
        self.nodes[slot].next = current;
        self.nodes[slot].previous = previous;
        self.nodes[slot].key = key;
        self.nodes[previous].next = slot;
        self.nodes[current].previous = slot;
        Ok(())
    }

    /// Snapshot of the queue's members and keys, head to tail.
    ///
    /// Used by the invariant checks and tests; not part of the hot path.
    pub fn members(&self, queue: Qid) -> Result<Vec<(Pid, Priority)>> {
        let head = self.check_queue(queue)?;
        let tail = head + 1;
        let mut out = Vec::new();
        let mut current = self.nodes[head].next;
        while current != tail && current < MAX_PROCESSES {
            out.push((Pid(current), self.nodes[current].key));
            current = self.nodes[current].next;
        }
        Ok(out)
    }

    /// Number of processes linked on the queue.
    pub fn len(&self, queue: Qid) -> Result<usize> {
        Ok(self.members(queue)?.len())
    }
}

impl Default for QueueTable {
    fn default() -> Self {
        Self::new()
    }
}
