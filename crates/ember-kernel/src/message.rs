//! Single-slot message passing
//!
//! Every process owns a one-message mailbox. A send to a full mailbox fails
//! rather than overwrite; a blocking receive parks the caller in
//! `WaitingMessage` until a sender fills the slot and makes it ready again.
//! Process exit notifications ride this same mechanism: the kernel sends the
//! dead process's id to its parent.

use ember_hal::Platform;

use crate::error::{KernelError, Result};
use crate::state::Kernel;
use crate::types::{Message, Pid, ProcessState};

impl<P: Platform> Kernel<P> {
    /// Deliver a message to a process's mailbox, waking it if it is blocked
    /// waiting for one. Fails with [`KernelError::MessageOutstanding`] if an
    /// earlier message has not been consumed yet.
    pub fn send_message(&mut self, pid: Pid, message: Message) -> Result<()> {
        let mask = self.platform.disable_interrupts();
        let result = self.send_message_locked(pid, message);
        self.platform.restore_interrupts(mask);
        result
    }

    pub(crate) fn send_message_locked(&mut self, pid: Pid, message: Message) -> Result<()> {
        let slot = self.check_live_pid(pid)?;
        if self.processes[slot].pending_message.is_some() {
            return Err(KernelError::MessageOutstanding);
        }
        self.processes[slot].pending_message = Some(message);

        match self.processes[slot].state {
            ProcessState::WaitingMessage => self.set_ready(pid)?,
            ProcessState::ReceivingTimerOrMessage => {
                // The recipient was also waiting on a timer; the message wins.
                self.platform.cancel_timer(slot);
                self.set_ready(pid)?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Take the message from the current process's mailbox, blocking until
    /// one arrives.
    ///
    /// Returns [`KernelError::WouldBlock`] only if the process was resumed
    /// without a delivery, which a conforming platform does not do.
    pub fn receive_message(&mut self) -> Result<Message> {
        let mask = self.platform.disable_interrupts();
        let result = self.receive_message_locked();
        self.platform.restore_interrupts(mask);
        result
    }

    fn receive_message_locked(&mut self) -> Result<Message> {
        let current = self.current;
        if self.processes[current.0].pending_message.is_none() {
            self.processes[current.0].state = ProcessState::WaitingMessage;
            self.reschedule()?;
        }
        match self.processes[current.0].pending_message.take() {
            Some(message) => Ok(message),
            None => Err(KernelError::WouldBlock),
        }
    }

    /// Non-blocking receive: take the pending message if there is one.
    pub fn try_receive_message(&mut self) -> Result<Option<Message>> {
        let mask = self.platform.disable_interrupts();
        let current = self.current;
        let message = self.processes[current.0].pending_message.take();
        self.platform.restore_interrupts(mask);
        Ok(message)
    }
}
