use crate::{slave::WriteCallback, transfer::Transmit, Error};
use core::fmt::Debug;

/// Largest single write the engine buffers.
pub const TX_CAPACITY: usize = 32;

/// Outcome of the most recent write request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WriteStatus {
    /// Nothing written since the engine was created
    Idle,
    Pending,
    Sent,
    /// Replaced, stopped, or aborted by a bus fault or reset
    Failed,
}

/// The single pending client transmission and its status.
pub(crate) struct TxQueue<E: Debug> {
    pub pending: Option<Transmit<E>>,
    pub status: WriteStatus,
    /// Bumped by every new write, so a poller can tell its own write apart
    /// from one that replaced it
    pub generation: u32,
}

impl<E: Debug> TxQueue<E> {
    pub fn new() -> Self {
        TxQueue {
            pending: None,
            status: WriteStatus::Idle,
            generation: 0,
        }
    }

    /// Fails the pending transmission, if any.
    pub fn cancel(&mut self) {
        if let Some(tx) = self.pending.take() {
            trace!("write cancelled");
            self.status = WriteStatus::Failed;
            tx.finish(Err(Error::WriteCancelled));
        }
    }

    pub fn write(
        &mut self,
        bytes: &[u8],
        callback: Option<WriteCallback<E>>,
    ) -> Result<(), Error<E>> {
        let tx = Transmit::bytes(bytes, callback)?;
        self.cancel();
        self.generation = self.generation.wrapping_add(1);
        if tx.is_empty() {
            self.status = WriteStatus::Sent;
            tx.finish(Ok(()));
        } else {
            self.status = WriteStatus::Pending;
            self.pending = Some(tx);
        }
        Ok(())
    }

    pub fn write_bit(&mut self, value: bool, repeat: bool, callback: Option<WriteCallback<E>>) {
        self.cancel();
        self.generation = self.generation.wrapping_add(1);
        self.status = WriteStatus::Pending;
        self.pending = Some(Transmit::bit(value, repeat, callback));
    }

    /// Marks the pending transmission as sent and notifies its owner.
    pub fn complete(&mut self) {
        if let Some(tx) = self.pending.take() {
            self.status = WriteStatus::Sent;
            tx.finish(Ok(()));
        }
    }
}

/// Handed to the receive callback so it can answer the master without
/// re-entering the engine. Requests take effect from the next time slot.
pub struct Responder<'a, E: Debug> {
    tx: &'a mut TxQueue<E>,
    alarmed: &'a mut bool,
}

impl<'a, E: Debug> Responder<'a, E> {
    pub(crate) fn new(tx: &'a mut TxQueue<E>, alarmed: &'a mut bool) -> Self {
        Responder { tx, alarmed }
    }

    /// Queues `bytes` for the next read slots, failing any earlier write.
    pub fn write(
        &mut self,
        bytes: &[u8],
        callback: Option<WriteCallback<E>>,
    ) -> Result<(), Error<E>> {
        self.tx.write(bytes, callback)
    }

    /// Queues a single bit, sent in every following slot when `repeat` is set
    /// until [`stop_write`](Self::stop_write) or another write.
    pub fn write_bit(&mut self, value: bool, repeat: bool, callback: Option<WriteCallback<E>>) {
        self.tx.write_bit(value, repeat, callback)
    }

    pub fn stop_write(&mut self) {
        self.tx.cancel()
    }

    pub fn set_alarmed(&mut self, alarmed: bool) {
        *self.alarmed = alarmed;
    }

    pub fn write_status(&self) -> WriteStatus {
        self.tx.status
    }
}
