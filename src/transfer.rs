use crate::{
    slave::{Outcome, State, WriteCallback},
    Error, Event, IoWire, OneShotTimer, Rom, Slave, TX_CAPACITY,
};
use core::fmt::Debug;
use heapless::Vec;

/// Bytes being assembled from received bits, LSB first.
#[derive(Debug, Default, Clone)]
pub(crate) struct Receive {
    buf: [u8; Rom::BYTES as usize],
    len: u8,
    index: u8,
    bit: u8,
}

impl Receive {
    pub fn start(len: u8) -> Self {
        Receive {
            len: len.min(Rom::BYTES),
            ..Default::default()
        }
    }

    /// Stores one bit, returns `true` once all requested bytes are in.
    pub fn push(&mut self, value: bool) -> bool {
        if self.index < self.len {
            if value {
                self.buf[self.index as usize] |= 0x01 << self.bit;
            }
            self.bit += 1;
            if self.bit == 8 {
                self.bit = 0;
                self.index += 1;
            }
        }
        self.index == self.len
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf[..self.index as usize]
    }
}

/// Bits queued for transmission, LSB first per byte.
pub(crate) struct Transmit<E: Debug> {
    data: Vec<u8, TX_CAPACITY>,
    bits: usize,
    position: usize,
    repeat: bool,
    /// Set once the current bit has been handed to the transceiver
    pub armed: bool,
    callback: Option<WriteCallback<E>>,
}

impl<E: Debug> Transmit<E> {
    pub fn bytes(bytes: &[u8], callback: Option<WriteCallback<E>>) -> Result<Self, Error<E>> {
        let data = Vec::from_slice(bytes).map_err(|_| Error::BufferOverflow)?;
        Ok(Transmit {
            bits: data.len() * 8,
            data,
            position: 0,
            repeat: false,
            armed: false,
            callback,
        })
    }

    pub fn bit(value: bool, repeat: bool, callback: Option<WriteCallback<E>>) -> Self {
        Transmit {
            data: Vec::from_iter([u8::from(value)]),
            bits: 1,
            position: 0,
            repeat,
            armed: false,
            callback,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    pub fn current(&self) -> bool {
        self.data[self.position / 8] & (0x01 << (self.position % 8)) != 0x00
    }

    /// Moves past the bit just sent, returns `true` when nothing is left.
    pub fn advance(&mut self) -> bool {
        self.position += 1;
        if self.position < self.bits {
            return false;
        }
        if self.repeat {
            self.position = 0;
            false
        } else {
            true
        }
    }

    pub fn finish(self, result: Result<(), Error<E>>) {
        if let Some(callback) = self.callback {
            callback(result);
        }
    }
}

impl<W: IoWire, T: OneShotTimer> Slave<W, T> {
    /// Arms the next slot of the data phase: a queued client write wins over
    /// receiving.
    pub(crate) fn arm_next(&mut self) -> Outcome<W> {
        match self.tx.pending.as_mut() {
            Some(tx) => {
                self.state = State::SendingData;
                tx.armed = true;
                let value = tx.current();
                self.arm_send(value)
            }
            None => {
                self.state = State::ReceivingData;
                self.rx = Receive::start(1);
                self.arm_receive()
            }
        }
    }

    pub(crate) fn enter_data(&mut self) -> Outcome<W> {
        debug!("entering data phase");
        self.arm_next()
    }

    /// Re-arms a slot that has not started yet after the write queue changed.
    pub(crate) fn rearm(&mut self) -> Outcome<W> {
        let in_data = matches!(self.state, State::ReceivingData | State::SendingData);
        if in_data && self.bit.is_some() {
            self.arm_next()
        } else {
            Ok(())
        }
    }

    pub(crate) fn bit_received(&mut self, value: bool) -> Outcome<W> {
        match self.state {
            State::SearchingRom => self.search_direction(value),
            State::ReceivingData => {
                if let Some(callback) = self.on_bit {
                    callback(value);
                }
                if self.rx.push(value) {
                    let byte = self.rx.bytes()[0];
                    trace!("received {=u8:#x}", byte);
                    self.notify(Event::Byte(byte));
                    self.arm_next()
                } else if self.tx.pending.is_some() {
                    self.arm_next()
                } else {
                    self.arm_receive()
                }
            }
            State::ReceivingCommand | State::MatchingRom => {
                if self.rx.push(value) {
                    self.bytes_received()
                } else {
                    self.arm_receive()
                }
            }
            _ => Err(Error::BitTransfer),
        }
    }

    fn bytes_received(&mut self) -> Outcome<W> {
        if self.state == State::ReceivingCommand {
            let code = self.rx.bytes()[0];
            return self.dispatch_command(code);
        }

        if self.rx.bytes() == self.rom.as_ref() {
            debug!("ROM matched");
            self.resume_allowed = true;
            self.enter_data()
        } else {
            trace!("ROM mismatch");
            self.resume_allowed = false;
            self.begin_wait_reset()
        }
    }

    pub(crate) fn bit_sent(&mut self) -> Outcome<W> {
        match self.state {
            State::SearchingRom => self.search_bit_sent(),
            State::SendingRom => {
                self.rom_bit += 1;
                if self.rom_bit == Rom::BITS {
                    self.enter_data()
                } else {
                    self.arm_send(self.rom.bit(self.rom_bit))
                }
            }
            State::SendingData => {
                let finished = match self.tx.pending.as_mut() {
                    Some(tx) if tx.armed => tx.advance(),
                    _ => false,
                };
                if finished {
                    trace!("write complete");
                    self.tx.complete();
                }
                self.arm_next()
            }
            _ => Err(Error::BitTransfer),
        }
    }
}
