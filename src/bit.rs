use crate::{
    slave::{timing, Outcome, State},
    Edge, IoWire, OneShotTimer, Slave, TimerEvent,
};

/// What the slave does in the next master initiated time slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BitOp {
    Receive,
    Send(bool),
}

/// Outcome of a slot, held back until the master lets the line go high. A
/// line that stays low turns out to be a reset and the outcome is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotResult {
    Received(bool),
    Sent,
}

impl<W: IoWire, T: OneShotTimer> Slave<W, T> {
    pub(crate) fn arm_receive(&mut self) -> Outcome<W> {
        self.arm(BitOp::Receive)
    }

    pub(crate) fn arm_send(&mut self, value: bool) -> Outcome<W> {
        self.arm(BitOp::Send(value))
    }

    fn arm(&mut self, op: BitOp) -> Outcome<W> {
        self.bit = Some(op);
        self.wire.listen(Edge::Falling)?;
        Ok(())
    }

    /// Falling edge outside of reset detection: the master opened a slot.
    pub(crate) fn slot_started(&mut self) -> Outcome<W> {
        self.slot_start = self.timer.now();
        match self.bit.take() {
            Some(BitOp::Receive) => {
                self.timer
                    .schedule(timing::READ_SAMPLE, TimerEvent::SampleBit);
                Ok(())
            }
            Some(BitOp::Send(false)) => {
                self.drive_low()?;
                self.timer
                    .schedule(timing::SEND_ZERO_HOLD, TimerEvent::ReleaseBit);
                Ok(())
            }
            // the pull-up already says 1
            Some(BitOp::Send(true)) => self.settle(SlotResult::Sent),
            None => {
                self.schedule_reset_check();
                Ok(())
            }
        }
    }

    pub(crate) fn sample_bit(&mut self) -> Outcome<W> {
        let value = self.wire.is_high()?;
        self.settle(SlotResult::Received(value))
    }

    pub(crate) fn release_bit(&mut self) -> Outcome<W> {
        self.release()?;
        self.settle(SlotResult::Sent)
    }

    /// Completes the slot at once if the line is high, otherwise on the
    /// rising edge that ends it.
    fn settle(&mut self, result: SlotResult) -> Outcome<W> {
        self.schedule_reset_check();
        self.wire.listen(Edge::Rising)?;
        if self.wire.is_high()? {
            self.complete_slot(result)
        } else {
            self.settling = Some(result);
            Ok(())
        }
    }

    /// Rising edge, or a reset check finding the line high.
    pub(crate) fn slot_settled(&mut self) -> Outcome<W> {
        match self.settling.take() {
            Some(result) => self.complete_slot(result),
            None => Ok(()),
        }
    }

    fn complete_slot(&mut self, result: SlotResult) -> Outcome<W> {
        match result {
            SlotResult::Received(value) => self.bit_received(value),
            SlotResult::Sent => self.bit_sent(),
        }
    }

    /// A reset starts exactly like a slot. If the line is still low well past
    /// any slot length, treat the slot as the beginning of a reset pulse.
    pub(crate) fn check_reset(&mut self) -> Outcome<W> {
        if self.wire.is_low()? {
            debug!("slot turned into reset in {}", self.state);
            self.begin_wait_reset()
        } else {
            self.slot_settled()
        }
    }

    fn schedule_reset_check(&mut self) {
        let elapsed = self.timer.now().wrapping_sub(self.slot_start);
        self.timer.schedule(
            timing::RESET_CHECK.saturating_sub(elapsed),
            TimerEvent::CheckReset,
        );
    }

    /// Direction and level must change together with respect to interrupts.
    pub(crate) fn drive_low(&mut self) -> Outcome<W> {
        critical_section::with(|_| self.wire.pull_low())?;
        Ok(())
    }

    pub(crate) fn release(&mut self) -> Outcome<W> {
        critical_section::with(|_| self.wire.release())?;
        Ok(())
    }

    pub(crate) fn is_slot_state(&self) -> bool {
        !matches!(
            self.state,
            State::Disabled | State::WaitingForReset | State::AssertingPresence
        )
    }
}
