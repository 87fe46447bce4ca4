use crate::{
    slave::{Outcome, State},
    Error, IoWire, OneShotTimer, Rom, Slave,
};

/// Which of the three slots of a search round comes next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum SearchPhase {
    #[default]
    TrueBit,
    Complement,
    Direction,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SearchCursor {
    bit: u8,
    phase: SearchPhase,
}

impl<W: IoWire, T: OneShotTimer> Slave<W, T> {
    /// Answers every ROM bit with the bit and its complement, then follows
    /// the master's choice. A slave whose bit lost drops out until the next
    /// reset.
    pub(crate) fn begin_search(&mut self) -> Outcome<W> {
        self.state = State::SearchingRom;
        self.search = SearchCursor::default();
        self.arm_send(self.rom.bit(0))
    }

    pub(crate) fn search_bit_sent(&mut self) -> Outcome<W> {
        let bit = self.rom.bit(self.search.bit);
        match self.search.phase {
            SearchPhase::TrueBit => {
                self.search.phase = SearchPhase::Complement;
                self.arm_send(!bit)
            }
            SearchPhase::Complement => {
                self.search.phase = SearchPhase::Direction;
                self.arm_receive()
            }
            SearchPhase::Direction => Err(Error::BitTransfer),
        }
    }

    pub(crate) fn search_direction(&mut self, chosen: bool) -> Outcome<W> {
        if self.search.phase != SearchPhase::Direction {
            return Err(Error::BitTransfer);
        }

        if chosen != self.rom.bit(self.search.bit) {
            debug!("left search at bit {}", self.search.bit);
            return self.begin_wait_reset();
        }

        self.search.bit += 1;
        if self.search.bit == Rom::BITS {
            debug!("search complete");
            return self.begin_wait_reset();
        }

        self.search.phase = SearchPhase::TrueBit;
        self.arm_send(self.rom.bit(self.search.bit))
    }
}
