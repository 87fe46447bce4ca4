//! The protocol engine.
//!
//! A [`Slave`] owns the bus pin and one hardware timer. It never blocks: the
//! GPIO edge interrupt calls [`Slave::on_edge`], the timer compare interrupt
//! calls [`Slave::on_timer`], and every wait is expressed by arming one of
//! the two. The two vectors must not preempt each other.
//!
//! Callbacks run inside those interrupts. Keep them short.

use crate::{
    bit::{BitOp, SlotResult},
    responder::{Responder, TxQueue, WriteStatus},
    search::SearchCursor,
    timer::DeferredTimer,
    transfer::Receive,
    Command, Edge, Error, IoWire, OneShotTimer, Rom, TimerEvent,
};
use core::{convert::TryFrom, fmt::Debug};

/// Bus timings in microseconds, standard speed.
pub mod timing {
    /// Shortest low pulse accepted as reset
    pub const RESET_MIN: u32 = 480;
    /// Longest low pulse accepted as reset
    pub const RESET_MAX: u32 = 900;
    /// After the start of a slot, a line still low at this point is a reset
    pub const RESET_CHECK: u32 = 430;
    /// Gap between reset release and presence pulse
    pub const PRESENCE_WAIT: u32 = 30;
    pub const PRESENCE: u32 = 300;
    /// Sampling point of a master write slot
    pub const READ_SAMPLE: u32 = 30;
    /// How long a 0 is held in a master read slot
    pub const SEND_ZERO_HOLD: u32 = 35;
}

pub(crate) type Outcome<W> = Result<(), Error<<W as IoWire>::Error>>;

/// Called for bus resets, received data bytes and faults.
pub type ReceiveCallback<E> = fn(&mut Responder<'_, E>, Event<E>);

/// Called for every bit received in the data phase.
pub type BitCallback = fn(bool);

/// Called once a write was sent, or failed.
pub type WriteCallback<E> = fn(Result<(), Error<E>>);

#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event<E: Debug> {
    /// A valid reset pulse ended, presence follows
    Reset,
    /// A data byte arrived after a successful ROM command
    Byte(u8),
    Error(Error<E>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// Not listening to the bus, see [`Slave::begin`]
    Disabled,
    WaitingForReset,
    AssertingPresence,
    ReceivingCommand,
    MatchingRom,
    SearchingRom,
    SendingRom,
    ReceivingData,
    SendingData,
}

pub struct Slave<W: IoWire, T: OneShotTimer> {
    pub(crate) rom: Rom,
    pub(crate) wire: W,
    pub(crate) timer: DeferredTimer<T>,
    pub(crate) state: State,
    pub(crate) bit: Option<BitOp>,
    pub(crate) settling: Option<SlotResult>,
    pub(crate) slot_start: u32,
    reset_start: Option<u32>,
    pub(crate) rx: Receive,
    pub(crate) tx: TxQueue<W::Error>,
    pub(crate) rom_bit: u8,
    pub(crate) search: SearchCursor,
    alarmed: bool,
    pub(crate) resume_allowed: bool,
    on_receive: Option<ReceiveCallback<W::Error>>,
    pub(crate) on_bit: Option<BitCallback>,
}

impl<W: IoWire, T: OneShotTimer> Slave<W, T> {
    /// Creates a disabled slave answering to `rom`. Owning the pin and timer
    /// makes this the only engine on the bus.
    pub fn new(rom: Rom, wire: W, timer: T) -> Self {
        Slave {
            rom,
            wire,
            timer: DeferredTimer::new(timer),
            state: State::Disabled,
            bit: None,
            settling: None,
            slot_start: 0,
            reset_start: None,
            rx: Receive::default(),
            tx: TxQueue::new(),
            rom_bit: 0,
            search: SearchCursor::default(),
            alarmed: false,
            resume_allowed: false,
            on_receive: None,
            on_bit: None,
        }
    }

    /// Releases the line and starts waiting for a reset pulse.
    pub fn begin(&mut self) -> Outcome<W> {
        debug!("enabling slave, family {=u8:#x}", self.rom.family_code());
        self.timer.cancel();
        self.release()?;
        self.slot_start = self.timer.now();
        self.resume_allowed = false;
        self.begin_wait_reset()
    }

    /// Stops all bus activity. No handler does anything until the next
    /// [`begin`](Self::begin); a pending write is failed.
    pub fn end(&mut self) -> Outcome<W> {
        debug!("disabling slave");
        self.state = State::Disabled;
        self.bit = None;
        self.settling = None;
        self.timer.cancel();
        self.wire.unlisten()?;
        self.release()?;
        self.tx.cancel();
        Ok(())
    }

    /// Hands back the pin and timer.
    pub fn free(self) -> (W, T) {
        (self.wire, self.timer.free())
    }

    pub fn set_receive_callback(&mut self, callback: Option<ReceiveCallback<W::Error>>) {
        self.on_receive = callback;
    }

    pub fn set_receive_bit_callback(&mut self, callback: Option<BitCallback>) {
        self.on_bit = callback;
    }

    /// Queues `bytes` for the following read slots of the data phase. A write
    /// still pending is failed first. Empty input completes at once.
    pub fn write(
        &mut self,
        bytes: &[u8],
        callback: Option<WriteCallback<W::Error>>,
    ) -> Outcome<W> {
        self.tx.write(bytes, callback)?;
        self.rearm_or_fail();
        Ok(())
    }

    /// Queues a single bit, repeated in every slot when `repeat` is set.
    pub fn write_bit(
        &mut self,
        value: bool,
        repeat: bool,
        callback: Option<WriteCallback<W::Error>>,
    ) {
        self.tx.write_bit(value, repeat, callback);
        self.rearm_or_fail();
    }

    /// Drops the pending write, failing it, and goes back to receiving.
    pub fn stop_write(&mut self) {
        self.tx.cancel();
        self.rearm_or_fail();
    }

    fn rearm_or_fail(&mut self) {
        if let Err(error) = self.rearm() {
            self.fail(error);
        }
    }

    /// Gates participation in conditional (alarm) search.
    pub fn set_alarmed(&mut self, alarmed: bool) {
        self.alarmed = alarmed;
    }

    pub fn is_alarmed(&self) -> bool {
        self.alarmed
    }

    /// True between a successful Match ROM and the next ROM command that
    /// addresses someone else.
    pub fn resume_allowed(&self) -> bool {
        self.resume_allowed
    }

    pub fn rom(&self) -> &Rom {
        &self.rom
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn write_status(&self) -> WriteStatus {
        self.tx.status
    }

    /// Entry point for the bus pin's edge interrupt.
    pub fn on_edge(&mut self) {
        let result = match self.state {
            State::Disabled | State::AssertingPresence => Ok(()),
            State::WaitingForReset => self.reset_edge(),
            _ if self.settling.is_some() => self.slot_settled(),
            _ => self.slot_started(),
        };
        if let Err(error) = result {
            self.fail(error);
        }
    }

    /// Entry point for the timer compare interrupt.
    pub fn on_timer(&mut self) {
        let Some(event) = self.timer.fire() else {
            return;
        };
        let result = match event {
            TimerEvent::BeginPresence if self.state == State::AssertingPresence => {
                self.begin_presence()
            }
            TimerEvent::EndPresence if self.state == State::AssertingPresence => {
                self.end_presence()
            }
            TimerEvent::SampleBit if self.is_slot_state() => self.sample_bit(),
            TimerEvent::ReleaseBit if self.is_slot_state() => self.release_bit(),
            TimerEvent::CheckReset if self.is_slot_state() => self.check_reset(),
            _ => Ok(()),
        };
        if let Err(error) = result {
            self.fail(error);
        }
    }

    /// Single exit for every fault: the engine always recovers on the next
    /// reset pulse.
    pub(crate) fn fail(&mut self, error: Error<W::Error>) {
        warn!("fault in {}, waiting for reset", self.state);
        if self.release().is_err() {
            warn!("could not release the line");
        }
        self.tx.cancel();
        self.notify(Event::Error(error));
        if self.begin_wait_reset().is_err() {
            warn!("could not rearm reset detection");
        }
    }

    pub(crate) fn notify(&mut self, event: Event<W::Error>) {
        if let Some(callback) = self.on_receive {
            let mut responder = Responder::new(&mut self.tx, &mut self.alarmed);
            callback(&mut responder, event);
        }
    }

    /// If the line is low right now it has been so since the last slot
    /// started, which then counts as the start of the reset pulse. The edge
    /// interrupt is armed first so a failing level read still leaves the
    /// engine reachable by the next reset.
    pub(crate) fn begin_wait_reset(&mut self) -> Outcome<W> {
        self.state = State::WaitingForReset;
        self.bit = None;
        self.settling = None;
        self.timer.cancel();
        self.reset_start = None;
        self.wire.listen(Edge::Any)?;
        if self.wire.is_low()? {
            self.reset_start = Some(self.slot_start);
        }
        Ok(())
    }

    fn reset_edge(&mut self) -> Outcome<W> {
        let now = self.timer.now();
        if self.wire.is_low()? {
            self.reset_start = Some(now);
            return Ok(());
        }

        let Some(start) = self.reset_start.take() else {
            return Ok(());
        };
        let duration = now.wrapping_sub(start);
        if duration < timing::RESET_MIN {
            return Ok(());
        }
        if duration > timing::RESET_MAX {
            return Err(Error::ResetTooLong(duration));
        }

        trace!("reset of {} us", duration);
        self.state = State::AssertingPresence;
        self.tx.cancel();
        self.notify(Event::Reset);
        self.wire.unlisten()?;
        let elapsed = self.timer.now().wrapping_sub(now);
        self.timer.schedule(
            timing::PRESENCE_WAIT.saturating_sub(elapsed),
            TimerEvent::BeginPresence,
        );
        Ok(())
    }

    fn begin_presence(&mut self) -> Outcome<W> {
        self.drive_low()?;
        self.timer
            .schedule(timing::PRESENCE, TimerEvent::EndPresence);
        Ok(())
    }

    fn end_presence(&mut self) -> Outcome<W> {
        self.release()?;
        self.state = State::ReceivingCommand;
        self.rx = Receive::start(1);
        self.arm_receive()
    }

    pub(crate) fn dispatch_command(&mut self, code: u8) -> Outcome<W> {
        let command = Command::try_from(code).map_err(Error::UnknownCommand)?;
        trace!("command {}", command);
        match command {
            Command::SearchRom => {
                self.resume_allowed = false;
                self.begin_search()
            }
            Command::SearchRomAlarmed if self.alarmed => {
                self.resume_allowed = false;
                self.begin_search()
            }
            Command::SearchRomAlarmed => self.begin_wait_reset(),
            Command::ReadRom => {
                self.resume_allowed = false;
                self.state = State::SendingRom;
                self.rom_bit = 0;
                self.arm_send(self.rom.bit(0))
            }
            Command::MatchRom => {
                self.state = State::MatchingRom;
                self.rx = Receive::start(Rom::BYTES);
                self.arm_receive()
            }
            Command::SkipRom => {
                self.resume_allowed = false;
                self.enter_data()
            }
            Command::Resume if self.resume_allowed => self.enter_data(),
            Command::Resume => self.begin_wait_reset(),
        }
    }
}

#[cfg(test)]
mod test {
    extern crate std;

    use super::{Event, Slave, State};
    use crate::{Edge, Error, IoWire, OneShotTimer, Responder, Rom, TimerEvent};
    use core::{cell::RefCell, convert::Infallible};
    use embedded_hal::digital::ErrorKind;
    use std::{thread_local, vec::Vec};

    /// Line idling high, nobody else on the bus
    #[derive(Default)]
    struct Idle {
        low: bool,
        listening: Option<Edge>,
    }

    impl IoWire for Idle {
        type Error = Infallible;

        fn is_high(&mut self) -> Result<bool, Infallible> {
            Ok(!self.low)
        }

        fn pull_low(&mut self) -> Result<(), Infallible> {
            self.low = true;
            Ok(())
        }

        fn release(&mut self) -> Result<(), Infallible> {
            self.low = false;
            Ok(())
        }

        fn listen(&mut self, edge: Edge) -> Result<(), Infallible> {
            self.listening = Some(edge);
            Ok(())
        }

        fn unlisten(&mut self) -> Result<(), Infallible> {
            self.listening = None;
            Ok(())
        }
    }

    #[derive(Default)]
    struct Frozen;

    impl OneShotTimer for Frozen {
        fn now(&mut self) -> u32 {
            0
        }

        fn start(&mut self, _ticks: u32) {}

        fn stop(&mut self) {}
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Broken;

    impl embedded_hal::digital::Error for Broken {
        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    /// Pin whose driver or level read can be made to fail
    #[derive(Default)]
    struct Faulty {
        low: bool,
        listening: Option<Edge>,
        drive_fails: bool,
        sense_fails: bool,
    }

    impl IoWire for Faulty {
        type Error = Broken;

        fn is_high(&mut self) -> Result<bool, Broken> {
            if self.sense_fails {
                return Err(Broken);
            }
            Ok(!self.low)
        }

        fn pull_low(&mut self) -> Result<(), Broken> {
            if self.drive_fails {
                return Err(Broken);
            }
            self.low = true;
            Ok(())
        }

        fn release(&mut self) -> Result<(), Broken> {
            if self.drive_fails {
                return Err(Broken);
            }
            self.low = false;
            Ok(())
        }

        fn listen(&mut self, edge: Edge) -> Result<(), Broken> {
            self.listening = Some(edge);
            Ok(())
        }

        fn unlisten(&mut self) -> Result<(), Broken> {
            self.listening = None;
            Ok(())
        }
    }

    thread_local! {
        static EVENTS: RefCell<Vec<Event<Broken>>> = const { RefCell::new(Vec::new()) };
    }

    fn record(_reply: &mut Responder<'_, Broken>, event: Event<Broken>) {
        EVENTS.with(|events| events.borrow_mut().push(event));
    }

    fn recorded() -> Vec<Event<Broken>> {
        EVENTS.with(|events| events.borrow_mut().drain(..).collect())
    }

    fn faulty() -> Slave<Faulty, Frozen> {
        let mut slave = Slave::new(
            Rom::new(0x28, [1, 2, 3, 4, 5, 6]),
            Faulty::default(),
            Frozen,
        );
        slave.set_receive_callback(Some(record));
        slave.begin().unwrap();
        slave
    }

    fn slave() -> Slave<Idle, Frozen> {
        Slave::new(Rom::new(0x28, [1, 2, 3, 4, 5, 6]), Idle::default(), Frozen)
    }

    #[test]
    fn starts_disabled() {
        let slave = slave();
        assert_eq!(slave.state(), State::Disabled);
        assert_eq!(slave.wire.listening, None);
    }

    #[test]
    fn begin_listens_for_any_edge() {
        let mut slave = slave();
        slave.begin().unwrap();
        assert_eq!(slave.state(), State::WaitingForReset);
        assert_eq!(slave.wire.listening, Some(Edge::Any));
        assert!(!slave.wire.low);
    }

    #[test]
    fn end_releases_everything() {
        let mut slave = slave();
        slave.begin().unwrap();
        slave.wire.low = true;
        slave.timer.schedule(30, TimerEvent::BeginPresence);
        slave.end().unwrap();
        assert_eq!(slave.state(), State::Disabled);
        assert_eq!(slave.wire.listening, None);
        assert!(!slave.wire.low);
        assert_eq!(slave.timer.armed(), None);
    }

    #[test]
    fn handlers_are_inert_when_disabled() {
        let mut slave = slave();
        slave.on_edge();
        slave.on_timer();
        assert_eq!(slave.state(), State::Disabled);
        assert!(!slave.wire.low);
    }

    #[test]
    fn stale_timer_event_is_ignored() {
        let mut slave = slave();
        slave.begin().unwrap();
        slave.timer.schedule(300, TimerEvent::EndPresence);
        slave.on_timer();
        assert_eq!(slave.state(), State::WaitingForReset);
    }

    #[test]
    fn unknown_command_is_an_error() {
        let mut slave = slave();
        slave.begin().unwrap();
        assert_eq!(
            slave.dispatch_command(0x99),
            Err(crate::Error::UnknownCommand(0x99))
        );
    }

    #[test]
    fn alarm_search_needs_alarm_flag() {
        let mut slave = slave();
        slave.begin().unwrap();
        slave.dispatch_command(0xEC).unwrap();
        assert_eq!(slave.state(), State::WaitingForReset);

        slave.set_alarmed(true);
        slave.dispatch_command(0xEC).unwrap();
        assert_eq!(slave.state(), State::SearchingRom);
    }

    #[test]
    fn resume_needs_prior_match() {
        let mut slave = slave();
        slave.begin().unwrap();
        slave.dispatch_command(0xA5).unwrap();
        assert_eq!(slave.state(), State::WaitingForReset);

        slave.resume_allowed = true;
        slave.dispatch_command(0xA5).unwrap();
        assert_eq!(slave.state(), State::ReceivingData);
        assert!(slave.resume_allowed());
    }

    #[test]
    fn skip_rom_clears_resume() {
        let mut slave = slave();
        slave.begin().unwrap();
        slave.resume_allowed = true;
        slave.dispatch_command(0xCC).unwrap();
        assert_eq!(slave.state(), State::ReceivingData);
        assert!(!slave.resume_allowed());
    }

    #[test]
    fn pin_fault_reports_and_waits_for_reset() {
        let mut slave = faulty();
        slave.state = State::AssertingPresence;
        slave.timer.schedule(30, TimerEvent::BeginPresence);
        slave.wire.drive_fails = true;
        slave.on_timer();

        assert_eq!(recorded(), [Event::Error(Error::PortError(Broken))]);
        assert_eq!(slave.state(), State::WaitingForReset);
        assert_eq!(slave.wire.listening, Some(Edge::Any));
    }

    #[test]
    fn unexpected_bit_reports_transfer_error() {
        let mut slave = faulty();
        slave.state = State::SendingRom;
        slave.arm_receive().unwrap();
        slave.on_edge();
        assert_eq!(slave.timer.armed(), Some(TimerEvent::SampleBit));
        slave.on_timer();

        assert_eq!(recorded(), [Event::Error(Error::BitTransfer)]);
        assert_eq!(slave.state(), State::WaitingForReset);
        assert_eq!(slave.timer.armed(), None);
    }

    #[test]
    fn failed_level_read_still_listens_for_reset() {
        let mut slave = faulty();
        slave.state = State::ReceivingData;
        slave.arm_receive().unwrap();
        slave.on_edge();
        slave.wire.sense_fails = true;
        slave.on_timer();

        assert_eq!(recorded(), [Event::Error(Error::PortError(Broken))]);
        assert_eq!(slave.state(), State::WaitingForReset);
        assert_eq!(slave.wire.listening, Some(Edge::Any));
    }
}
