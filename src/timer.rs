/// A single hardware compare channel that fires one interrupt after a number
/// of ticks, plus a free running microsecond clock.
pub trait OneShotTimer {
    /// Length of one timer tick in microseconds
    const TICK_MICROS: u32 = 1;

    /// Fixed latency between arming and the handler running, subtracted from
    /// every requested delay
    const OVERHEAD_MICROS: u32 = 0;

    /// Free running microsecond counter, allowed to wrap
    fn now(&mut self) -> u32;

    /// Fires the compare interrupt once after `ticks` ticks, replacing any
    /// earlier arm
    fn start(&mut self, ticks: u32);

    fn stop(&mut self);
}

/// Work the engine asked to be done at a later point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerEvent {
    BeginPresence,
    EndPresence,
    SampleBit,
    ReleaseBit,
    CheckReset,
}

/// Converts a delay into timer ticks. Never returns 0, so delays below the
/// hardware floor fire as soon as the timer can.
pub(crate) fn ticks_for<T: OneShotTimer>(delay_us: u32) -> u32 {
    let ticks = delay_us.saturating_sub(T::OVERHEAD_MICROS) / T::TICK_MICROS;
    ticks.max(1)
}

/// Arena of one: at most a single pending [`TimerEvent`].
pub(crate) struct DeferredTimer<T: OneShotTimer> {
    timer: T,
    armed: Option<TimerEvent>,
}

impl<T: OneShotTimer> DeferredTimer<T> {
    pub fn new(timer: T) -> Self {
        DeferredTimer { timer, armed: None }
    }

    pub fn now(&mut self) -> u32 {
        self.timer.now()
    }

    /// Arms `event`, silently dropping whatever was armed before.
    pub fn schedule(&mut self, delay_us: u32, event: TimerEvent) {
        self.armed = Some(event);
        self.timer.start(ticks_for::<T>(delay_us));
    }

    pub fn cancel(&mut self) {
        self.timer.stop();
        self.armed = None;
    }

    /// Called from the compare interrupt. The slot is empty again once this
    /// returns, so the caller may schedule from the dispatched event.
    pub fn fire(&mut self) -> Option<TimerEvent> {
        self.timer.stop();
        self.armed.take()
    }

    #[cfg(test)]
    pub fn armed(&self) -> Option<TimerEvent> {
        self.armed
    }

    pub fn free(self) -> T {
        self.timer
    }
}
