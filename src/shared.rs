//! Keeping the engine in a `static` so both interrupt vectors and the main
//! loop can reach it.
//!
//! ```ignore
//! static SLAVE: SharedSlave<Wire, Timer1> = Mutex::new(RefCell::new(None));
//!
//! #[interrupt]
//! fn EXTI0() {
//!     shared::on_edge(&SLAVE);
//! }
//!
//! #[interrupt]
//! fn TIM2() {
//!     shared::on_timer(&SLAVE);
//! }
//! ```

use crate::{Error, IoWire, OneShotTimer, Slave, WriteStatus};
use core::cell::RefCell;
use critical_section::Mutex;

pub type SharedSlave<W, T> = Mutex<RefCell<Option<Slave<W, T>>>>;

/// Stores `slave`, returning the one installed before.
pub fn install<W: IoWire, T: OneShotTimer>(
    shared: &SharedSlave<W, T>,
    slave: Slave<W, T>,
) -> Option<Slave<W, T>> {
    critical_section::with(|cs| shared.borrow_ref_mut(cs).replace(slave))
}

pub fn take<W: IoWire, T: OneShotTimer>(shared: &SharedSlave<W, T>) -> Option<Slave<W, T>> {
    critical_section::with(|cs| shared.borrow_ref_mut(cs).take())
}

/// Runs `f` on the installed engine with interrupts masked.
pub fn with<W: IoWire, T: OneShotTimer, R>(
    shared: &SharedSlave<W, T>,
    f: impl FnOnce(&mut Slave<W, T>) -> R,
) -> Option<R> {
    critical_section::with(|cs| shared.borrow_ref_mut(cs).as_mut().map(f))
}

pub fn on_edge<W: IoWire, T: OneShotTimer>(shared: &SharedSlave<W, T>) {
    with(shared, Slave::on_edge);
}

pub fn on_timer<W: IoWire, T: OneShotTimer>(shared: &SharedSlave<W, T>) {
    with(shared, Slave::on_timer);
}

/// Queues `bytes` and spins until they were sent or the write failed.
///
/// Interrupts are only masked while polling the status. Calling this from
/// an interrupt handler dead-locks. A write queued meanwhile by an interrupt,
/// e.g. from the receive callback, replaces this one and fails it.
pub fn write_blocking<W: IoWire, T: OneShotTimer>(
    shared: &SharedSlave<W, T>,
    bytes: &[u8],
) -> Result<(), Error<W::Error>> {
    let generation = with(shared, |slave| {
        slave.write(bytes, None).map(|_| slave.tx.generation)
    })
    .unwrap_or(Err(Error::WriteCancelled))?;

    loop {
        let polled = with(shared, |slave| (slave.tx.generation, slave.write_status()));
        match polled {
            Some((current, _)) if current != generation => return Err(Error::WriteCancelled),
            Some((_, WriteStatus::Pending)) => core::hint::spin_loop(),
            Some((_, WriteStatus::Sent)) => return Ok(()),
            _ => return Err(Error::WriteCancelled),
        }
    }
}

#[cfg(test)]
mod test {
    extern crate std;

    use super::{install, on_edge, take, with, write_blocking, SharedSlave};
    use crate::{Edge, Error, IoWire, OneShotTimer, Rom, Slave, State, WriteStatus};
    use core::{cell::RefCell, convert::Infallible};
    use critical_section::Mutex;
    use std::{thread, time::Duration};

    struct Quiet;

    impl IoWire for Quiet {
        type Error = Infallible;

        fn is_high(&mut self) -> Result<bool, Infallible> {
            Ok(true)
        }

        fn pull_low(&mut self) -> Result<(), Infallible> {
            Ok(())
        }

        fn release(&mut self) -> Result<(), Infallible> {
            Ok(())
        }

        fn listen(&mut self, _edge: Edge) -> Result<(), Infallible> {
            Ok(())
        }

        fn unlisten(&mut self) -> Result<(), Infallible> {
            Ok(())
        }
    }

    struct Still;

    impl OneShotTimer for Still {
        fn now(&mut self) -> u32 {
            0
        }

        fn start(&mut self, _ticks: u32) {}

        fn stop(&mut self) {}
    }

    fn slave() -> Slave<Quiet, Still> {
        let mut slave = Slave::new(Rom::new(0x01, [9, 8, 7, 6, 5, 4]), Quiet, Still);
        slave.begin().unwrap();
        slave
    }

    #[test]
    fn empty_until_installed() {
        static SLAVE: SharedSlave<Quiet, Still> = Mutex::new(RefCell::new(None));
        assert_eq!(with(&SLAVE, |s| s.state()), None);
        on_edge(&SLAVE);

        assert!(install(&SLAVE, slave()).is_none());
        assert_eq!(with(&SLAVE, |s| s.state()), Some(State::WaitingForReset));
        assert!(take(&SLAVE).is_some());
        assert!(take(&SLAVE).is_none());
    }

    #[test]
    fn blocking_write_without_engine_fails() {
        static SLAVE: SharedSlave<Quiet, Still> = Mutex::new(RefCell::new(None));
        assert_eq!(write_blocking(&SLAVE, &[1]), Err(Error::WriteCancelled));
    }

    #[test]
    fn blocking_write_of_nothing_returns() {
        static SLAVE: SharedSlave<Quiet, Still> = Mutex::new(RefCell::new(None));
        install(&SLAVE, slave());
        assert_eq!(write_blocking(&SLAVE, &[]), Ok(()));
    }

    #[test]
    fn blocking_write_returns_when_stopped() {
        static SLAVE: SharedSlave<Quiet, Still> = Mutex::new(RefCell::new(None));
        install(&SLAVE, slave());

        let stopper = thread::spawn(|| loop {
            thread::sleep(Duration::from_millis(5));
            let pending = with(&SLAVE, |s| s.write_status() == WriteStatus::Pending);
            if pending == Some(true) {
                with(&SLAVE, |s| s.stop_write());
                break;
            }
        });

        assert_eq!(write_blocking(&SLAVE, &[0xAB]), Err(Error::WriteCancelled));
        stopper.join().unwrap();
    }

    #[test]
    fn blocking_write_fails_when_replaced_and_replacement_sent() {
        static SLAVE: SharedSlave<Quiet, Still> = Mutex::new(RefCell::new(None));
        install(&SLAVE, slave());

        // one interrupt queueing its own answer, which then goes out
        let interrupt = thread::spawn(|| loop {
            thread::sleep(Duration::from_millis(5));
            let replaced = with(&SLAVE, |s| {
                if s.write_status() != WriteStatus::Pending {
                    return false;
                }
                s.write(&[0x99], None).unwrap();
                s.tx.complete();
                true
            });
            if replaced == Some(true) {
                break;
            }
        });

        assert_eq!(write_blocking(&SLAVE, &[0xAB]), Err(Error::WriteCancelled));
        interrupt.join().unwrap();
        assert_eq!(with(&SLAVE, |s| s.write_status()), Some(WriteStatus::Sent));
    }
}
