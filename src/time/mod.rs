//! Virtual time: the clock, tick delivery, and the alarm built on them.

pub mod alarm;
pub mod clock;

pub use alarm::Alarm;
pub use clock::VirtualClock;

use crate::types::Time;

/// A periodic timer-interrupt consumer.
///
/// Handlers are registered with the kernel and invoked on every tick the
/// executor fires. `next_deadline` lets the executor skip virtual time ahead
/// when nothing is runnable instead of ticking through idle periods.
pub trait TickHandler {
    /// Invoked at each timer tick with the current virtual time.
    fn on_tick(&self, now: Time);

    /// Earliest virtual time at which this handler has work, if any.
    fn next_deadline(&self) -> Option<Time>;
}
