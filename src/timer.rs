//! Millisecond counter pool fed by a single 1 kHz hardware tick.
//!
//! The pool holds a small fixed number of counter slots that all advance
//! in lockstep: the platform's 1 kHz interrupt calls
//! [`TimerPool::tick`], which increments every registered counter. The
//! hardware timer only runs while at least one counter is registered;
//! the last deregistration stops it to save power.
//!
//! Foreground code holds a [`Timer`] handle, registers it with
//! [`TimerPool::start`], reads it with [`TimerPool::millis`] and
//! releases it with [`TimerPool::stop`]. Starting a handle that is
//! already registered succeeds without resetting its count; stopping an
//! unregistered handle is a no-op.

use crate::consts::TIMER_SLOTS;
use crate::hal::TickTimer;

/// Foreground handle to one millisecond counter.
///
/// A fresh handle is unregistered; it binds to a pool slot on `start`.
/// Handles carry a generation stamp so a stale handle can never read or
/// free a slot that has since been reused.
#[derive(Debug, Default)]
pub struct Timer {
    binding: Option<(u8, u16)>,
}

impl Timer {
    /// A handle not yet registered with any pool.
    pub const fn new() -> Self {
        Timer { binding: None }
    }
}

#[derive(Clone, Copy, Debug)]
struct Slot {
    generation: u16,
    msecs: Option<u16>,
}

/// The counter pool and the hardware tick source behind it.
#[derive(Debug)]
pub struct TimerPool<H: TickTimer> {
    /// The 1 kHz tick timer, started and stopped on demand.
    pub hw: H,
    slots: [Slot; TIMER_SLOTS],
    active: u8,
}

impl<H: TickTimer> TimerPool<H> {
    /// Creates an empty pool over `hw`, leaving the hardware stopped.
    pub fn new(hw: H) -> Self {
        TimerPool {
            hw,
            slots: [Slot {
                generation: 0,
                msecs: None,
            }; TIMER_SLOTS],
            active: 0,
        }
    }

    /// Registers `timer` and zeroes its count, starting the hardware
    /// tick if the pool was empty. Returns `true` on success; a handle
    /// that is already registered is left running and also reports
    /// success. Fails only when every slot is taken.
    pub fn start(&mut self, timer: &mut Timer) -> bool {
        if let Some((index, generation)) = timer.binding {
            let slot = &self.slots[index as usize];
            if slot.generation == generation && slot.msecs.is_some() {
                return true;
            }
        }

        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.msecs.is_none() {
                slot.generation = slot.generation.wrapping_add(1);
                slot.msecs = Some(0);
                timer.binding = Some((index as u8, slot.generation));

                self.active += 1;
                if self.active == 1 {
                    self.hw.start();
                }
                return true;
            }
        }

        false
    }

    /// Milliseconds accumulated since `timer` was registered, or 0 for
    /// an unregistered handle. Wraps after 65.5 s.
    pub fn millis(&self, timer: &Timer) -> u16 {
        match timer.binding {
            Some((index, generation)) => {
                let slot = &self.slots[index as usize];
                if slot.generation == generation {
                    slot.msecs.unwrap_or(0)
                } else {
                    0
                }
            }
            None => 0,
        }
    }

    /// Deregisters `timer`, stopping the hardware tick when the pool
    /// drains. A handle that was never registered is ignored.
    pub fn stop(&mut self, timer: &mut Timer) {
        if let Some((index, generation)) = timer.binding.take() {
            let slot = &mut self.slots[index as usize];
            if slot.generation == generation && slot.msecs.is_some() {
                slot.msecs = None;

                self.active -= 1;
                if self.active == 0 {
                    self.hw.stop();
                }
            }
        }
    }

    /// Advances every registered counter by one millisecond. Called
    /// from the 1 kHz tick interrupt.
    pub fn tick(&mut self) {
        for slot in &mut self.slots {
            if let Some(msecs) = &mut slot.msecs {
                *msecs = msecs.wrapping_add(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct FakeTick {
        running: bool,
        starts: u8,
        stops: u8,
    }

    impl TickTimer for FakeTick {
        fn start(&mut self) {
            self.running = true;
            self.starts += 1;
        }

        fn stop(&mut self) {
            self.running = false;
            self.stops += 1;
        }
    }

    #[test]
    fn test_counters_advance_in_lockstep() {
        let mut pool = TimerPool::new(FakeTick::default());
        let mut a = Timer::new();
        let mut b = Timer::new();
        assert!(pool.start(&mut a));
        pool.tick();
        assert!(pool.start(&mut b));
        pool.tick();
        pool.tick();

        assert_eq!(pool.millis(&a), 3);
        assert_eq!(pool.millis(&b), 2);

        pool.stop(&mut a);
        pool.stop(&mut b);
    }

    #[test]
    fn test_start_is_idempotent_without_reset() {
        let mut pool = TimerPool::new(FakeTick::default());
        let mut timer = Timer::new();
        assert!(pool.start(&mut timer));
        pool.tick();
        pool.tick();

        assert!(pool.start(&mut timer));
        assert_eq!(pool.millis(&timer), 2);
        pool.stop(&mut timer);
    }

    #[test]
    fn test_hardware_runs_only_while_pool_occupied() {
        let mut pool = TimerPool::new(FakeTick::default());
        let mut a = Timer::new();
        let mut b = Timer::new();

        assert!(!pool.hw.running);
        assert!(pool.start(&mut a));
        assert!(pool.hw.running);
        assert!(pool.start(&mut b));
        assert_eq!(pool.hw.starts, 1);

        pool.stop(&mut a);
        assert!(pool.hw.running);
        pool.stop(&mut b);
        assert!(!pool.hw.running);
        assert_eq!(pool.hw.stops, 1);
    }

    #[test]
    fn test_pool_capacity_is_bounded() {
        let mut pool = TimerPool::new(FakeTick::default());
        let mut handles = [const { Timer::new() }; TIMER_SLOTS];
        for handle in &mut handles {
            assert!(pool.start(handle));
        }

        let mut extra = Timer::new();
        assert!(!pool.start(&mut extra));

        pool.stop(&mut handles[3]);
        assert!(pool.start(&mut extra));
    }

    #[test]
    fn test_stale_handle_reads_zero_and_stop_is_noop() {
        let mut pool = TimerPool::new(FakeTick::default());
        let mut a = Timer::new();
        assert!(pool.start(&mut a));
        pool.tick();

        let mut stale = Timer::new();
        stale.binding = a.binding;
        pool.stop(&mut a);

        // The slot was freed and may be reused; the stale handle must
        // not observe or free it.
        let mut b = Timer::new();
        assert!(pool.start(&mut b));
        assert_eq!(pool.millis(&stale), 0);
        pool.stop(&mut stale);
        assert_eq!(pool.millis(&b), 0);
        pool.tick();
        assert_eq!(pool.millis(&b), 1);

        // Stopping an unregistered handle is a no-op.
        let mut fresh = Timer::new();
        pool.stop(&mut fresh);
        pool.stop(&mut b);
    }
}
