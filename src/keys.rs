//! Debounced scanner for the four operator keys.
//!
//! The board has two input arrangements depending on revision: older
//! boards feed raw switches to the port and debounce in software (a
//! 1 kHz sampler commits a reading once it has been stable for
//! [`DEBOUNCE_SAMPLES`](crate::consts::DEBOUNCE_SAMPLES) consecutive
//! samples); newer boards debounce in hardware, so the port is read
//! directly at poll time.
//!
//! Foreground code calls [`KeyScanner::poll`] to latch the stable state
//! and snapshot the previous one. The only input event the transfer
//! layer consumes is the release edge, reported by
//! [`KeyScanner::was_released`]: a key that was held at the previous
//! poll and is up now.

use crate::consts::DEBOUNCE_SAMPLES;
use crate::hal::KeyPort;

/// One of the four operator keys, as a bit in the key port mask.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum Key {
    /// Scroll up / previous.
    Up,
    /// Scroll down / next.
    Down,
    /// Confirm.
    Ok,
    /// Back out; releasing it aborts a running transfer.
    Back,
}

impl Key {
    /// The key's bit in the port mask.
    pub const fn mask(self) -> u8 {
        match self {
            Key::Up => 0x01,
            Key::Down => 0x02,
            Key::Ok => 0x04,
            Key::Back => 0x08,
        }
    }
}

/// Debounce strategy, per board revision.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum Debounce {
    /// Sampled at 1 kHz; a reading is committed after
    /// [`DEBOUNCE_SAMPLES`](crate::consts::DEBOUNCE_SAMPLES) identical
    /// samples in a row.
    Software,
    /// Debounced externally; the port is read directly on each poll.
    Hardware,
}

/// Edge-detecting scanner over a raw key port.
#[derive(Debug)]
pub struct KeyScanner<P: KeyPort> {
    /// The raw input port.
    pub port: P,
    debounce: Debounce,
    stable: u8,
    last_sample: u8,
    run: u8,
    current: u8,
    old: u8,
}

impl<P: KeyPort> KeyScanner<P> {
    /// Creates a scanner with all keys up.
    pub fn new(port: P, debounce: Debounce) -> Self {
        KeyScanner {
            port,
            debounce,
            stable: 0,
            last_sample: 0,
            run: 0,
            current: 0,
            old: 0,
        }
    }

    /// 1 kHz debounce sampler; commits a reading once it has repeated
    /// for the debounce window. A no-op under hardware debounce.
    pub fn on_tick(&mut self) {
        if self.debounce != Debounce::Software {
            return;
        }

        let sample = self.port.read();
        if sample == self.last_sample {
            self.run += 1;
        } else {
            self.run = 0;
        }
        self.last_sample = sample;

        if self.run >= DEBOUNCE_SAMPLES {
            self.stable = sample;
            self.run = 0;
        }
    }

    /// Latches the debounced state into the current snapshot, keeping
    /// the previous one for edge detection.
    pub fn poll(&mut self) {
        if self.debounce == Debounce::Hardware {
            self.stable = self.port.read();
        }

        self.old = self.current;
        self.current = self.stable;
    }

    /// True when `key` went from held to released between the last two
    /// polls.
    pub fn was_released(&self, key: Key) -> bool {
        let mask = key.mask();
        self.old & mask != 0 && self.current & mask == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScriptedPort {
        samples: Vec<u8>,
        position: usize,
    }

    impl ScriptedPort {
        fn new(samples: &[u8]) -> Self {
            ScriptedPort {
                samples: samples.to_vec(),
                position: 0,
            }
        }
    }

    impl KeyPort for ScriptedPort {
        fn read(&mut self) -> u8 {
            let sample = self.samples.get(self.position).copied().unwrap_or(0);
            self.position += 1;
            sample
        }
    }

    #[test]
    fn test_software_debounce_commits_after_stable_window() {
        // A glitchy press: two bouncy samples, then a stable hold.
        let mut samples = vec![0x08, 0x00];
        samples.extend([0x08; 12]);
        let mut scanner = KeyScanner::new(ScriptedPort::new(&samples), Debounce::Software);

        for _ in 0..6 {
            scanner.on_tick();
        }
        scanner.poll();
        assert!(!scanner.was_released(Key::Back));
        assert_eq!(scanner.current, 0);

        for _ in 0..8 {
            scanner.on_tick();
        }
        scanner.poll();
        assert_eq!(scanner.current, 0x08);
    }

    #[test]
    fn test_release_edge_detected_once() {
        let mut scanner = KeyScanner::new(ScriptedPort::new(&[0x08, 0x00, 0x00]), Debounce::Hardware);

        scanner.poll();
        assert!(!scanner.was_released(Key::Back)); // held, no edge yet

        scanner.poll();
        assert!(scanner.was_released(Key::Back)); // held -> up

        scanner.poll();
        assert!(!scanner.was_released(Key::Back)); // stays up
    }

    #[test]
    fn test_keys_are_independent() {
        let mut scanner =
            KeyScanner::new(ScriptedPort::new(&[0x08 | 0x01, 0x01]), Debounce::Hardware);
        scanner.poll();
        scanner.poll();
        assert!(scanner.was_released(Key::Back));
        assert!(!scanner.was_released(Key::Up));
        assert!(!scanner.was_released(Key::Down));
        assert!(!scanner.was_released(Key::Ok));
    }

    #[test]
    fn test_hardware_mode_ignores_tick_sampler() {
        let mut scanner = KeyScanner::new(ScriptedPort::new(&[0x04]), Debounce::Hardware);
        for _ in 0..20 {
            scanner.on_tick();
        }
        // The port was never consumed by the sampler.
        scanner.poll();
        assert_eq!(scanner.current, 0x04);
    }
}
