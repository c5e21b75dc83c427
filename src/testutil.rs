//! Scripted register-level mocks shared by the test suites.

use std::collections::VecDeque;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, OutputPin};

use crate::hal::{KeyPort, SpiClock, SpiPort, TickTimer, Twi, TwiOp, Usart};

/// USART mock: records writes, plays back a receive queue.
#[derive(Debug, Default)]
pub struct MockUsart {
    pub enabled: bool,
    pub baud: u32,
    pub data_irq: bool,
    pub rx_irq: bool,
    pub sent: Vec<u8>,
    pub blocking_sent: Vec<u8>,
    pub rx_queue: VecDeque<u8>,
}

impl MockUsart {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Usart for MockUsart {
    fn enable(&mut self) {
        self.enabled = true;
        self.rx_queue.clear();
    }

    fn disable(&mut self) {
        self.enabled = false;
    }

    fn set_baudrate(&mut self, baud: u32) {
        self.baud = baud;
    }

    fn set_data_empty_irq(&mut self, enabled: bool) {
        self.data_irq = enabled;
    }

    fn set_rx_irq(&mut self, enabled: bool) {
        self.rx_irq = enabled;
    }

    fn write(&mut self, byte: u8) {
        self.sent.push(byte);
    }

    fn read(&mut self) -> u8 {
        self.rx_queue.pop_front().unwrap_or(0)
    }

    fn drain(&mut self) {
        self.rx_queue.clear();
    }

    fn send_byte_blocking(&mut self, byte: u8) {
        self.blocking_sent.push(byte);
    }
}

/// SPI mock: records mode, clock and writes, plays back a receive queue.
#[derive(Debug, Default)]
pub struct MockSpi {
    pub master_clock: Option<SpiClock>,
    pub slave: bool,
    pub enabled: bool,
    pub irq: bool,
    pub written: Vec<u8>,
    pub rx_queue: VecDeque<u8>,
}

impl MockSpi {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SpiPort for MockSpi {
    fn enable_master(&mut self, clock: SpiClock) {
        self.enabled = true;
        self.slave = false;
        self.master_clock = Some(clock);
    }

    fn enable_slave(&mut self) {
        self.enabled = true;
        self.slave = true;
        self.master_clock = None;
    }

    fn disable(&mut self) {
        self.enabled = false;
        self.irq = false;
    }

    fn set_irq(&mut self, enabled: bool) {
        self.irq = enabled;
    }

    fn write(&mut self, byte: u8) {
        self.written.push(byte);
    }

    fn read(&mut self) -> u8 {
        self.rx_queue.pop_front().unwrap_or(0)
    }
}

/// Two-wire mock: plays back a status-code queue, records control ops.
#[derive(Debug, Default)]
pub struct MockTwi {
    pub bitrate: u32,
    pub listening: Option<u8>,
    pub enabled: bool,
    pub status_queue: VecDeque<u8>,
    pub written: Vec<u8>,
    pub rx_queue: VecDeque<u8>,
    pub ops: Vec<TwiOp>,
}

impl MockTwi {
    pub fn new() -> Self {
        MockTwi {
            enabled: true,
            ..Self::default()
        }
    }
}

impl Twi for MockTwi {
    fn set_bitrate(&mut self, bitrate: u32) {
        self.bitrate = bitrate;
    }

    fn listen(&mut self, address: u8) {
        self.listening = Some(address);
    }

    fn disable(&mut self) {
        self.enabled = false;
    }

    fn status(&mut self) -> u8 {
        self.status_queue.pop_front().unwrap_or(0xf8)
    }

    fn write(&mut self, byte: u8) {
        self.written.push(byte);
    }

    fn read(&mut self) -> u8 {
        self.rx_queue.pop_front().unwrap_or(0)
    }

    fn op(&mut self, op: TwiOp) {
        self.ops.push(op);
    }
}

/// Key port mock replaying a fixed sample script, idle afterwards.
#[derive(Debug, Default)]
pub struct MockKeys {
    pub samples: VecDeque<u8>,
}

impl MockKeys {
    pub fn new(samples: &[u8]) -> Self {
        MockKeys {
            samples: samples.iter().copied().collect(),
        }
    }
}

impl KeyPort for MockKeys {
    fn read(&mut self) -> u8 {
        self.samples.pop_front().unwrap_or(0)
    }
}

/// Tick timer mock recording start/stop calls.
#[derive(Debug, Default)]
pub struct MockTick {
    pub running: bool,
    pub starts: usize,
    pub stops: usize,
}

impl MockTick {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TickTimer for MockTick {
    fn start(&mut self) {
        self.running = true;
        self.starts += 1;
    }

    fn stop(&mut self) {
        self.running = false;
        self.stops += 1;
    }
}

/// Delay mock accumulating the requested time.
#[derive(Debug, Default)]
pub struct CountingDelay {
    pub us: u64,
}

impl CountingDelay {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DelayNs for CountingDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.us += u64::from(ns) / 1000;
    }
}

/// Output pin mock recording the driven states.
#[derive(Debug, Default)]
pub struct MockPin {
    pub states: Vec<bool>,
}

impl MockPin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ErrorType for MockPin {
    type Error = core::convert::Infallible;
}

impl OutputPin for MockPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.states.push(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.states.push(true);
        Ok(())
    }
}
