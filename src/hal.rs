//! Hardware access traits and divisor helpers.
//!
//! The bus drivers in this crate are written against these seams rather
//! than against any concrete microcontroller. A board support crate
//! implements them over its peripheral registers; the traits stay at
//! the register-operation level (load the data register, mask an
//! interrupt source) because that is the granularity the interrupt-
//! driven state machines work at.
//!
//! Pin-level concerns (the infrared endec control lines) and dead-time
//! delays use `embedded-hal` traits directly and do not appear here.
//!
//! The free functions at the bottom compute the divisor values the
//! usual register layouts want, from the CPU clock:
//!
//! | helper | register |
//! |--------|----------|
//! | [`baud_divisor`] | 16-bit USART baud rate divisor |
//! | [`twi_bitrate_divisor`] | 8-bit two-wire bit rate register (/4 prescaler) |
//! | [`tick_compare_value`] | compare value for the 1 kHz tick timer |

use libm::round;

/// Register-level access to the USART peripheral shared by the RS-232
/// and IrDA transports.
pub trait Usart {
    /// Enables transmitter and receiver with 8N1 framing and drains any
    /// stale receive data.
    fn enable(&mut self);

    /// Disables transmitter and receiver.
    fn disable(&mut self);

    /// Programs the line rate.
    fn set_baudrate(&mut self, baud: u32);

    /// Masks or unmasks the data-register-empty interrupt.
    fn set_data_empty_irq(&mut self, enabled: bool);

    /// Masks or unmasks the receive-complete interrupt.
    fn set_rx_irq(&mut self, enabled: bool);

    /// Loads one byte into the transmit data register.
    fn write(&mut self, byte: u8);

    /// Reads the receive data register.
    fn read(&mut self) -> u8;

    /// Drops any bytes pending in the receiver.
    fn drain(&mut self);

    /// Sends one byte synchronously, waiting for the data register
    /// before and after. Used for endec command bytes, never for packet
    /// traffic.
    fn send_byte_blocking(&mut self, byte: u8);
}

/// Master clock selection for the synchronous serial bus.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum SpiClock {
    /// CPU clock divided by 4 (the fast hints).
    Div4,
    /// CPU clock divided by 128 (the slow hints).
    Div128,
}

/// Register-level access to the SPI peripheral.
pub trait SpiPort {
    /// Enables the peripheral in master mode at the given clock, with
    /// the slave-select line asserted.
    fn enable_master(&mut self, clock: SpiClock);

    /// Enables the peripheral in slave mode.
    fn enable_slave(&mut self);

    /// Disables the peripheral and releases its pins.
    fn disable(&mut self);

    /// Masks or unmasks the transfer-complete interrupt.
    fn set_irq(&mut self, enabled: bool);

    /// Loads the data register. In master mode this starts a transfer.
    fn write(&mut self, byte: u8);

    /// Reads the data register.
    fn read(&mut self) -> u8;
}

/// Control-register operation on the two-wire peripheral.
///
/// Each variant corresponds to one combination of the enable, interrupt,
/// start, stop and acknowledge bits a transfer step wants written in a
/// single go.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum TwiOp {
    /// Issue a START (or repeated START) condition, interrupt enabled.
    Start,
    /// Clear the interrupt flag and continue; no acknowledge on the
    /// next received byte.
    Proceed,
    /// Clear the interrupt flag and continue, acknowledging the next
    /// received byte or address.
    ProceedAck,
    /// Issue a STOP condition with the interrupt masked.
    Stop,
    /// Clear the interrupt flag with the interrupt masked, staying off
    /// the bus. Ends a slave-transmitter exchange.
    Finish,
    /// Release the bus: peripheral enabled, interrupt masked, no
    /// pending condition.
    Release,
    /// Recover from a bus error by forcing the stop logic.
    Recover,
}

/// Register-level access to the two-wire (I²C) peripheral.
pub trait Twi {
    /// Programs the bit rate for master operation.
    fn set_bitrate(&mut self, bitrate: u32);

    /// Loads the own-address register so the peripheral answers as a
    /// slave on `address`.
    fn listen(&mut self, address: u8);

    /// Disables the peripheral entirely.
    fn disable(&mut self);

    /// Reads the status register with the prescaler bits masked out.
    fn status(&mut self) -> u8;

    /// Loads the data register.
    fn write(&mut self, byte: u8);

    /// Reads the data register.
    fn read(&mut self) -> u8;

    /// Writes one control-register combination.
    fn op(&mut self, op: TwiOp);
}

/// The hardware timer behind the millisecond counter pool.
///
/// `start` arms a 1 kHz periodic interrupt; the platform interrupt
/// handler forwards each tick into the pool.
pub trait TickTimer {
    /// Starts the 1 kHz tick.
    fn start(&mut self);

    /// Stops the tick to save power while no counter is registered.
    fn stop(&mut self);
}

/// The input port the four operator keys hang off.
pub trait KeyPort {
    /// Reads the raw key state as a bitmask, one bit per key, set while
    /// the key is held. Any board-specific polarity inversion happens
    /// in the implementation.
    fn read(&mut self) -> u8;
}

/// Computes the 16-bit USART baud rate divisor for `baud` at CPU clock
/// `f_cpu`, as `f_cpu / (16 * baud) - 1` with the fraction truncated.
pub fn baud_divisor(f_cpu: u32, baud: u32) -> u16 {
    ((f_cpu as f32) / ((16 * baud) as f32) - 1.0) as u16
}

/// Computes the two-wire bit rate register value for `bitrate` at CPU
/// clock `f_cpu`, assuming the /4 prescaler: `f_cpu / (8 * bitrate) - 2`
/// with the fraction truncated.
pub fn twi_bitrate_divisor(f_cpu: u32, bitrate: u32) -> u8 {
    ((f_cpu as f32) / ((8 * bitrate) as f32) - 2.0) as u8
}

/// Computes the compare value that makes a prescaled timer fire at
/// 1 kHz: `f_cpu / prescaler / 1000`, rounded to the nearest count.
pub fn tick_compare_value(f_cpu: u32, prescaler: u32) -> u16 {
    round((f_cpu as f64) / (prescaler as f64) / 1000.0) as u16
}
