//! IrDA flavor of the UART link, through an external infrared endec.
//!
//! The endec sits between the USART and the IR transceiver and is
//! managed over three control lines: an enable line, a reset line and a
//! MODE line that switches the chip between command mode and data mode.
//! Changing the line rate means dropping into command mode at the
//! default 9600 baud, issuing the two-byte rate-change command, then
//! returning to data mode and reprogramming the UART divisor to match.
//!
//! The endec only speaks standard rates, so the aberrant hints collapse
//! onto their regular neighbours here.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;

use crate::hal::Usart;
use crate::types::BitrateHint;
use crate::uart::UartLink;

/// Endec opcode for "change baud rate"; followed by one rate byte.
const CMD_CHANGE_RATE: u8 = 0x11;

/// Rate byte per bitrate hint.
const RATE_COMMANDS: [u8; 4] = [
    0x87, // 9600, SlowRegular
    0x87, // 9600, SlowAberrant
    0x81, // 115200, FastRegular
    0x81, // 115200, FastAberrant
];

/// UART line rates matching [`RATE_COMMANDS`].
pub const BITRATES: [u32; 4] = [9600, 9600, 115200, 115200];

/// Control lines of the infrared endec.
#[derive(Debug)]
pub struct Endec<M, R, E>
where
    M: OutputPin,
    R: OutputPin,
    E: OutputPin,
{
    /// MODE line: low selects command mode, high data mode.
    pub mode: M,
    /// Reset line, strobed high to reset the chip.
    pub reset: R,
    /// Enable line powering the IR front end.
    pub enable: E,
}

impl<M, R, E> Endec<M, R, E>
where
    M: OutputPin,
    R: OutputPin,
    E: OutputPin,
{
    /// Groups the three control lines.
    pub fn new(mode: M, reset: R, enable: E) -> Self {
        Endec {
            mode,
            reset,
            enable,
        }
    }

    fn set_enabled(&mut self, enabled: bool, delay: &mut impl DelayNs) {
        if enabled {
            let _ = self.enable.set_high();
            // The chip wants at least 1000 oscillator periods to settle.
            delay.delay_ms(1);
        } else {
            let _ = self.enable.set_low();
        }
    }

    fn pulse_reset(&mut self, delay: &mut impl DelayNs) {
        let _ = self.reset.set_high();
        delay.delay_us(10);
        let _ = self.reset.set_low();
        delay.delay_ms(18);
    }

    fn set_rate<U: Usart>(&mut self, uart: &mut U, hint: BitrateHint, delay: &mut impl DelayNs) {
        // Commands always go out at the default rate.
        uart.set_baudrate(9600);

        // Into command mode, with propagation delay.
        let _ = self.mode.set_low();
        delay.delay_us(100);

        uart.send_byte_blocking(RATE_COMMANDS[hint.index()]);
        uart.send_byte_blocking(CMD_CHANGE_RATE);

        // Back to data mode.
        let _ = self.mode.set_high();
        delay.delay_us(100);

        uart.set_baudrate(BITRATES[hint.index()]);
    }
}

/// Brings the UART and the endec up at the hinted rate. Same sequence
/// for both transfer directions.
pub fn initialize<U, M, R, E>(
    link: &mut UartLink<U>,
    endec: &mut Endec<M, R, E>,
    hint: BitrateHint,
    delay: &mut impl DelayNs,
) where
    U: Usart,
    M: OutputPin,
    R: OutputPin,
    E: OutputPin,
{
    link.hal.enable();
    endec.set_enabled(true, delay);
    endec.pulse_reset(delay);
    endec.set_rate(&mut link.hal, hint, delay);
}

/// Powers the endec down and disables the UART, leaving a moment for a
/// trailing byte to finish.
pub fn shutdown<U, M, R, E>(
    link: &mut UartLink<U>,
    endec: &mut Endec<M, R, E>,
    delay: &mut impl DelayNs,
) where
    U: Usart,
    M: OutputPin,
    R: OutputPin,
    E: OutputPin,
{
    delay.delay_ms(1);
    endec.set_enabled(false, delay);
    link.shutdown();
}
