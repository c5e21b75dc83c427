//! The transport dispatcher: one live bus at a time.
//!
//! [`LinkPort`] owns everything the transfer layer shares with
//! interrupt context: the three bus links (the UART one serving both
//! RS-232 and IrDA), the infrared endec, the key scanner, the
//! millisecond timer pool and the dead-time delay. Exactly one
//! transport is current at any time; every operation dispatches on that
//! selection with a plain `match`; the set of buses is closed and
//! known at compile time, so no function-pointer table is needed.
//!
//! The port lives inside a `critical_section` mutex singleton (see
//! [`crate::global`]); the platform's interrupt handlers forward into
//! the `on_*` entry points, foreground code drives the rest. Switching
//! transports is only meaningful between transfers, after the previous
//! driver's shutdown.

use core::convert::Infallible;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;

use crate::hal::{KeyPort, SpiPort, TickTimer, Twi, Usart};
use crate::i2c::I2cLink;
use crate::irda::{self, Endec};
use crate::keys::{Key, KeyScanner};
use crate::packet::Packet;
use crate::rs232;
use crate::spi::SpiLink;
use crate::timer::TimerPool;
use crate::types::{BitrateHint, Status, TransferResult, Transport};
use crate::uart::UartLink;

/// The transfer core of the board: bus links, operator input and
/// timing, behind one transport selection.
#[derive(Debug)]
pub struct LinkPort<U, S, T, M, R, E, K, TT, D>
where
    U: Usart,
    S: SpiPort,
    T: Twi,
    M: OutputPin,
    R: OutputPin,
    E: OutputPin,
    K: KeyPort,
    TT: TickTimer,
    D: DelayNs,
{
    /// The UART link, shared by the RS-232 and IrDA transports.
    pub uart: UartLink<U>,
    /// The SPI link.
    pub spi: SpiLink<S>,
    /// The two-wire link.
    pub i2c: I2cLink<T>,
    /// The infrared endec control lines.
    pub endec: Endec<M, R, E>,
    /// The operator key scanner.
    pub keys: KeyScanner<K>,
    /// The millisecond counter pool.
    pub timers: TimerPool<TT>,
    delay: D,
    transport: Transport,
    hint: BitrateHint,
}

impl<U, S, T, M, R, E, K, TT, D> LinkPort<U, S, T, M, R, E, K, TT, D>
where
    U: Usart,
    S: SpiPort,
    T: Twi,
    M: OutputPin,
    R: OutputPin,
    E: OutputPin,
    K: KeyPort,
    TT: TickTimer,
    D: DelayNs,
{
    /// Assembles the port from its peripherals. RS-232 at the slow
    /// regular rate is current until told otherwise.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        usart: U,
        spi: S,
        twi: T,
        endec: Endec<M, R, E>,
        keys: KeyScanner<K>,
        timers: TimerPool<TT>,
        delay: D,
    ) -> Self {
        LinkPort {
            uart: UartLink::new(usart),
            spi: SpiLink::new(spi),
            i2c: I2cLink::new(twi),
            endec,
            keys,
            timers,
            delay,
            transport: Transport::Rs232,
            hint: BitrateHint::SlowRegular,
        }
    }

    /// Makes `transport` current for subsequent transfers.
    pub fn select_transport(&mut self, transport: Transport) {
        self.transport = transport;
    }

    /// The current transport.
    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// Sets the line-speed hint forwarded to the drivers.
    pub fn set_bitrate_hint(&mut self, hint: BitrateHint) {
        self.hint = hint;
    }

    /// The current line-speed hint.
    pub fn bitrate_hint(&self) -> BitrateHint {
        self.hint
    }

    /// Initializes the current transport for sending at the hinted
    /// rate.
    pub fn initialize_tx(&mut self) {
        match self.transport {
            Transport::Rs232 => rs232::initialize(&mut self.uart, self.hint),
            Transport::Irda => {
                irda::initialize(&mut self.uart, &mut self.endec, self.hint, &mut self.delay)
            }
            Transport::Spi => self.spi.initialize_tx(self.hint),
            Transport::I2c => self.i2c.initialize_tx(self.hint),
        }
    }

    /// Initializes the current transport for receiving at the hinted
    /// rate.
    pub fn initialize_rx(&mut self) {
        match self.transport {
            Transport::Rs232 => rs232::initialize(&mut self.uart, self.hint),
            Transport::Irda => {
                irda::initialize(&mut self.uart, &mut self.endec, self.hint, &mut self.delay)
            }
            Transport::Spi => self.spi.initialize_rx(self.hint),
            Transport::I2c => self.i2c.initialize_rx(self.hint),
        }
    }

    /// Shuts the current transport's peripheral down.
    pub fn shutdown(&mut self) {
        match self.transport {
            Transport::Rs232 => self.uart.shutdown(),
            Transport::Irda => irda::shutdown(&mut self.uart, &mut self.endec, &mut self.delay),
            Transport::Spi => self.spi.shutdown(),
            Transport::I2c => self.i2c.shutdown(),
        }
    }

    /// Arms the current driver and starts pushing `packet`.
    pub fn begin_send(&mut self, packet: &Packet) {
        match self.transport {
            Transport::Rs232 | Transport::Irda => self.uart.send_packet(packet),
            Transport::Spi => self.spi.send_packet(packet),
            Transport::I2c => self.i2c.send_packet(packet),
        }
    }

    /// Arms the current driver for one incoming packet.
    pub fn begin_read(&mut self) {
        match self.transport {
            Transport::Rs232 | Transport::Irda => self.uart.read_packet(),
            Transport::Spi => self.spi.read_packet(),
            Transport::I2c => self.i2c.read_packet(),
        }
    }

    /// Cancels the transfer in flight: interrupt sources masked, bus
    /// released, machine idle. The status cell stays unpublished; the
    /// caller reports the reason itself.
    pub fn abort(&mut self) {
        match self.transport {
            Transport::Rs232 | Transport::Irda => self.uart.abort(),
            Transport::Spi => self.spi.abort(),
            Transport::I2c => self.i2c.abort(),
        }
    }

    /// Snapshot of the current driver's status cell.
    pub fn status(&self) -> Status {
        match self.transport {
            Transport::Rs232 | Transport::Irda => self.uart.status(),
            Transport::Spi => self.spi.status(),
            Transport::I2c => self.i2c.status(),
        }
    }

    /// Completion of the transfer in flight, non-blocking: the result
    /// once the status cell has published, `WouldBlock` before that.
    pub fn poll_transfer(&self) -> nb::Result<TransferResult, Infallible> {
        let status = self.status();
        if status.done {
            Ok(status.result)
        } else {
            Err(nb::Error::WouldBlock)
        }
    }

    /// Takes the packet committed by the last successful receive on the
    /// current transport.
    pub fn take_received(&mut self) -> Option<Packet> {
        match self.transport {
            Transport::Rs232 | Transport::Irda => self.uart.take_received(),
            Transport::Spi => self.spi.take_received(),
            Transport::I2c => self.i2c.take_received(),
        }
    }

    /// Latches the debounced key state for edge detection.
    pub fn poll_keys(&mut self) {
        self.keys.poll();
    }

    /// True when `key` went from held to released between the last two
    /// polls.
    pub fn key_released(&self, key: Key) -> bool {
        self.keys.was_released(key)
    }

    /// USART data-register-empty interrupt.
    pub fn on_usart_data_empty(&mut self) {
        self.uart.on_data_empty();
    }

    /// USART receive-complete interrupt.
    pub fn on_usart_rx_complete(&mut self) {
        self.uart.on_rx_complete();
    }

    /// SPI serial-transfer-complete interrupt.
    pub fn on_spi_transfer_complete(&mut self) {
        self.spi.on_transfer_complete(&mut self.delay);
    }

    /// Two-wire event interrupt.
    pub fn on_twi_event(&mut self) {
        self.i2c.on_event(&mut self.delay);
    }

    /// 1 kHz tick of the millisecond timer.
    pub fn on_millis_tick(&mut self) {
        self.timers.tick();
    }

    /// 1 kHz tick of the key debounce sampler.
    pub fn on_key_tick(&mut self) {
        self.keys.on_tick();
    }
}
