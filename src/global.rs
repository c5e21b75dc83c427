//! The shared port singleton and the blocking transfer operations.
//!
//! Foreground code and interrupt handlers share one [`LinkPort`]
//! through a `critical_section` mutex. The helpers here wrap that
//! access: [`shared_port`]/[`install`] set the singleton up, the
//! `isr_*` functions (or the [`link_isr!`](crate::link_isr) macro)
//! forward platform interrupts into it, and the transfer operations
//! run the busy-poll protocol loops of the coordinator.
//!
//! The foreground never sleeps. A packet transfer arms the driver, then
//! spins: each turn takes the critical section briefly, checks the
//! status cell, polls the keys and, on sends, a millisecond timer.
//! Releasing the BACK key aborts the transfer; a send that sees no
//! completion within [`SEND_TIMEOUT_MS`](crate::consts::SEND_TIMEOUT_MS)
//! is abandoned as timed out. Reads wait indefinitely: the peer may
//! simply not have sent yet, so only the operator decides to give up.
//!
//! Message transfers fragment and reassemble around that single-packet
//! loop, granting each packet
//! [`PACKET_ATTEMPTS`](crate::consts::PACKET_ATTEMPTS) tries when the
//! peer answers with a NACK. Any other failure ends the message at
//! once.

use core::cell::RefCell;

use critical_section::Mutex;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use heapless::Vec;

use crate::consts::{MESSAGE_MAX_PACKETS, PACKET_ATTEMPTS, RETRY_PAUSE_MS, SEND_TIMEOUT_MS};
use crate::fmt::{link_debug, link_warn};
use crate::hal::{KeyPort, SpiPort, TickTimer, Twi, Usart};
use crate::keys::Key;
use crate::message::Message;
use crate::packet::Packet;
use crate::port::LinkPort;
use crate::timer::Timer;
use crate::types::{BitrateHint, LinkError, TransferResult, Transport};

/// The shared singleton: a [`LinkPort`] behind a `critical_section`
/// mutex, empty until [`install`] runs.
pub type SharedPort<U, S, T, M, R, E, K, TT, D> =
    Mutex<RefCell<Option<LinkPort<U, S, T, M, R, E, K, TT, D>>>>;

/// An empty singleton, suitable for a `static`.
///
/// ```rust,ignore
/// static LINK_PORT: SharedPort<MyUsart, MySpi, MyTwi, Pin, Pin, Pin, Keys, Tick, Delay> =
///     shared_port();
/// ```
pub const fn shared_port<U, S, T, M, R, E, K, TT, D>() -> SharedPort<U, S, T, M, R, E, K, TT, D>
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
    Mutex::new(RefCell::new(None))
}

/// Places an assembled port into the singleton.
pub fn install<U, S, T, M, R, E, K, TT, D>(
    global: &'static SharedPort<U, S, T, M, R, E, K, TT, D>,
    port: LinkPort<U, S, T, M, R, E, K, TT, D>,
) where
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
    critical_section::with(|cs| {
        let _ = global.borrow(cs).replace(Some(port));
    });
}

/// Runs `f` on the installed port, inside a critical section. Returns
/// `None` while no port is installed.
fn with_port<U, S, T, M, R, E, K, TT, D, F, O>(
    global: &'static SharedPort<U, S, T, M, R, E, K, TT, D>,
    f: F,
) -> Option<O>
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
    F: FnOnce(&mut LinkPort<U, S, T, M, R, E, K, TT, D>) -> O,
{
    critical_section::with(|cs| global.borrow(cs).borrow_mut().as_mut().map(f))
}

macro_rules! isr_forwarder {
    ($(#[$doc:meta])* $name:ident => $method:ident) => {
        $(#[$doc])*
        pub fn $name<U, S, T, M, R, E, K, TT, D>(
            global: &'static SharedPort<U, S, T, M, R, E, K, TT, D>,
        ) where
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
            let _ = with_port(global, |port| port.$method());
        }
    };
}

isr_forwarder! {
    /// Forwards the USART data-register-empty interrupt.
    isr_usart_data_empty => on_usart_data_empty
}
isr_forwarder! {
    /// Forwards the USART receive-complete interrupt.
    isr_usart_rx_complete => on_usart_rx_complete
}
isr_forwarder! {
    /// Forwards the SPI serial-transfer-complete interrupt.
    isr_spi_transfer_complete => on_spi_transfer_complete
}
isr_forwarder! {
    /// Forwards the two-wire event interrupt.
    isr_twi_event => on_twi_event
}
isr_forwarder! {
    /// Forwards the 1 kHz millisecond-timer tick.
    isr_millis_tick => on_millis_tick
}
isr_forwarder! {
    /// Forwards the 1 kHz key-debounce tick.
    isr_key_tick => on_key_tick
}

/// Selects the transport used by subsequent transfers.
pub fn select_transport<U, S, T, M, R, E, K, TT, D>(
    global: &'static SharedPort<U, S, T, M, R, E, K, TT, D>,
    transport: Transport,
) where
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
    let _ = with_port(global, |port| port.select_transport(transport));
}

/// Sets the line-speed hint used by subsequent transfers.
pub fn set_bitrate_hint<U, S, T, M, R, E, K, TT, D>(
    global: &'static SharedPort<U, S, T, M, R, E, K, TT, D>,
    hint: BitrateHint,
) where
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
    let _ = with_port(global, |port| port.set_bitrate_hint(hint));
}

enum Step {
    Pending,
    Done(TransferResult),
}

/// Pushes one packet through the armed driver, spinning until the
/// status cell publishes, the operator aborts, or the send times out.
fn transfer_out<U, S, T, M, R, E, K, TT, D>(
    global: &'static SharedPort<U, S, T, M, R, E, K, TT, D>,
    packet: &Packet,
) -> TransferResult
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
    let mut timer = Timer::new();
    let armed = with_port(global, |port| {
        if !port.timers.start(&mut timer) {
            return false;
        }
        port.begin_send(packet);
        true
    });
    if armed != Some(true) {
        return TransferResult::Error;
    }

    let result = loop {
        let step = with_port(global, |port| {
            if let Ok(result) = port.poll_transfer() {
                return Step::Done(result);
            }

            port.poll_keys();
            if port.key_released(Key::Back) {
                port.abort();
                return Step::Done(TransferResult::Aborted);
            }
            if port.timers.millis(&timer) > SEND_TIMEOUT_MS {
                port.abort();
                return Step::Done(TransferResult::Timeout);
            }

            Step::Pending
        });

        match step {
            Some(Step::Pending) => {}
            Some(Step::Done(result)) => break result,
            None => break TransferResult::Error,
        }
    };

    let _ = with_port(global, |port| port.timers.stop(&mut timer));
    result
}

/// Waits for one packet on the armed driver. No deadline: the peer may
/// not have sent yet, so only a BACK release ends the wait early.
fn transfer_in<U, S, T, M, R, E, K, TT, D>(
    global: &'static SharedPort<U, S, T, M, R, E, K, TT, D>,
) -> TransferResult
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
    let armed = with_port(global, |port| port.begin_read());
    if armed.is_none() {
        return TransferResult::Error;
    }

    loop {
        let step = with_port(global, |port| {
            if let Ok(result) = port.poll_transfer() {
                return Step::Done(result);
            }

            port.poll_keys();
            if port.key_released(Key::Back) {
                port.abort();
                return Step::Done(TransferResult::Aborted);
            }

            Step::Pending
        });

        match step {
            Some(Step::Pending) => {}
            Some(Step::Done(result)) => return result,
            None => return TransferResult::Error,
        }
    }
}

/// Spins for `milliseconds` on a pool timer, without key handling.
fn pause<U, S, T, M, R, E, K, TT, D>(
    global: &'static SharedPort<U, S, T, M, R, E, K, TT, D>,
    milliseconds: u16,
) where
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
    let mut timer = Timer::new();
    if with_port(global, |port| port.timers.start(&mut timer)) != Some(true) {
        return;
    }

    loop {
        match with_port(global, |port| port.timers.millis(&timer) >= milliseconds) {
            Some(false) => {}
            _ => break,
        }
    }

    let _ = with_port(global, |port| port.timers.stop(&mut timer));
}

/// Waits out `milliseconds`, polling the keys throughout. Returns
/// [`TransferResult::Timeout`] when the time elapsed undisturbed, or
/// [`TransferResult::Aborted`] when the operator released BACK first.
pub fn wait_ms<U, S, T, M, R, E, K, TT, D>(
    global: &'static SharedPort<U, S, T, M, R, E, K, TT, D>,
    milliseconds: u16,
) -> TransferResult
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
    let mut timer = Timer::new();
    if with_port(global, |port| port.timers.start(&mut timer)) != Some(true) {
        return TransferResult::Error;
    }

    let result = loop {
        let step = with_port(global, |port| {
            port.poll_keys();
            if port.key_released(Key::Back) {
                return Step::Done(TransferResult::Aborted);
            }
            if port.timers.millis(&timer) >= milliseconds {
                return Step::Done(TransferResult::Timeout);
            }
            Step::Pending
        });

        match step {
            Some(Step::Pending) => {}
            Some(Step::Done(result)) => break result,
            None => break TransferResult::Error,
        }
    };

    let _ = with_port(global, |port| port.timers.stop(&mut timer));
    result
}

/// Sends a single packet: initializes the current transport, runs one
/// acknowledged transfer and shuts the transport down again.
pub fn send_packet<U, S, T, M, R, E, K, TT, D>(
    global: &'static SharedPort<U, S, T, M, R, E, K, TT, D>,
    packet: &Packet,
) -> Result<(), LinkError>
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
    if with_port(global, |port| port.initialize_tx()).is_none() {
        return Err(LinkError::Exhausted);
    }
    let result = transfer_out(global, packet);
    let _ = with_port(global, |port| port.shutdown());
    result.into_result()
}

/// Receives a single packet: initializes the current transport, waits
/// for one acknowledged frame and shuts the transport down again.
pub fn read_packet<U, S, T, M, R, E, K, TT, D>(
    global: &'static SharedPort<U, S, T, M, R, E, K, TT, D>,
) -> Result<Packet, LinkError>
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
    if with_port(global, |port| port.initialize_rx()).is_none() {
        return Err(LinkError::Exhausted);
    }
    let result = transfer_in(global);
    let received = with_port(global, |port| port.take_received()).flatten();
    let _ = with_port(global, |port| port.shutdown());

    result.into_result()?;
    received.ok_or(LinkError::Failed)
}

/// Sends a whole message over the current transport.
///
/// The message is fragmented into packets; each packet is granted the
/// attempt budget against NACKs, with a short pause between attempts.
/// Any non-retryable failure ends the transmission and surfaces as the
/// error.
pub fn send_message<U, S, T, M, R, E, K, TT, D>(
    global: &'static SharedPort<U, S, T, M, R, E, K, TT, D>,
    message: &Message,
) -> Result<(), LinkError>
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
    let packets = message.to_packets();
    link_debug!("sending message, {} packets", packets.len());

    if with_port(global, |port| port.initialize_tx()).is_none() {
        return Err(LinkError::Exhausted);
    }

    let mut outcome = TransferResult::Success;
    for packet in &packets {
        let mut attempts = 0;
        loop {
            attempts += 1;
            outcome = transfer_out(global, packet);
            if outcome != TransferResult::Failed || attempts >= PACKET_ATTEMPTS {
                break;
            }
            link_debug!("packet {} rejected, retrying", packet.index());
            pause(global, RETRY_PAUSE_MS);
        }

        if outcome != TransferResult::Success {
            link_warn!("message send ended at packet {}", packet.index());
            break;
        }
    }

    let _ = with_port(global, |port| port.shutdown());
    outcome.into_result()
}

/// Receives a whole message over the current transport.
///
/// Packets may arrive more than once: whenever packet 1 shows up the
/// assembly restarts with the total it announces. A gap or repetition
/// in the running index fails the message; a packet stream that never
/// presents packet 1 is ignored until the operator gives up.
pub fn read_message<U, S, T, M, R, E, K, TT, D>(
    global: &'static SharedPort<U, S, T, M, R, E, K, TT, D>,
) -> Result<Message, LinkError>
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
    if with_port(global, |port| port.initialize_rx()).is_none() {
        return Err(LinkError::Exhausted);
    }

    let mut packets: Vec<Packet, MESSAGE_MAX_PACKETS> = Vec::new();
    let mut expected: usize = 0;

    let outcome = loop {
        let mut result = TransferResult::Failed;
        let mut attempts = 0;
        while result == TransferResult::Failed && attempts < PACKET_ATTEMPTS {
            attempts += 1;
            result = transfer_in(global);
        }
        if result != TransferResult::Success {
            break result;
        }

        let Some(packet) = with_port(global, |port| port.take_received()).flatten() else {
            break TransferResult::Error;
        };

        let index = packet.index() as usize;
        let total = packet.total() as usize;

        if index == 1 {
            // The peer (re)started its transmission: size the assembly
            // to what it announces.
            packets.clear();
            if total > MESSAGE_MAX_PACKETS {
                link_warn!("announced total {} exceeds the packet arena", total);
                break TransferResult::Error;
            }
            expected = total;
        }

        if expected == 0 {
            // Joined mid-message; wait for the peer to start over.
            continue;
        }

        if packets.push(packet).is_err() {
            break TransferResult::Error;
        }
        if packets.len() != index {
            link_warn!("packet {} arrived at position {}", index, packets.len());
            break TransferResult::Failed;
        }
        if packets.len() >= expected {
            break TransferResult::Success;
        }
    };

    let _ = with_port(global, |port| port.shutdown());

    outcome.into_result()?;
    link_debug!("message received, {} packets", packets.len());
    Message::from_packets(&packets).map_err(|_| LinkError::Failed)
}

/// Declares a `static LINK_PORT` singleton over the given peripheral
/// types.
///
/// ```rust,ignore
/// init_link_port!(MyUsart, MySpi, MyTwi, Pin, Pin, Pin, MyKeys, MyTick, MyDelay);
///
/// fn main() {
///     buslink::global::install(&LINK_PORT, port);
/// }
/// ```
#[macro_export]
macro_rules! init_link_port {
    ( $u:ty, $s:ty, $t:ty, $m:ty, $r:ty, $e:ty, $k:ty, $tt:ty, $d:ty ) => {
        pub static LINK_PORT: $crate::global::SharedPort<$u, $s, $t, $m, $r, $e, $k, $tt, $d> =
            $crate::global::shared_port();
    };
}

/// Forwards a platform interrupt into the `LINK_PORT` singleton
/// declared by [`init_link_port!`](crate::init_link_port).
///
/// ```rust,ignore
/// #[interrupt]
/// fn USART_UDRE() {
///     link_isr!(usart_data_empty);
/// }
/// ```
#[macro_export]
macro_rules! link_isr {
    (usart_data_empty) => {
        $crate::global::isr_usart_data_empty(&LINK_PORT)
    };
    (usart_rx_complete) => {
        $crate::global::isr_usart_rx_complete(&LINK_PORT)
    };
    (spi_transfer_complete) => {
        $crate::global::isr_spi_transfer_complete(&LINK_PORT)
    };
    (twi_event) => {
        $crate::global::isr_twi_event(&LINK_PORT)
    };
    (millis_tick) => {
        $crate::global::isr_millis_tick(&LINK_PORT)
    };
    (key_tick) => {
        $crate::global::isr_key_tick(&LINK_PORT)
    };
}
