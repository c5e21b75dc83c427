//! Interrupt-driven packet state machine over the SPI bus.
//!
//! The packet sender runs the bus as master; the receiver is clocked as
//! slave. For the acknowledgement leg the logical roles swap but the
//! machine simply keeps clocking: the master pushes one dummy byte to
//! collect the acknowledgement, the slave preloads its data register so
//! the byte rides the next master-initiated clock.
//!
//! A 200 µs dead time separates the packet and acknowledgement legs, so
//! the slave has time to verify the checksum before its answer is
//! clocked out.
//!
//! One interrupt (serial transfer complete) drives all four working
//! states. The magic-byte resynchronisation rule applies on receive,
//! which also disposes of the dummy byte the master clocks out first.

use embedded_hal::delay::DelayNs;

use crate::consts::{ASCII_ACK, ASCII_NACK, PACKET_MAGIC, PACKET_SIZE};
use crate::hal::{SpiClock, SpiPort};
use crate::packet::{self, Packet};
use crate::types::{BitrateHint, Status};

/// Dead time between the packet and acknowledgement legs.
const ACK_DEAD_TIME_US: u32 = 200;

#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
enum SpiMode {
    PacketTx,
    PacketRx,
    AckTx,
    AckRx,
    #[default]
    Idle,
}

/// The SPI packet link.
#[derive(Debug)]
pub struct SpiLink<S: SpiPort> {
    /// The SPI peripheral.
    pub hal: S,
    mode: SpiMode,
    ack: u8,
    buffer: [u8; PACKET_SIZE],
    position: usize,
    commit: bool,
    received: Option<Packet>,
    status: Status,
}

impl<S: SpiPort> SpiLink<S> {
    /// Wraps an SPI peripheral into an idle link.
    pub fn new(hal: S) -> Self {
        SpiLink {
            hal,
            mode: SpiMode::Idle,
            ack: ASCII_NACK,
            buffer: [0u8; PACKET_SIZE],
            position: 0,
            commit: false,
            received: None,
            status: Status::armed(),
        }
    }

    /// Configures the bus for sending: master mode, clock per hint
    /// (fast hints divide the CPU clock by 4, slow ones by 128).
    pub fn initialize_tx(&mut self, hint: BitrateHint) {
        let clock = match hint {
            BitrateHint::FastRegular | BitrateHint::FastAberrant => SpiClock::Div4,
            _ => SpiClock::Div128,
        };
        self.hal.enable_master(clock);
    }

    /// Configures the bus for receiving: slave mode, clocked by the
    /// sending peer.
    pub fn initialize_rx(&mut self, _hint: BitrateHint) {
        self.hal.enable_slave();
    }

    /// Disables the peripheral.
    pub fn shutdown(&mut self) {
        self.hal.disable();
    }

    /// Snapshot of the status cell.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Takes the packet committed by the last successful receive.
    pub fn take_received(&mut self) -> Option<Packet> {
        self.received.take()
    }

    /// Arms the status cell and starts clocking `packet` out. A dummy
    /// byte starts the transfer; the interrupt pushes the rest.
    pub fn send_packet(&mut self, packet: &Packet) {
        self.buffer = *packet.as_bytes();
        self.position = 0;
        self.commit = false;
        self.mode = SpiMode::PacketTx;

        self.status = Status::armed();
        self.hal.set_irq(true);
        self.hal.write(0x00);
    }

    /// Arms the status cell and waits for the master to clock a frame
    /// in. Preloads a zero so the first exchange carries no garbage.
    pub fn read_packet(&mut self) {
        self.buffer = [0u8; PACKET_SIZE];
        self.position = 0;
        self.mode = SpiMode::PacketRx;

        self.status = Status::armed();
        self.commit = true;
        self.received = None;
        self.hal.set_irq(true);
        self.hal.write(0x00);
    }

    /// Masks the interrupt and forces the machine idle.
    pub fn abort(&mut self) {
        self.hal.set_irq(false);
        self.mode = SpiMode::Idle;
    }

    /// Serial-transfer-complete interrupt.
    pub fn on_transfer_complete(&mut self, delay: &mut impl DelayNs) {
        match self.mode {
            SpiMode::PacketTx => {
                if self.position < PACKET_SIZE {
                    let byte = self.buffer[self.position];
                    self.position += 1;
                    self.hal.write(byte);
                } else {
                    self.mode = SpiMode::AckRx;

                    // Leave the slave time to verify the checksum, then
                    // clock its answer out.
                    delay.delay_us(ACK_DEAD_TIME_US);
                    self.hal.write(0x00);
                }
            }

            SpiMode::PacketRx => {
                if self.position >= PACKET_SIZE {
                    return;
                }

                let byte = self.hal.read();
                if byte == PACKET_MAGIC {
                    self.position = 0;
                }

                self.buffer[self.position] = byte;
                self.position += 1;
                if self.position >= PACKET_SIZE {
                    self.ack = packet::acknowledgement(&self.buffer);
                    self.mode = SpiMode::AckTx;

                    // Preload the answer for the master to pick up.
                    self.hal.write(self.ack);
                } else {
                    self.hal.write(0x00);
                }
            }

            SpiMode::AckTx => {
                self.hal.set_irq(false);
                self.mode = SpiMode::Idle;

                if self.ack == ASCII_ACK && self.commit {
                    self.received = Some(Packet::from_bytes(self.buffer));
                    self.commit = false;
                }
                self.status.publish(self.ack == ASCII_ACK);
            }

            SpiMode::AckRx => {
                self.ack = self.hal.read();
                self.hal.set_irq(false);
                self.mode = SpiMode::Idle;
                self.status.publish(self.ack == ASCII_ACK);
            }

            SpiMode::Idle => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{CountingDelay, MockSpi};
    use crate::types::TransferResult;

    fn link() -> SpiLink<MockSpi> {
        SpiLink::new(MockSpi::new())
    }

    #[test]
    fn test_hint_selects_master_clock() {
        let mut fast = link();
        fast.initialize_tx(BitrateHint::FastAberrant);
        assert_eq!(fast.hal.master_clock, Some(SpiClock::Div4));

        let mut slow = link();
        slow.initialize_tx(BitrateHint::SlowRegular);
        assert_eq!(slow.hal.master_clock, Some(SpiClock::Div128));

        let mut receiver = link();
        receiver.initialize_rx(BitrateHint::FastRegular);
        assert!(receiver.hal.slave);
    }

    #[test]
    fn test_master_send_clocks_frame_then_collects_ack() {
        let mut link = link();
        let mut delay = CountingDelay::new();
        let packet = Packet::new(1, 1, &[1, 2, 3, 4, 5, 6, 7, 8]);

        link.send_packet(&packet);
        assert_eq!(link.hal.written.last(), Some(&0x00)); // starter dummy

        // One transfer-complete per byte on the wire.
        for _ in 0..PACKET_SIZE {
            link.on_transfer_complete(&mut delay);
        }
        assert_eq!(&link.hal.written[1..], packet.as_bytes());

        // Frame is out; the next interrupt opens the acknowledgement leg
        // after the dead time.
        link.on_transfer_complete(&mut delay);
        assert_eq!(delay.us, 200);
        assert_eq!(link.hal.written.last(), Some(&0x00));

        link.hal.rx_queue.push_back(ASCII_ACK);
        link.on_transfer_complete(&mut delay);

        let status = link.status();
        assert!(status.done);
        assert_eq!(status.result, TransferResult::Success);
        assert!(!link.hal.irq);
    }

    #[test]
    fn test_slave_receive_acks_and_commits() {
        let mut link = link();
        let mut delay = CountingDelay::new();
        let packet = Packet::new(2, 3, &[9; 8]);

        link.read_packet();
        // The master's starter dummy, then the frame; the magic restarts
        // the buffer over the dummy.
        link.hal.rx_queue.push_back(0x00);
        link.on_transfer_complete(&mut delay);
        for &byte in packet.as_bytes() {
            link.hal.rx_queue.push_back(byte);
            link.on_transfer_complete(&mut delay);
        }

        // The answer is preloaded for the master's next clock.
        assert_eq!(link.hal.written.last(), Some(&ASCII_ACK));
        assert!(!link.status().done);

        // Master clocks the answer out.
        link.on_transfer_complete(&mut delay);

        let status = link.status();
        assert!(status.done);
        assert_eq!(status.result, TransferResult::Success);
        assert_eq!(link.take_received(), Some(packet));
        assert!(!link.hal.irq);
    }

    #[test]
    fn test_corrupt_frame_answers_nack() {
        let mut link = link();
        let mut delay = CountingDelay::new();
        let mut bytes = *Packet::new(1, 1, &[0; 8]).as_bytes();
        bytes[10] = 0x55;

        link.read_packet();
        for &byte in &bytes {
            link.hal.rx_queue.push_back(byte);
            link.on_transfer_complete(&mut delay);
        }
        assert_eq!(link.hal.written.last(), Some(&ASCII_NACK));

        link.on_transfer_complete(&mut delay);
        assert_eq!(link.status().result, TransferResult::Failed);
        assert!(link.take_received().is_none());
    }

    #[test]
    fn test_abort_masks_interrupt_and_idles() {
        let mut link = link();
        let mut delay = CountingDelay::new();
        link.send_packet(&Packet::new(1, 1, &[0; 8]));
        link.abort();

        assert!(!link.hal.irq);
        let written = link.hal.written.len();
        link.on_transfer_complete(&mut delay);
        assert_eq!(link.hal.written.len(), written);
        assert!(!link.status().done);
    }
}
