//! Interrupt-driven packet state machine over the USART.
//!
//! This is the bus core shared by the RS-232 and IrDA transports; the
//! two differ only in initialization (see [`crate::rs232`] and
//! [`crate::irda`]). The machine has four working states besides idle:
//!
//! ```text
//! Idle ──send_packet──▶ PacketTx ──(last byte out)──▶ AckRx ──▶ Idle
//! Idle ──read_packet──▶ PacketRx ──(frame complete)─▶ AckTx ──▶ Idle
//! ```
//!
//! Two interrupts drive it: data-register-empty pushes transmit bytes,
//! receive-complete pulls receive bytes. A received byte equal to the
//! frame magic restarts the receive buffer, so the receiver finds frame
//! boundaries on its own. The acknowledgement leg of a receive takes two
//! data-register-empty interrupts: one to load the byte, one to confirm
//! it drained before the line is released.
//!
//! All entry points run inside a critical section; the owning
//! [`LinkPort`](crate::port::LinkPort) singleton forwards the platform
//! interrupts here.

use crate::consts::{ASCII_ACK, ASCII_NACK, PACKET_MAGIC, PACKET_SIZE};
use crate::hal::Usart;
use crate::packet::{self, Packet};
use crate::types::Status;

#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
enum UartMode {
    PacketTx,
    PacketRx,
    AckTx,
    AckRx,
    #[default]
    Idle,
}

/// The USART packet link.
///
/// Owns the peripheral, the frame buffer and the status cell its
/// interrupt half publishes through.
#[derive(Debug)]
pub struct UartLink<U: Usart> {
    /// The USART peripheral.
    pub hal: U,
    mode: UartMode,
    ack: u8,
    ack_sent: bool,
    buffer: [u8; PACKET_SIZE],
    position: usize,
    commit: bool,
    received: Option<Packet>,
    status: Status,
}

impl<U: Usart> UartLink<U> {
    /// Wraps a USART peripheral into an idle link.
    pub fn new(hal: U) -> Self {
        UartLink {
            hal,
            mode: UartMode::Idle,
            ack: ASCII_NACK,
            ack_sent: false,
            buffer: [0u8; PACKET_SIZE],
            position: 0,
            commit: false,
            received: None,
            status: Status::armed(),
        }
    }

    /// Snapshot of the status cell.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Takes the packet committed by the last successful receive.
    pub fn take_received(&mut self) -> Option<Packet> {
        self.received.take()
    }

    /// Arms the status cell and starts pushing `packet` out, byte by
    /// byte, from the data-register-empty interrupt.
    pub fn send_packet(&mut self, packet: &Packet) {
        self.buffer = *packet.as_bytes();
        self.position = 0;
        self.commit = false;
        self.mode = UartMode::PacketTx;

        self.status = Status::armed();
        self.hal.set_data_empty_irq(true);
    }

    /// Arms the status cell and waits for an incoming frame. The
    /// received packet is committed only after a positive
    /// acknowledgement went out; collect it with
    /// [`take_received`](Self::take_received).
    pub fn read_packet(&mut self) {
        self.buffer = [0u8; PACKET_SIZE];
        self.position = 0;
        self.mode = UartMode::PacketRx;
        self.hal.drain();

        self.status = Status::armed();
        self.commit = true;
        self.received = None;
        self.hal.set_rx_irq(true);
    }

    /// Masks both interrupt sources and forces the machine idle. Called
    /// from foreground; an interrupt already in flight finds the idle
    /// state and does nothing. The status cell is left unpublished.
    pub fn abort(&mut self) {
        self.hal.set_data_empty_irq(false);
        self.hal.set_rx_irq(false);
        self.mode = UartMode::Idle;
    }

    /// Disables the peripheral.
    pub fn shutdown(&mut self) {
        self.hal.disable();
    }

    /// Data-register-empty interrupt: next transmit byte, or the
    /// acknowledgement leg of a receive.
    pub fn on_data_empty(&mut self) {
        match self.mode {
            UartMode::PacketTx => {
                if self.position < PACKET_SIZE {
                    let byte = self.buffer[self.position];
                    self.position += 1;
                    self.hal.write(byte);
                } else {
                    self.hal.set_data_empty_irq(false);
                    self.mode = UartMode::AckRx;
                    self.hal.set_rx_irq(true);
                }
            }

            UartMode::AckTx => {
                if !self.ack_sent {
                    self.hal.write(self.ack);
                    self.ack_sent = true;
                } else {
                    // Second interrupt: the byte has drained.
                    self.hal.set_data_empty_irq(false);
                    self.mode = UartMode::Idle;
                    self.finish_receive();
                }
            }

            _ => {}
        }
    }

    /// Receive-complete interrupt: next frame byte, or the peer's
    /// acknowledgement of our transmit.
    pub fn on_rx_complete(&mut self) {
        match self.mode {
            UartMode::PacketRx => {
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
                    self.hal.set_rx_irq(false);

                    self.ack = packet::acknowledgement(&self.buffer);
                    self.ack_sent = false;
                    self.mode = UartMode::AckTx;
                    self.hal.set_data_empty_irq(true);
                }
            }

            UartMode::AckRx => {
                self.ack = self.hal.read();
                self.hal.set_rx_irq(false);
                self.mode = UartMode::Idle;
                self.status.publish(self.ack == ASCII_ACK);
            }

            _ => {}
        }
    }

    fn finish_receive(&mut self) {
        if self.ack == ASCII_ACK && self.commit {
            self.received = Some(Packet::from_bytes(self.buffer));
            self.commit = false;
        }
        self.status.publish(self.ack == ASCII_ACK);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockUsart;
    use crate::types::TransferResult;

    fn link() -> UartLink<MockUsart> {
        UartLink::new(MockUsart::new())
    }

    fn pump_tx(link: &mut UartLink<MockUsart>) {
        while link.hal.data_irq {
            link.on_data_empty();
        }
    }

    #[test]
    fn test_send_pushes_frame_then_waits_for_ack() {
        let mut link = link();
        let packet = Packet::new(1, 1, &[1, 2, 3, 4, 5, 6, 7, 8]);
        link.send_packet(&packet);
        assert!(link.hal.data_irq);
        assert!(!link.status().done);

        pump_tx(&mut link);

        assert_eq!(&link.hal.sent[..], packet.as_bytes());
        assert!(!link.hal.data_irq);
        assert!(link.hal.rx_irq);

        link.hal.rx_queue.push_back(ASCII_ACK);
        link.on_rx_complete();

        let status = link.status();
        assert!(status.done);
        assert_eq!(status.result, TransferResult::Success);
        assert!(!link.hal.rx_irq);
    }

    #[test]
    fn test_nack_publishes_failed() {
        let mut link = link();
        link.send_packet(&Packet::new(1, 1, &[0; 8]));
        pump_tx(&mut link);

        link.hal.rx_queue.push_back(ASCII_NACK);
        link.on_rx_complete();

        let status = link.status();
        assert!(status.done);
        assert_eq!(status.result, TransferResult::Failed);
    }

    fn feed(link: &mut UartLink<MockUsart>, bytes: &[u8]) {
        for &byte in bytes {
            link.hal.rx_queue.push_back(byte);
            link.on_rx_complete();
        }
    }

    #[test]
    fn test_receive_commits_after_positive_ack() {
        let mut link = link();
        let packet = Packet::new(1, 1, &[0, 0, 0, 0, 0, 0, 0, 0]);
        link.read_packet();

        feed(&mut link, packet.as_bytes());
        // Frame complete: acknowledgement leg armed, nothing committed yet.
        assert!(!link.hal.rx_irq);
        assert!(link.hal.data_irq);
        assert!(!link.status().done);
        assert!(link.take_received().is_none());

        link.on_data_empty(); // loads the ACK byte
        assert_eq!(link.hal.sent.last(), Some(&ASCII_ACK));
        link.on_data_empty(); // confirms the drain

        let status = link.status();
        assert!(status.done);
        assert_eq!(status.result, TransferResult::Success);
        assert_eq!(link.take_received(), Some(packet));
        assert!(link.take_received().is_none());
    }

    #[test]
    fn test_corrupt_frame_gets_nack_and_no_commit() {
        let mut link = link();
        let mut bytes = *Packet::new(1, 1, &[0; 8]).as_bytes();
        bytes[14] = 1; // break the payload against its checksum
        link.read_packet();

        feed(&mut link, &bytes);
        link.on_data_empty();
        assert_eq!(link.hal.sent.last(), Some(&ASCII_NACK));
        link.on_data_empty();

        let status = link.status();
        assert!(status.done);
        assert_eq!(status.result, TransferResult::Failed);
        assert!(link.take_received().is_none());
    }

    #[test]
    fn test_magic_byte_restarts_the_frame() {
        let mut link = link();
        let packet = Packet::new(1, 1, &[7; 8]);
        link.read_packet();

        // A stray byte, then the real frame: the magic restarts the
        // buffer and the stray byte is discarded.
        feed(&mut link, &[0x42]);
        feed(&mut link, packet.as_bytes());

        link.on_data_empty();
        link.on_data_empty();

        assert_eq!(link.status().result, TransferResult::Success);
        assert_eq!(link.take_received(), Some(packet));
    }

    #[test]
    fn test_abort_masks_interrupts_and_idles() {
        let mut link = link();
        link.send_packet(&Packet::new(1, 1, &[0; 8]));
        link.on_data_empty();
        link.abort();

        assert!(!link.hal.data_irq);
        assert!(!link.hal.rx_irq);
        assert!(!link.status().done);

        // A straggling interrupt is a no-op in the idle state.
        let sent = link.hal.sent.len();
        link.on_data_empty();
        link.on_rx_complete();
        assert_eq!(link.hal.sent.len(), sent);
        assert!(!link.status().done);
    }
}
