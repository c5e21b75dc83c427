//! Interrupt-driven packet state machine over the two-wire (I²C) bus.
//!
//! Every peer answers as a slave on the fixed address
//! [`TWI_SLAVE_ADDRESS`](crate::consts::TWI_SLAVE_ADDRESS) and speaks as
//! a master when it has something to say. The four working states map
//! onto the four bus roles:
//!
//! | state | role |
//! |-------|------|
//! | packet out | master transmitter |
//! | packet in  | slave receiver |
//! | acknowledgement out | slave transmitter |
//! | acknowledgement in  | master receiver |
//!
//! A single interrupt delivers a status code per bus event; each state
//! dispatches on it. The bus has native addressing and framing, so the
//! magic-byte resynchronisation rule of the serial buses does not apply
//! here.
//!
//! Arbitration loss is handled asymmetrically, matching the observed
//! behavior of the board: the packet transmitter answers it with a
//! RESTART, while the acknowledgement-leg master receiver releases the
//! bus and lets the foreground timeout surface the failure. Address or
//! data NACKs on the master legs likewise release the bus without
//! publishing completion.

use embedded_hal::delay::DelayNs;

use crate::consts::{ASCII_ACK, ASCII_NACK, PACKET_SIZE, TWI_SLAVE_ADDRESS};
use crate::hal::{Twi, TwiOp};
use crate::packet::{self, Packet};
use crate::types::{BitrateHint, Status};

/// Two-wire status codes, prescaler bits masked out.
///
/// The `MT`/`MR`/`SR`/`ST` prefixes follow the four bus roles: master
/// transmitter/receiver, slave receiver/transmitter.
pub mod status {
    /// Illegal start/stop or corrupted transfer, any role.
    pub const BUS_ERROR: u8 = 0x00;
    /// START condition transmitted.
    pub const START: u8 = 0x08;
    /// Repeated START condition transmitted.
    pub const REP_START: u8 = 0x10;
    /// SLA+W transmitted, ACK received.
    pub const MT_SLA_ACK: u8 = 0x18;
    /// SLA+W transmitted, NACK received.
    pub const MT_SLA_NACK: u8 = 0x20;
    /// Data byte transmitted, ACK received.
    pub const MT_DATA_ACK: u8 = 0x28;
    /// Data byte transmitted, NACK received.
    pub const MT_DATA_NACK: u8 = 0x30;
    /// Bus arbitration lost, any master role.
    pub const ARB_LOST: u8 = 0x38;
    /// SLA+R transmitted, ACK received.
    pub const MR_SLA_ACK: u8 = 0x40;
    /// SLA+R transmitted, NACK received.
    pub const MR_SLA_NACK: u8 = 0x48;
    /// Data byte received, ACK returned.
    pub const MR_DATA_ACK: u8 = 0x50;
    /// Data byte received, NACK returned.
    pub const MR_DATA_NACK: u8 = 0x58;
    /// Own SLA+W received, ACK returned.
    pub const SR_SLA_ACK: u8 = 0x60;
    /// Data byte received as slave, ACK returned.
    pub const SR_DATA_ACK: u8 = 0x80;
    /// Data byte received as slave, NACK returned.
    pub const SR_DATA_NACK: u8 = 0x88;
    /// STOP or repeated START while addressed as slave.
    pub const SR_STOP: u8 = 0xa0;
    /// Own SLA+R received, ACK returned.
    pub const ST_SLA_ACK: u8 = 0xa8;
    /// Data byte transmitted as slave, ACK received.
    pub const ST_DATA_ACK: u8 = 0xb8;
    /// Data byte transmitted as slave, NACK received.
    pub const ST_DATA_NACK: u8 = 0xc0;
    /// Last data byte transmitted as slave, ACK received.
    pub const ST_LAST_DATA_ACK: u8 = 0xc8;
}

/// Dead time before collecting the acknowledgement, leaving the slave
/// room to verify the checksum.
const ACK_DEAD_TIME_US: u32 = 200;

/// Bus clock rates per bitrate hint.
pub const BITRATES: [u32; 4] = [
    10_000,  // SlowRegular
    12_345,  // SlowAberrant
    100_000, // FastRegular
    123_456, // FastAberrant
];

const SLA_W: u8 = TWI_SLAVE_ADDRESS << 1;
const SLA_R: u8 = SLA_W | 0x01;

#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
enum I2cMode {
    PacketTx,
    PacketRx,
    AckTx,
    AckRx,
    #[default]
    Idle,
}

/// The two-wire packet link.
#[derive(Debug)]
pub struct I2cLink<T: Twi> {
    /// The two-wire peripheral.
    pub hal: T,
    mode: I2cMode,
    ack: u8,
    buffer: [u8; PACKET_SIZE],
    position: usize,
    commit: bool,
    received: Option<Packet>,
    status: Status,
}

impl<T: Twi> I2cLink<T> {
    /// Wraps a two-wire peripheral into an idle link.
    pub fn new(hal: T) -> Self {
        I2cLink {
            hal,
            mode: I2cMode::Idle,
            ack: ASCII_NACK,
            buffer: [0u8; PACKET_SIZE],
            position: 0,
            commit: false,
            received: None,
            status: Status::armed(),
        }
    }

    /// Programs the bus clock for master operation at the hinted rate.
    pub fn initialize_tx(&mut self, hint: BitrateHint) {
        self.hal.set_bitrate(BITRATES[hint.index()]);
    }

    /// Loads the own-address register so the peripheral answers as a
    /// slave.
    pub fn initialize_rx(&mut self, _hint: BitrateHint) {
        self.hal.listen(TWI_SLAVE_ADDRESS);
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

    /// Arms the status cell and claims the bus with a START; the
    /// interrupt pushes the frame from there.
    pub fn send_packet(&mut self, packet: &Packet) {
        self.buffer = *packet.as_bytes();
        self.position = 0;
        self.commit = false;
        self.mode = I2cMode::PacketTx;

        self.status = Status::armed();
        self.hal.op(TwiOp::Start);
    }

    /// Arms the status cell and acknowledges the next address match, so
    /// a sending master finds this peer listening.
    pub fn read_packet(&mut self) {
        self.buffer = [0u8; PACKET_SIZE];
        self.position = 0;
        self.mode = I2cMode::PacketRx;

        self.status = Status::armed();
        self.commit = true;
        self.received = None;
        self.hal.op(TwiOp::ProceedAck);
    }

    /// Releases the bus and forces the machine idle.
    pub fn abort(&mut self) {
        self.hal.op(TwiOp::Release);
        self.mode = I2cMode::Idle;
    }

    /// Two-wire event interrupt: dispatches the fresh status code to
    /// the handler of the current state.
    pub fn on_event(&mut self, delay: &mut impl DelayNs) {
        match self.mode {
            I2cMode::PacketTx => self.packet_tx(delay),
            I2cMode::PacketRx => self.packet_rx(),
            I2cMode::AckTx => self.ack_tx(),
            I2cMode::AckRx => self.ack_rx(),
            I2cMode::Idle => {}
        }
    }

    /// Master transmitter: frame bytes out, then swing over to the
    /// acknowledgement leg.
    fn packet_tx(&mut self, delay: &mut impl DelayNs) {
        match self.hal.status() {
            status::START | status::REP_START => {
                self.hal.write(SLA_W);
                self.hal.op(TwiOp::Proceed);
                self.position = 0;
            }

            status::MT_SLA_ACK | status::MT_DATA_ACK => {
                if self.position < PACKET_SIZE {
                    let byte = self.buffer[self.position];
                    self.position += 1;
                    self.hal.write(byte);
                    self.hal.op(TwiOp::Proceed);
                } else {
                    // Frame is out: release with STOP, then claim the
                    // bus again to collect the answer.
                    self.hal.op(TwiOp::Stop);
                    self.mode = I2cMode::AckRx;

                    delay.delay_us(ACK_DEAD_TIME_US);
                    self.hal.op(TwiOp::Start);
                }
            }

            // Lost the bus to another master: try again from START.
            status::ARB_LOST => self.hal.op(TwiOp::Start),

            // Address/data NACK or bus error: release; the foreground
            // timeout surfaces the failure.
            _ => self.hal.op(TwiOp::Release),
        }
    }

    /// Slave receiver: frame bytes in, then answer as slave
    /// transmitter.
    fn packet_rx(&mut self) {
        match self.hal.status() {
            status::SR_SLA_ACK => {
                self.position = 0;
                self.hal.op(TwiOp::ProceedAck);
            }

            status::SR_DATA_ACK => {
                if self.position < PACKET_SIZE {
                    self.buffer[self.position] = self.hal.read();
                    self.position += 1;

                    if self.position >= PACKET_SIZE {
                        self.ack = packet::acknowledgement(&self.buffer);
                        self.mode = I2cMode::AckTx;
                    }
                }
                self.hal.op(TwiOp::ProceedAck);
            }

            status::SR_DATA_NACK | status::BUS_ERROR => self.hal.op(TwiOp::Recover),

            // Unknown event: stay addressable.
            _ => self.hal.op(TwiOp::ProceedAck),
        }
    }

    /// Slave transmitter: one acknowledgement byte, which the master
    /// closes with a NACK.
    fn ack_tx(&mut self) {
        match self.hal.status() {
            status::ST_SLA_ACK => {
                self.hal.write(self.ack);
                self.hal.op(TwiOp::ProceedAck);
            }

            status::ST_DATA_NACK => {
                self.hal.op(TwiOp::Finish);
                self.mode = I2cMode::Idle;

                if self.ack == ASCII_ACK && self.commit {
                    self.received = Some(Packet::from_bytes(self.buffer));
                    self.commit = false;
                }
                self.status.publish(self.ack == ASCII_ACK);
            }

            status::BUS_ERROR => self.hal.op(TwiOp::Recover),

            _ => self.hal.op(TwiOp::ProceedAck),
        }
    }

    /// Master receiver: collect the single acknowledgement byte,
    /// closing it with a NACK and a STOP.
    fn ack_rx(&mut self) {
        match self.hal.status() {
            status::START | status::REP_START => {
                self.hal.write(SLA_R);
                self.hal.op(TwiOp::Proceed);
            }

            status::MR_SLA_ACK => self.hal.op(TwiOp::Proceed),

            status::MR_DATA_NACK => {
                self.ack = self.hal.read();
                self.hal.op(TwiOp::Stop);
                self.mode = I2cMode::Idle;
                self.status.publish(self.ack == ASCII_ACK);
            }

            // Arbitration lost, address NACK or bus error: release the
            // bus; no RESTART on this leg.
            _ => self.hal.op(TwiOp::Release),
        }
    }
}
