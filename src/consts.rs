//! Constants shared across the packet transfer protocol.
//!
//! Everything here is a property of the wire protocol or of the board,
//! not of any single bus: the frame geometry, the acknowledgement bytes,
//! the retry budget and the capacity of the fixed arenas used in place
//! of a heap.
//!
//! ## Key Concepts
//!
//! - **Frame geometry**: every packet is exactly [`PACKET_SIZE`] bytes,
//!   carrying [`BLOCK_LENGTH`] bytes of payload.
//! - **Resync anchor**: [`PACKET_MAGIC`] opens every frame and restarts
//!   the receive buffer on the serial buses; the checksum is forbidden
//!   from taking this value.
//! - **Acknowledgement**: each frame is answered with a single byte,
//!   [`ASCII_ACK`] or [`ASCII_NACK`], in the reverse direction.
//! - **Arenas**: message and packet storage is statically sized; the
//!   `MESSAGE_MAX_*` constants bound it.

/// Number of payload bytes carried by one packet, and the size of one
/// message block and of each half of the message header.
pub const BLOCK_LENGTH: usize = 8;

/// Wire size of a framed packet: magic, two 3-digit ASCII fields,
/// payload and checksum.
pub const PACKET_SIZE: usize = 1 + 3 + 3 + BLOCK_LENGTH + 1;

/// Magic byte opening every frame.
///
/// On the serial buses a received byte equal to this value restarts the
/// receive buffer, which makes the receiver self-framing without an
/// out-of-band start marker.
pub const PACKET_MAGIC: u8 = 0xfe;

/// ASCII positive acknowledgement, sent after a frame whose checksum
/// verified.
pub const ASCII_ACK: u8 = 0x06;

/// ASCII negative acknowledgement, sent after a corrupt frame.
pub const ASCII_NACK: u8 = 0x15;

/// Slave address every peer answers to on the two-wire bus.
pub const TWI_SLAVE_ADDRESS: u8 = 0x01;

/// Number of counter slots in the millisecond timer pool.
pub const TIMER_SLOTS: usize = 10;

/// Attempts granted to a single packet before its rejection is surfaced.
pub const PACKET_ATTEMPTS: u8 = 3;

/// Pause between successive attempts of an outbound packet, in
/// milliseconds.
pub const RETRY_PAUSE_MS: u16 = 2;

/// Wall-clock budget for one outbound packet. A send that has not been
/// acknowledged within this window is aborted and reported as timed out.
/// Reads have no such budget; only the operator can abort them.
pub const SEND_TIMEOUT_MS: u16 = 1000;

/// Consecutive identical 1 kHz samples required before a key reading is
/// considered stable (software debounce only).
pub const DEBOUNCE_SAMPLES: u8 = 10;

/// Maximum number of 8-byte blocks in one message.
pub const MESSAGE_MAX_BLOCKS: usize = 30;

/// Maximum text length of one message, in bytes.
pub const MESSAGE_MAX_LEN: usize = MESSAGE_MAX_BLOCKS * BLOCK_LENGTH;

/// Maximum number of packets one message occupies on the wire: one per
/// block plus two for the header.
pub const MESSAGE_MAX_PACKETS: usize = MESSAGE_MAX_BLOCKS + 2;
