//! Message fragmentation, reassembly and the XOR block cipher.
//!
//! A [`Message`] is a short text plus an 8-byte key, stored as a 16-byte
//! header and a run of ciphered 8-byte blocks:
//!
//! - `header.block_count`: the block count as ASCII decimal, zero-filled
//!   to 8 bytes.
//! - `header.key`: 8 key bytes; all-zero means the text rides in clear
//!   (XOR with zero is the identity).
//! - `blocks[i]`: 8 text bytes XOR-ed byte-wise against the key. The
//!   final block is NUL-padded before ciphering.
//!
//! On the wire a message occupies `block_count + 2` packets: the two
//! header halves first, then one packet per block.
//!
//! The cipher is a didactic construct for the lab exercise, not a
//! privacy measure.
//!
//! ```rust
//! use buslink::message::Message;
//!
//! let message = Message::new("HELLO", Some(b"KKKKKKKK")).unwrap();
//! assert_eq!(message.block_count(), 1);
//!
//! let packets = message.to_packets();
//! assert_eq!(packets.len(), 3);
//!
//! let back = Message::from_packets(&packets).unwrap();
//! assert_eq!(&back.decode()[..5], b"HELLO");
//! ```

use heapless::Vec;
use thiserror::Error;

use crate::consts::{BLOCK_LENGTH, MESSAGE_MAX_BLOCKS, MESSAGE_MAX_LEN, MESSAGE_MAX_PACKETS};
use crate::packet::{self, Packet};

/// Failure modes of message construction and reassembly.
#[derive(Error, PartialEq, Eq, Clone, Copy, Debug)]
pub enum MessageError {
    /// The text does not fit the fixed block arena.
    #[error("text exceeds the message capacity")]
    TooLong,
    /// Fewer packets than the two header halves.
    #[error("fewer packets than a message header")]
    Truncated,
    /// The block count announced by the header disagrees with the
    /// number of packets presented.
    #[error("block count disagrees with the packet count")]
    CountMismatch,
}

/// The 16-byte message header in wire order.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
struct MessageHeader {
    block_count: [u8; BLOCK_LENGTH],
    key: [u8; BLOCK_LENGTH],
}

/// A text message with its cipher key, held as ciphered blocks.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Message {
    header: MessageHeader,
    blocks: Vec<[u8; BLOCK_LENGTH], MESSAGE_MAX_BLOCKS>,
}

impl Message {
    /// Builds a message from `text`, ciphering each 8-byte window
    /// against `key`. `None` (or an all-zero key) leaves the text in
    /// clear. The final window is NUL-padded to the block boundary
    /// before ciphering.
    pub fn new(text: &str, key: Option<&[u8; BLOCK_LENGTH]>) -> Result<Self, MessageError> {
        let bytes = text.as_bytes();
        if bytes.len() > MESSAGE_MAX_LEN {
            return Err(MessageError::TooLong);
        }

        let key = key.copied().unwrap_or([0u8; BLOCK_LENGTH]);
        let mut header = MessageHeader {
            block_count: [0u8; BLOCK_LENGTH],
            key,
        };
        packet::render_decimal(
            &mut header.block_count,
            bytes.len().div_ceil(BLOCK_LENGTH) as u16,
        );

        let mut blocks = Vec::new();
        for chunk in bytes.chunks(BLOCK_LENGTH) {
            let mut block = [0u8; BLOCK_LENGTH];
            block[..chunk.len()].copy_from_slice(chunk);
            let _ = blocks.push(cipher(&block, &key));
        }

        Ok(Message { header, blocks })
    }

    /// The block count announced by the header.
    pub fn block_count(&self) -> u16 {
        packet::parse_decimal(&self.header.block_count)
    }

    /// The cipher key.
    pub fn key(&self) -> &[u8; BLOCK_LENGTH] {
        &self.header.key
    }

    /// Deciphers the blocks back into text bytes.
    ///
    /// The result is `block_count * 8` bytes long; a text that did not
    /// end on a block boundary carries its NUL padding. Callers treat
    /// trailing NULs as pad.
    pub fn decode(&self) -> Vec<u8, MESSAGE_MAX_LEN> {
        let mut text = Vec::new();
        for block in &self.blocks {
            let plain = cipher(block, &self.header.key);
            let _ = text.extend_from_slice(&plain);
        }
        text
    }

    /// Fragments the message into its wire packets: the two header
    /// halves as packets 1 and 2, one packet per block after that, all
    /// carrying the same total.
    pub fn to_packets(&self) -> Vec<Packet, MESSAGE_MAX_PACKETS> {
        let total = (self.blocks.len() + 2) as u16;
        let mut packets = Vec::new();
        let _ = packets.push(Packet::new(1, total, &self.header.block_count));
        let _ = packets.push(Packet::new(2, total, &self.header.key));
        for (i, block) in self.blocks.iter().enumerate() {
            let _ = packets.push(Packet::new(i as u16 + 3, total, block));
        }
        packets
    }

    /// Reassembles a message from packets presented in order.
    ///
    /// The first two payloads rebuild the header; the header's block
    /// count must agree with the number of remaining packets.
    pub fn from_packets(packets: &[Packet]) -> Result<Self, MessageError> {
        if packets.len() < 2 {
            return Err(MessageError::Truncated);
        }

        let header = MessageHeader {
            block_count: packets[0].data(),
            key: packets[1].data(),
        };

        let announced = packet::parse_decimal(&header.block_count) as usize;
        if announced != packets.len() - 2 {
            return Err(MessageError::CountMismatch);
        }

        let mut blocks = Vec::new();
        for packet in &packets[2..] {
            blocks
                .push(packet.data())
                .map_err(|_| MessageError::TooLong)?;
        }

        Ok(Message { header, blocks })
    }
}

/// XOR of one block against the key; its own inverse.
fn cipher(block: &[u8; BLOCK_LENGTH], key: &[u8; BLOCK_LENGTH]) -> [u8; BLOCK_LENGTH] {
    let mut result = [0u8; BLOCK_LENGTH];
    for i in 0..BLOCK_LENGTH {
        result[i] = block[i] ^ key[i];
    }
    result
}
