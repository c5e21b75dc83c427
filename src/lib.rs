//! # buslink
//!
//! A portable, no_std packet transfer layer for lab peripheral boards
//! that exchange short text messages over four physical transports:
//! asynchronous serial (RS-232), infrared (IrDA through an external
//! endec), synchronous serial (SPI) and the two-wire bus (I²C).
//!
//! The crate implements:
//! - interrupt-driven per-bus state machines pushing one fixed 16-byte
//!   frame at a time, each answered by a single ACK/NACK byte
//! - message fragmentation and reassembly with an XOR block cipher
//! - per-bus mapping of abstract bitrate hints onto concrete line rates
//! - the foreground transfer loop: busy-poll with operator abort on the
//!   BACK key, a 1 s send timeout and a per-packet retry budget
//! - a 10-slot millisecond counter pool over one 1 kHz tick
//! - a debounced 4-key scanner with release-edge detection
//!
//! ## Crate features
//! | Feature     | Description |
//! |-------------|-------------|
//! | `std`       | Disables `#![no_std]`; used by the test suite |
//! | `defmt-0-3` | Routes internal logging to `defmt` |
//! | `log`       | Routes internal logging to `log` |
//!
//! ## Wire format
//!
//! ```text
//! offset 0     : 0xFE              magic / resync anchor
//! offset 1..3  : ASCII decimal     packet index, 1-based
//! offset 4..6  : ASCII decimal     packet total
//! offset 7..14 : payload           8 bytes
//! offset 15    : checksum          sum of payload mod 256, 0xFE -> 0xFF
//! ```
//!
//! Each frame is followed, after a per-bus dead time, by one byte in
//! the reverse direction: `0x06` (ACK) or `0x15` (NACK). A message
//! occupies `block_count + 2` packets: two header halves (ASCII block
//! count, 8-byte key), then one ciphered block per packet.
//!
//! ## Usage
//!
//! The board support crate implements the [`hal`] traits over its
//! peripheral registers, assembles a [`port::LinkPort`] and installs it
//! into the shared singleton; interrupt handlers forward into it:
//!
//! ```rust,ignore
//! use buslink::{global, init_link_port, link_isr};
//!
//! init_link_port!(BoardUsart, BoardSpi, BoardTwi, Pin, Pin, Pin, BoardKeys, BoardTick, BoardDelay);
//!
//! fn main() {
//!     global::install(&LINK_PORT, build_port());
//!     global::select_transport(&LINK_PORT, buslink::types::Transport::I2c);
//!
//!     let message = buslink::message::Message::new("HELLO", Some(b"KKKKKKKK")).unwrap();
//!     match global::send_message(&LINK_PORT, &message) {
//!         Ok(()) => { /* "Success!" */ }
//!         Err(error) => { /* render the error */ }
//!     }
//! }
//!
//! #[interrupt]
//! fn TWI() {
//!     link_isr!(twi_event);
//! }
//! ```
//!
//! ## Concurrency model
//!
//! One foreground thread cooperates with the interrupt handlers of the
//! single live bus. All shared state (frame buffers, machine states,
//! the `{result, done}` status cells) lives inside the
//! `critical_section` singleton; the critical section is the
//! publication barrier. The foreground never suspends: it busy-polls
//! the status cell, interleaving key polling and, on sends, a timeout
//! check. `abort` masks the peripheral's interrupts and forces the
//! machine idle; a straggling interrupt finds the idle state and does
//! nothing.
//!
//! ## Status
//!
//! The cipher is a didactic exercise, not security. There is no flow
//! control beyond the per-packet acknowledgement and no recovery from
//! permanent bus faults: timeouts surface to the caller.
//!
//! --
//! Designed for `#![no_std]` use in resource-constrained embedded
//! environments.

#![deny(
    bad_style,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused,
    while_true,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_results
)]
#![cfg_attr(not(feature = "std"), no_std)]

pub use critical_section;
pub use heapless;

pub mod consts;
pub(crate) mod fmt;
pub mod global;
pub mod hal;
pub mod i2c;
pub mod irda;
pub mod keys;
pub mod message;
pub mod packet;
pub mod port;
pub mod rs232;
pub mod spi;
#[cfg(test)]
pub(crate) mod testutil;
pub mod timer;
pub mod types;
pub mod uart;
