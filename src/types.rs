//! Shared types of the transfer layer: transports, bitrate hints, the
//! result taxonomy and the ISR/foreground status cell.

use thiserror::Error;

/// Outcome of a packet or message transfer.
///
/// This is the taxonomy the operator UI renders: every transfer ends in
/// exactly one of these five states. `Failed` is the only retryable
/// outcome; any other non-success terminates the enclosing multi-packet
/// operation immediately.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
pub enum TransferResult {
    /// The packet or message was transferred and positively acknowledged.
    Success,
    /// Checksum mismatch, negative acknowledgement or packet-count
    /// mismatch. Retried up to the attempt budget before surfacing.
    #[default]
    Failed,
    /// The operator released the BACK key during the wait.
    Aborted,
    /// A send saw no completion within its wall-clock budget. Never
    /// produced by a read.
    Timeout,
    /// A coordinator-level failure, e.g. the fixed packet arena was too
    /// small for the announced message.
    Error,
}

impl TransferResult {
    /// Converts the outcome into a `Result`, mapping every non-success
    /// state onto the matching [`LinkError`].
    pub fn into_result(self) -> Result<(), LinkError> {
        match self {
            TransferResult::Success => Ok(()),
            TransferResult::Failed => Err(LinkError::Failed),
            TransferResult::Aborted => Err(LinkError::Aborted),
            TransferResult::Timeout => Err(LinkError::Timeout),
            TransferResult::Error => Err(LinkError::Exhausted),
        }
    }
}

/// Error side of the public transfer API.
///
/// One variant per non-success [`TransferResult`] state.
#[derive(Error, PartialEq, Eq, Clone, Copy, Debug)]
pub enum LinkError {
    /// The peer rejected the packet, or the packet stream was
    /// inconsistent, for the whole attempt budget.
    #[error("peer rejected the transfer")]
    Failed,
    /// The operator released the BACK key during the wait.
    #[error("aborted by the operator")]
    Aborted,
    /// No acknowledgement arrived within the send timeout.
    #[error("no acknowledgement within the timeout")]
    Timeout,
    /// A fixed-capacity buffer could not hold the transfer.
    #[error("out of buffer capacity")]
    Exhausted,
}

/// Completion slot shared between a driver's interrupt half and the
/// foreground polling loop.
///
/// The interrupt handler writes `result` first and `done` last; the
/// foreground reads `done` before `result`. Both sides only touch the
/// cell inside a critical section, which is the publication barrier.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct Status {
    /// Result of the transfer; meaningful once `done` is set.
    pub result: TransferResult,
    /// Publication flag, written last.
    pub done: bool,
}

impl Status {
    /// A freshly armed cell: pessimistic result, not yet published.
    pub(crate) const fn armed() -> Self {
        Status {
            result: TransferResult::Failed,
            done: false,
        }
    }

    /// Publishes the end of a transfer. `positive` reflects the
    /// acknowledgement byte that closed it.
    pub(crate) fn publish(&mut self, positive: bool) {
        self.result = if positive {
            TransferResult::Success
        } else {
            TransferResult::Failed
        };
        self.done = true;
    }
}

/// The physical transport a transfer runs over.
///
/// RS-232 and IrDA share the UART core; they differ in initialization
/// and in the external infrared endec the latter drives.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
pub enum Transport {
    /// Asynchronous serial, 8N1.
    #[default]
    Rs232,
    /// Infrared through an external endec on the same UART.
    Irda,
    /// Synchronous serial; the packet sender is the bus master.
    Spi,
    /// Two-wire bus; every peer answers as slave on a fixed address.
    I2c,
}

/// Abstract line-speed selector.
///
/// Each bus maps the four hints onto concrete rates of its own; the
/// "aberrant" hints select deliberately non-standard rates used for
/// robustness testing.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
pub enum BitrateHint {
    /// The slow standard rate of the selected bus.
    #[default]
    SlowRegular,
    /// A slow off-standard rate.
    SlowAberrant,
    /// The fast standard rate of the selected bus.
    FastRegular,
    /// A fast off-standard rate.
    FastAberrant,
}

impl BitrateHint {
    /// Position of this hint in the per-bus rate tables.
    pub(crate) fn index(self) -> usize {
        match self {
            BitrateHint::SlowRegular => 0,
            BitrateHint::SlowAberrant => 1,
            BitrateHint::FastRegular => 2,
            BitrateHint::FastAberrant => 3,
        }
    }
}
