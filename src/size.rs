//! Transaction size estimation
//!
//! Fixed per-input and per-output virtual sizes by address kind. Inputs are
//! always priced with the sender's kind since every input spends from the
//! sender; one change output to the sender is always included.

use crate::address::AddressKind;
use crate::error::TransferError;
use crate::types::TransferIntent;

/// Version + locktime + input/output counts
pub const OVERHEAD_SIZE: u64 = 10;

pub fn input_size(kind: AddressKind) -> u64 {
    match kind {
        AddressKind::SegwitV0 => 68,
        AddressKind::Legacy => 148,
        AddressKind::ScriptHash => 91,
    }
}

pub fn output_size(kind: AddressKind) -> u64 {
    match kind {
        AddressKind::SegwitV0 => 31,
        AddressKind::Legacy => 34,
        AddressKind::ScriptHash => 32,
    }
}

/// Size model for one sender and one set of intents
///
/// Output sizes do not depend on the input count, so they are classified once
/// and [`SizeEstimator::estimate`] is a cheap pure function of `inputs`.
#[derive(Clone, Debug)]
pub struct SizeEstimator {
    sender_kind: AddressKind,
    outputs_size: u64,
}

impl SizeEstimator {
    pub fn new(sender_address: &str, intents: &[TransferIntent]) -> Result<Self, TransferError> {
        let sender_kind = AddressKind::classify(sender_address)?;

        // Payments plus the sender's change output
        let outputs_size = intents.iter().try_fold(output_size(sender_kind), |acc, intent| {
            AddressKind::classify(&intent.receiver_address).map(|kind| acc + output_size(kind))
        })?;

        Ok(Self {
            sender_kind,
            outputs_size,
        })
    }

    pub fn sender_kind(&self) -> AddressKind {
        self.sender_kind
    }

    /// Estimated virtual size with `inputs` inputs
    pub fn estimate(&self, inputs: usize) -> u64 {
        input_size(self.sender_kind) * inputs as u64 + self.outputs_size + OVERHEAD_SIZE
    }
}

/// One-shot estimate for `inputs` inputs
pub fn estimate_size(
    sender_address: &str,
    intents: &[TransferIntent],
    inputs: usize,
) -> Result<u64, TransferError> {
    Ok(SizeEstimator::new(sender_address, intents)?.estimate(inputs))
}
