//! Coin selection
//!
//! Smallest-first accumulation: UTXOs are consumed in ascending value order so
//! that small outputs get swept over time, at the price of a slightly larger
//! transaction than a largest-first strategy would produce. The fee is
//! recomputed after every added input.

use bitcoin::Amount;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::error::{SourceError, TransferError};
use crate::size::SizeEstimator;
use crate::types::{FeeRateQuote, FeeTier, TransferIntent, UnspentOutput, DUST_THRESHOLD};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SelectionMode {
    /// Selection for a real transfer; every funding and dust check applies
    #[default]
    Execute,
    /// Fee preview; stops once the payment amount is covered and skips the
    /// change and dust checks
    Estimate,
}

/// Outcome of a successful selection
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoinSelection {
    pub selected: Vec<UnspentOutput>,
    /// Sum of the intent amounts
    pub amount: Amount,
    /// `ceil(fee_rate * estimated_size)` for the selected input count
    pub fee: Amount,
    /// Value returned to the sender; `0` or at least [`DUST_THRESHOLD`]
    pub change: Amount,
    /// Sub-dust change dropped from the outputs and left to miners
    pub forfeited_change: Amount,
    pub estimated_size: u64,
    pub fee_rate: Decimal,
}

impl CoinSelection {
    pub fn total_input(&self) -> Amount {
        self.selected.iter().map(|utxo| utxo.value).sum()
    }

    /// Fee actually paid once the transaction is built (inputs minus outputs)
    pub fn paid_fee(&self) -> Amount {
        self.total_input() - self.amount - self.change
    }
}

pub fn fee_for_size(fee_rate: Decimal, size: u64) -> Result<Amount, TransferError> {
    (fee_rate * Decimal::from(size))
        .ceil()
        .to_u64()
        .map(Amount::from_sat)
        .ok_or_else(|| TransferError::DataSource(SourceError::Malformed(format!("Unusable fee rate {}", fee_rate))))
}

fn spend_total(amount: Amount, fee: Amount) -> Result<Amount, TransferError> {
    amount
        .checked_add(fee)
        .ok_or_else(|| TransferError::InvalidIntent(format!("{} plus fee {} overflows", amount, fee)))
}

#[derive(Clone, Debug, Default)]
pub struct CoinSelector {
    fee_tier: FeeTier,
}

impl CoinSelector {
    pub fn new(fee_tier: FeeTier) -> Self {
        Self { fee_tier }
    }

    /// Pick the inputs for paying `intents` from `sender_address`
    pub fn select(
        &self,
        sender_address: &str,
        mut utxos: Vec<UnspentOutput>,
        intents: &[TransferIntent],
        quote: &FeeRateQuote,
        mode: SelectionMode,
    ) -> Result<CoinSelection, TransferError> {
        if utxos.is_empty() {
            return Err(TransferError::NoUtxoAvailable(sender_address.to_string()));
        }

        let estimator = SizeEstimator::new(sender_address, intents)?;
        let fee_rate = quote.rate(self.fee_tier);

        // Stable sort keeps the source order for equal values, so identical
        // inputs always produce the same selection
        utxos.sort_by_key(|utxo| utxo.value);

        let amount = intents
            .iter()
            .try_fold(Amount::ZERO, |total, intent| total.checked_add(intent.amount))
            .ok_or_else(|| TransferError::InvalidIntent("payment total overflows".to_string()))?;

        let mut selected = Vec::new();
        let mut accumulated = Amount::ZERO;
        let mut fee = Amount::ZERO;
        let mut estimated_size = 0;

        for utxo in utxos {
            accumulated = accumulated.checked_add(utxo.value).ok_or_else(|| {
                TransferError::DataSource(SourceError::Malformed("UTXO total overflows".to_string()))
            })?;
            selected.push(utxo);

            estimated_size = estimator.estimate(selected.len());
            fee = fee_for_size(fee_rate, estimated_size)?;

            let target = match mode {
                SelectionMode::Execute => spend_total(amount, fee)?,
                SelectionMode::Estimate => amount,
            };

            if accumulated >= target {
                break;
            }
        }

        if selected.is_empty() {
            return Err(TransferError::NoUtxoToPayTransaction);
        }

        if accumulated < amount {
            return Err(TransferError::InsufficientFunds(format!(
                "Need {} for the payments, but only have {}",
                amount, accumulated
            )));
        }

        let total_spend = spend_total(amount, fee)?;
        let mut change = accumulated.checked_sub(total_spend);

        if mode == SelectionMode::Execute {
            if change.is_none() {
                return Err(TransferError::InsufficientFunds(format!(
                    "Need {} (amount + fee), but only have {}",
                    total_spend, accumulated
                )));
            }

            if total_spend < DUST_THRESHOLD {
                return Err(TransferError::Dust(format!(
                    "Total spend {} is below {}",
                    total_spend, DUST_THRESHOLD
                )));
            }
        }

        let mut forfeited_change = Amount::ZERO;
        if let Some(value) = change {
            if value > Amount::ZERO && value < DUST_THRESHOLD {
                log::debug!("Change of {} is below dust, leaving it to the fee", value);
                forfeited_change = value;
                change = Some(Amount::ZERO);
            }
        }

        log::debug!(
            "Selected {} UTXOs ({}) for {} with fee {} at {} sat/vB ({} vB)",
            selected.len(),
            accumulated,
            amount,
            fee,
            fee_rate,
            estimated_size
        );

        Ok(CoinSelection {
            selected,
            amount,
            fee,
            change: change.unwrap_or(Amount::ZERO),
            forfeited_change,
            estimated_size,
            fee_rate,
        })
    }
}
