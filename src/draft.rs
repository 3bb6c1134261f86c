//! Unsigned transaction drafts
//!
//! The draft builder turns a [`CoinSelection`] into a version 2 transaction
//! with one output per intent (caller order) followed by the sender's change
//! output when there is change. Every input carries its parent transaction
//! and the spent output so that any signer path can compute digests.

use std::sync::Arc;

use bitcoin::blockdata::script::ScriptBuf;
use bitcoin::blockdata::transaction::{Transaction, TxIn, TxOut};
use bitcoin::blockdata::witness::Witness;
use bitcoin::transaction::{OutPoint, Sequence};
use bitcoin::{absolute, consensus, Amount, Network};
use futures::future::try_join_all;

use crate::address::{parse_address, AddressKind};
use crate::error::TransferError;
use crate::selection::CoinSelection;
use crate::sources::ParentTxSource;
use crate::types::{Account, TransferIntent, UnspentOutput};

/// A selected UTXO with everything needed to sign its spend
#[derive(Clone, Debug)]
pub struct DraftInput {
    pub utxo: UnspentOutput,
    /// The output being spent, as recorded in the parent transaction
    pub prevout: TxOut,
    pub parent: Transaction,
    /// Present for P2SH-wrapped segwit senders
    pub redeem_script: Option<ScriptBuf>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DraftOutput {
    pub address: String,
    pub amount: Amount,
}

/// Unsigned transaction ready for a signer; read-only from here on
#[derive(Clone, Debug)]
pub struct TransactionDraft {
    sender_address: String,
    sender_kind: AddressKind,
    inputs: Vec<DraftInput>,
    outputs: Vec<DraftOutput>,
    unsigned_tx: Transaction,
    change: Amount,
    estimated_fee: Amount,
}

impl TransactionDraft {
    pub fn sender_address(&self) -> &str {
        &self.sender_address
    }

    pub fn sender_kind(&self) -> AddressKind {
        self.sender_kind
    }

    pub fn inputs(&self) -> &[DraftInput] {
        &self.inputs
    }

    /// Payment outputs followed by the change output, if any
    pub fn outputs(&self) -> &[DraftOutput] {
        &self.outputs
    }

    pub fn unsigned_tx(&self) -> &Transaction {
        &self.unsigned_tx
    }

    pub fn change(&self) -> Amount {
        self.change
    }

    pub fn estimated_fee(&self) -> Amount {
        self.estimated_fee
    }

    pub fn total_input(&self) -> Amount {
        self.inputs.iter().map(|input| input.prevout.value).sum()
    }

    pub fn total_output(&self) -> Amount {
        self.outputs.iter().map(|output| output.amount).sum()
    }
}

pub struct DraftBuilder {
    network: Network,
    parents: Arc<dyn ParentTxSource>,
}

impl DraftBuilder {
    pub fn new(network: Network, parents: Arc<dyn ParentTxSource>) -> Self {
        Self { network, parents }
    }

    pub async fn build(
        &self,
        account: &Account,
        intents: &[TransferIntent],
        selection: CoinSelection,
    ) -> Result<TransactionDraft, TransferError> {
        let sender_kind = AddressKind::classify(&account.address)?;
        let sender_script = parse_address(&account.address, self.network)?.script_pubkey();

        let redeem_script = match sender_kind {
            AddressKind::ScriptHash => {
                let public_key = account.public_key().ok_or_else(|| {
                    TransferError::MissingKeyMaterial(
                        "P2SH senders need a public key to build the redeem script".to_string(),
                    )
                })?;
                sender_kind.redeem_script(&public_key)?
            }
            _ => None,
        };

        let mut outputs = Vec::with_capacity(intents.len() + 1);
        let mut tx_outputs = Vec::with_capacity(intents.len() + 1);

        for intent in intents {
            let receiver = parse_address(&intent.receiver_address, self.network)?;
            tx_outputs.push(TxOut {
                value: intent.amount,
                script_pubkey: receiver.script_pubkey(),
            });
            outputs.push(DraftOutput {
                address: intent.receiver_address.clone(),
                amount: intent.amount,
            });
        }

        if selection.change > Amount::ZERO {
            tx_outputs.push(TxOut {
                value: selection.change,
                script_pubkey: sender_script.clone(),
            });
            outputs.push(DraftOutput {
                address: account.address.clone(),
                amount: selection.change,
            });
        }

        // Parent lookups are independent of each other
        let inputs = try_join_all(
            selection
                .selected
                .into_iter()
                .map(|utxo| self.resolve_input(utxo, &sender_script, redeem_script.clone())),
        )
        .await?;

        let unsigned_tx = Transaction {
            version: bitcoin::transaction::Version::TWO,
            lock_time: absolute::LockTime::ZERO,
            input: inputs
                .iter()
                .map(|input| TxIn {
                    previous_output: OutPoint {
                        txid: input.utxo.txid,
                        vout: input.utxo.vout,
                    },
                    script_sig: ScriptBuf::new(),
                    sequence: Sequence::MAX,
                    witness: Witness::new(),
                })
                .collect(),
            output: tx_outputs,
        };

        log::debug!(
            "Draft built: {} inputs, {} outputs, change {}",
            unsigned_tx.input.len(),
            unsigned_tx.output.len(),
            selection.change
        );

        Ok(TransactionDraft {
            sender_address: account.address.clone(),
            sender_kind,
            inputs,
            outputs,
            unsigned_tx,
            change: selection.change,
            estimated_fee: selection.fee,
        })
    }

    async fn resolve_input(
        &self,
        utxo: UnspentOutput,
        sender_script: &ScriptBuf,
        redeem_script: Option<ScriptBuf>,
    ) -> Result<DraftInput, TransferError> {
        let raw = self.parents.fetch_raw_transaction(&utxo.txid).await?;

        let parent: Transaction = consensus::deserialize(&raw)
            .map_err(|e| TransferError::invalid_parent(utxo.txid, format!("undecodable: {}", e)))?;

        if parent.compute_txid() != utxo.txid {
            return Err(TransferError::invalid_parent(
                utxo.txid,
                format!("bytes hash to {}", parent.compute_txid()),
            ));
        }

        let prevout = parent
            .output
            .get(utxo.vout as usize)
            .cloned()
            .ok_or_else(|| TransferError::invalid_parent(utxo.txid, format!("no output {}", utxo.vout)))?;

        if prevout.value != utxo.value {
            return Err(TransferError::invalid_parent(
                utxo.txid,
                format!("output {} holds {}, UTXO says {}", utxo.vout, prevout.value, utxo.value),
            ));
        }

        if prevout.script_pubkey != *sender_script {
            return Err(TransferError::invalid_parent(
                utxo.txid,
                format!("output {} is not paid to the sender", utxo.vout),
            ));
        }

        Ok(DraftInput {
            utxo,
            prevout,
            parent,
            redeem_script,
        })
    }
}
