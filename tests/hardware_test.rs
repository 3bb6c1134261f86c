//! Hardware signer tests against a scripted device
//!
//! Tests cover:
//! - Preflight failures before any source or device I/O
//! - A full transfer signed on the device, with progress events
//! - Device failures and malformed device replies
//! - Account discovery with bounded retry

mod common;

use std::str::FromStr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use bitcoin::bip32::DerivationPath;
use bitcoin::{Address, Amount, CompressedPublicKey};
use btc_transfer::{Account, DeviceErrorKind, ErrorKind, SigningEvent, TransferEngine, TransferIntent};
use common::*;
use tokio::sync::broadcast::error::TryRecvError;

fn hardware_engine(sources: &Arc<MemorySources>, device: &Arc<MockDevice>) -> (TransferEngine, Arc<MockProvider>) {
    let provider = MockProvider::new(device.clone());
    let engine = TransferEngine::new(regtest_config(), sources.data_sources(), Some(provider.clone()));
    (engine, provider)
}

fn payment() -> Vec<TransferIntent> {
    vec![TransferIntent::new(TestKey::new(2).segwit_address(), Amount::from_sat(5_000))]
}

// ============================================================================
// Preflight
// ============================================================================

#[tokio::test]
async fn test_missing_bip_path_fails_before_any_io() {
    init_logging();

    let device = MockDevice::new(11);
    let sources = MemorySources::new(1);
    let address = device.key().segwit_address();
    sources.fund(&address, &[10_000]);

    let (engine, provider) = hardware_engine(&sources, &device);
    let account = Account::hardware(address, None, Some(device.key().public_key));

    let err = engine.transfer(&account, &payment()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::BipPathNotFound);
    assert_eq!(sources.calls(), 0);
    assert_eq!(provider.opened.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_missing_transport_provider() {
    init_logging();

    let device = MockDevice::new(11);
    let sources = MemorySources::new(1);
    let engine = engine(&sources);
    let account = Account::hardware(device.key().segwit_address(), Some(hardware_path()), None);

    let err = engine.transfer(&account, &payment()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::GetLedgerTransportNotFound);
    assert_eq!(sources.calls(), 0);
}

// ============================================================================
// Signing
// ============================================================================

#[tokio::test]
async fn test_hardware_transfer_emits_events_in_order() -> anyhow::Result<()> {
    init_logging();

    let device = MockDevice::new(11);
    let sources = MemorySources::new(1);
    let address = device.key().segwit_address();
    sources.fund(&address, &[3_000, 4_000]);

    let (engine, provider) = hardware_engine(&sources, &device);
    let mut events = engine.signing_events();
    let account = Account::hardware(address, Some(hardware_path()), Some(device.key().public_key));

    let txids = engine.transfer(&account, &payment()).await?;
    assert_eq!(txids.len(), 1);

    assert_eq!(events.try_recv()?, SigningEvent::SignatureStart);
    assert_eq!(events.try_recv()?, SigningEvent::SignatureEnd);
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));

    // One device round trip covering every input
    assert_eq!(provider.opened.load(Ordering::SeqCst), 1);
    let requests = device.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].inputs.len(), 2);
    for input in &requests[0].inputs {
        assert_eq!(input.derivation_path, hardware_path());
        assert_eq!(input.parent.compute_txid(), requests[0].unsigned_tx.input[0].previous_output.txid);
    }

    let tx = &sources.submitted()[0];
    assert_eq!(tx.compute_txid(), txids[0]);
    assert!(tx.input.iter().all(|input| input.witness.len() == 2));
    Ok(())
}

#[tokio::test]
async fn test_device_failure_still_emits_end() {
    init_logging();

    let device = MockDevice::new(11);
    *device.sign_error.lock().unwrap() = Some(DeviceErrorKind::Rejected);

    let sources = MemorySources::new(1);
    let address = device.key().segwit_address();
    sources.fund(&address, &[10_000]);

    let (engine, _) = hardware_engine(&sources, &device);
    let mut events = engine.signing_events();
    let account = Account::hardware(address, Some(hardware_path()), Some(device.key().public_key));

    let err = engine.transfer(&account, &payment()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Device);

    assert_eq!(events.try_recv().unwrap(), SigningEvent::SignatureStart);
    assert_eq!(events.try_recv().unwrap(), SigningEvent::SignatureEnd);
    assert!(sources.submitted().is_empty());
}

#[tokio::test]
async fn test_short_device_reply_is_rejected() {
    init_logging();

    let device = MockDevice::new(11);
    *device.short_reply.lock().unwrap() = true;

    let sources = MemorySources::new(1);
    let address = device.key().segwit_address();
    sources.fund(&address, &[3_000, 4_000]);

    let (engine, _) = hardware_engine(&sources, &device);
    let account = Account::hardware(address, Some(hardware_path()), Some(device.key().public_key));

    let err = engine.transfer(&account, &payment()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Device);
    assert!(sources.submitted().is_empty());
}

#[tokio::test]
async fn test_device_signing_for_another_address_fails_verification() {
    init_logging();

    // The device holds key 11, the account claims key 12's address
    let device = MockDevice::new(11);
    let other = TestKey::new(12);
    let sources = MemorySources::new(1);
    sources.fund(&other.segwit_address(), &[10_000]);

    let (engine, _) = hardware_engine(&sources, &device);
    let account = Account::hardware(other.segwit_address(), Some(hardware_path()), Some(other.public_key));

    let err = engine.transfer(&account, &payment()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidSignatures);
}

// ============================================================================
// Account discovery
// ============================================================================

#[tokio::test]
async fn test_hardware_account_derives_p2wpkh_address() -> anyhow::Result<()> {
    init_logging();

    let device = MockDevice::new(11);
    let sources = MemorySources::new(1);
    let (engine, _) = hardware_engine(&sources, &device);

    let account = engine.hardware_account(0).await?;

    let compressed = CompressedPublicKey::try_from(device.key().public_key)?;
    assert_eq!(account.address, Address::p2wpkh(&compressed, NETWORK).to_string());
    assert_eq!(account.derivation_path, Some(hardware_path()));
    assert_eq!(account.public_key(), Some(device.key().public_key));
    assert!(account.is_hardware);
    Ok(())
}

#[tokio::test]
async fn test_hardware_account_retries_locked_device() -> anyhow::Result<()> {
    init_logging();

    let device = MockDevice::new(11);
    device.locked_attempts.store(2, Ordering::SeqCst);

    let sources = MemorySources::new(1);
    let (engine, _) = hardware_engine(&sources, &device);

    let account = engine.hardware_account(3).await?;
    assert_eq!(device.public_key_calls.load(Ordering::SeqCst), 3);
    assert_eq!(account.derivation_path, Some(DerivationPath::from_str("m/84'/1'/0'/0/3")?));
    Ok(())
}

#[tokio::test]
async fn test_hardware_accounts_up_to_index() -> anyhow::Result<()> {
    init_logging();

    let device = MockDevice::new(11);
    let sources = MemorySources::new(1);
    let (engine, provider) = hardware_engine(&sources, &device);

    let accounts = engine.hardware_accounts(2).await?;
    assert_eq!(accounts.len(), 3);
    for (index, account) in accounts.iter().enumerate() {
        let path = DerivationPath::from_str(&format!("m/84'/1'/0'/0/{}", index))?;
        assert_eq!(account.derivation_path, Some(path));
        assert!(account.is_hardware);
    }

    // One transport for the whole batch
    assert_eq!(provider.opened.load(Ordering::SeqCst), 1);
    assert_eq!(device.public_key_calls.load(Ordering::SeqCst), 3);
    Ok(())
}

#[tokio::test]
async fn test_hardware_account_without_provider() {
    let sources = MemorySources::new(1);
    let err = engine(&sources).hardware_account(0).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::GetLedgerTransportNotFound);

    let err = engine(&sources).hardware_accounts(1).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::GetLedgerTransportNotFound);
}
