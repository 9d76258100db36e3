use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wormhole_lib::chain::{ChainError, MintCall, TokenClient, TxOutcome};
use wormhole_lib::commitment::{create_commitment, Secret};
use wormhole_lib::crypto::field_to_b256;
use wormhole_lib::indexer::{hash_leaves, EventSource, LeafInput, TransferEvent};
use wormhole_lib::ledger::{
    JsonFileStore, LedgerError, LedgerStore, MemoryStore, TransferLedger, TransferRecord, TransferStatus,
};
use wormhole_lib::merkle::{LeanMerkleTree, MerkleError};
use wormhole_lib::prover::{
    CircuitArtifact, CircuitRegistry, InputMap, InputValue, ProofBackend, ProofData, ProofOrchestrator, ProverError,
};
use wormhole_lib::{WormholeClient, WormholeError};

const ONE_TOKEN: u64 = 1_000_000_000_000_000_000;

fn tx_hash(n: u64) -> B256 {
    B256::left_padding_from(&n.to_be_bytes())
}

#[derive(Default)]
struct MockChain {
    events: Mutex<Vec<TransferEvent>>,
    mints: Mutex<Vec<MintCall>>,
    next_block: AtomicU64,
    fail_transfer: AtomicBool,
    revert_transfer: AtomicBool,
    revert_mint: AtomicBool,
    reject_preflight: AtomicBool,
}

impl MockChain {
    /// Record a transfer that did not go through this client
    fn external_transfer(&self, to: Address, value: U256) -> B256 {
        let block_number = self.next_block.fetch_add(1, Ordering::SeqCst) + 100;
        let hash = tx_hash(block_number);
        self.events.lock().unwrap().push(TransferEvent {
            to,
            value,
            block_number,
            log_index: 0,
            transaction_hash: Some(hash),
        });
        hash
    }

    fn mint_count(&self) -> usize {
        self.mints.lock().unwrap().len()
    }
}

#[async_trait]
impl TokenClient for MockChain {
    async fn transfer(&self, to: Address, amount: U256) -> Result<TxOutcome, ChainError> {
        if self.fail_transfer.load(Ordering::SeqCst) {
            return Err(ChainError::new("insufficient funds for transfer"));
        }
        if self.revert_transfer.load(Ordering::SeqCst) {
            return Ok(TxOutcome {
                transaction_hash: tx_hash(0xdead),
                success: false,
            });
        }
        let transaction_hash = self.external_transfer(to, amount);
        Ok(TxOutcome {
            transaction_hash,
            success: true,
        })
    }

    async fn verify_and_mint(&self, call: &MintCall) -> Result<TxOutcome, ChainError> {
        self.mints.lock().unwrap().push(call.clone());
        Ok(TxOutcome {
            transaction_hash: tx_hash(0xbeef),
            success: !self.revert_mint.load(Ordering::SeqCst),
        })
    }

    async fn preflight_mint(&self, _call: &MintCall) -> Result<(), ChainError> {
        if self.reject_preflight.load(Ordering::SeqCst) {
            return Err(ChainError::new("execution reverted: unknown root"));
        }
        Ok(())
    }
}

#[async_trait]
impl EventSource for MockChain {
    async fn transfer_events(&self, from_block: u64) -> Result<Vec<TransferEvent>, ChainError> {
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.block_number >= from_block)
            .cloned()
            .collect())
    }
}

/// Echoes its inputs back as public outputs, with the secret as nullifier.
struct EchoBackend;

fn word(value: &InputValue) -> B256 {
    match value {
        InputValue::Field(decimal) => B256::from(decimal.parse::<U256>().unwrap().to_be_bytes::<32>()),
        InputValue::Array(_) => panic!("expected a field"),
    }
}

#[async_trait]
impl ProofBackend for EchoBackend {
    async fn setup(&self, _artifact: &CircuitArtifact) -> Result<(), ProverError> {
        Ok(())
    }

    async fn prove(&self, _artifact: &CircuitArtifact, inputs: &InputMap) -> Result<ProofData, ProverError> {
        Ok(ProofData {
            proof: Bytes::from_static(b"proof"),
            public_inputs: vec![
                word(&inputs["merkle_root"]),
                word(&inputs["receiver"]),
                word(&inputs["amount"]),
                word(&inputs["secret"]),
            ],
        })
    }

    async fn verify(&self, _artifact: &CircuitArtifact, _proof: &ProofData) -> Result<bool, ProverError> {
        Ok(true)
    }
}

/// Fails the next `prove` with a witness error, then behaves like [`EchoBackend`].
#[derive(Default)]
struct FlakyBackend {
    fail_next: AtomicBool,
    proofs: AtomicUsize,
}

#[async_trait]
impl ProofBackend for FlakyBackend {
    async fn setup(&self, artifact: &CircuitArtifact) -> Result<(), ProverError> {
        EchoBackend.setup(artifact).await
    }

    async fn prove(&self, artifact: &CircuitArtifact, inputs: &InputMap) -> Result<ProofData, ProverError> {
        self.proofs.fetch_add(1, Ordering::SeqCst);
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(ProverError::Backend("witness generation failed: constraint 7 not satisfied".into()));
        }
        EchoBackend.prove(artifact, inputs).await
    }

    async fn verify(&self, artifact: &CircuitArtifact, proof: &ProofData) -> Result<bool, ProverError> {
        EchoBackend.verify(artifact, proof).await
    }
}

/// Memory store whose next `load` after [`StallingStore::arm`] blocks until
/// [`StallingStore::release`] is called.
#[derive(Default)]
struct StallingStore {
    inner: MemoryStore,
    armed: AtomicBool,
    stalled: AtomicBool,
    released: AtomicBool,
}

impl StallingStore {
    fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

impl LedgerStore for StallingStore {
    fn load(&self) -> Result<Vec<TransferRecord>, LedgerError> {
        let records = self.inner.load()?;
        if self.armed.swap(false, Ordering::SeqCst) {
            self.stalled.store(true, Ordering::SeqCst);
            while !self.released.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
        Ok(records)
    }

    fn store(&self, records: &[TransferRecord]) -> Result<(), LedgerError> {
        self.inner.store(records)
    }
}

struct Harness<S, B = EchoBackend> {
    _artifacts: tempfile::TempDir,
    client: WormholeClient<S, MockChain, B>,
}

fn harness_with<S: LedgerStore>(store: S) -> Harness<S> {
    harness_with_backend(store, EchoBackend)
}

fn harness_with_backend<S: LedgerStore, B: ProofBackend>(store: S, backend: B) -> Harness<S, B> {
    let artifacts = tempfile::tempdir().unwrap();
    std::fs::write(artifacts.path().join("wormhole.json"), "{}").unwrap();
    let prover = ProofOrchestrator::new(backend, CircuitRegistry::new(artifacts.path()));
    let client = WormholeClient::new(TransferLedger::new(store), MockChain::default(), prover).with_checkpoint(100);
    Harness {
        _artifacts: artifacts,
        client,
    }
}

fn harness() -> Harness<MemoryStore> {
    harness_with(MemoryStore::new())
}

fn receiver() -> Address {
    Address::repeat_byte(0x42)
}

fn add_noise(chain: &MockChain) {
    chain.external_transfer(Address::repeat_byte(0x01), U256::from(5u64));
    chain.external_transfer(Address::ZERO, U256::from(7u64));
    chain.external_transfer(Address::repeat_byte(0x02), U256::from(9u64));
}

#[tokio::test]
async fn test_send_then_redeem_one_token() {
    let h = harness();
    let chain = h.client.chain();
    add_noise(chain);
    let amount = U256::from(ONE_TOKEN);

    let sent = h.client.send(receiver(), amount).await.unwrap();
    assert_eq!(sent.record.status(), TransferStatus::Ready);
    assert_eq!(sent.record.transaction_hash, Some(sent.transaction_hash));
    assert_eq!(sent.record.amount, amount);
    chain.external_transfer(Address::repeat_byte(0x03), U256::from(11u64));

    let burn_address = sent.record.burn_address;
    let receipt = h.client.redeem(burn_address).await.unwrap();

    // The zero-address burn is not a leaf, so the funding transfer is leaf #2.
    assert_eq!(receipt.leaf_index, 2);
    assert_eq!(receipt.receiver, receiver());
    assert_eq!(receipt.amount, amount);
    assert_eq!(
        receipt.nullifier,
        B256::from(sent.record.secret.as_u256().to_be_bytes::<32>())
    );

    let leaves = [
        LeafInput::new(Address::repeat_byte(0x01), U256::from(5u64)),
        LeafInput::new(Address::repeat_byte(0x02), U256::from(9u64)),
        LeafInput::new(burn_address, amount),
        LeafInput::new(Address::repeat_byte(0x03), U256::from(11u64)),
    ];
    let tree = LeanMerkleTree::from_leaves(&hash_leaves(&leaves).unwrap()).unwrap();
    assert_eq!(receipt.root, field_to_b256(&tree.root().unwrap()));

    let mints = chain.mints.lock().unwrap().clone();
    assert_eq!(mints.len(), 1);
    assert_eq!(mints[0].to, receiver());
    assert_eq!(mints[0].amount, amount);
    assert_eq!(mints[0].root, receipt.root);
    assert_eq!(mints[0].nullifier, receipt.nullifier);

    let record = h.client.ledger().find(&burn_address).unwrap().unwrap();
    assert!(record.used);
}

#[tokio::test]
async fn test_failed_funding_rolls_back() {
    let h = harness();
    h.client.chain().fail_transfer.store(true, Ordering::SeqCst);

    let err = h.client.send(receiver(), U256::from(10u64)).await.unwrap_err();
    assert!(matches!(err, WormholeError::FundingFailed(ref msg) if msg.contains("insufficient funds")));
    assert!(h.client.list().unwrap().is_empty());
}

#[tokio::test]
async fn test_reverted_funding_rolls_back_only_its_record() {
    let h = harness();
    let first = h.client.send(receiver(), U256::from(10u64)).await.unwrap();

    h.client.chain().revert_transfer.store(true, Ordering::SeqCst);
    let err = h.client.send(receiver(), U256::from(20u64)).await.unwrap_err();
    assert!(matches!(err, WormholeError::FundingFailed(_)));

    let records = h.client.list().unwrap();
    assert_eq!(records, vec![first.record]);
}

#[tokio::test]
async fn test_invalid_input_writes_nothing() {
    let h = harness();
    let err = h.client.send(receiver(), U256::ZERO).await.unwrap_err();
    assert!(matches!(err, WormholeError::InvalidInput(_)));
    let err = h.client.send(Address::ZERO, U256::from(1u64)).await.unwrap_err();
    assert!(matches!(err, WormholeError::InvalidInput(_)));
    assert!(h.client.list().unwrap().is_empty());
}

#[tokio::test]
async fn test_redeem_mints_at_most_once() {
    let h = harness();
    let sent = h.client.send(receiver(), U256::from(ONE_TOKEN)).await.unwrap();
    let burn_address = sent.record.burn_address;

    h.client.redeem(burn_address).await.unwrap();
    for _ in 0..3 {
        let err = h.client.redeem(burn_address).await.unwrap_err();
        assert!(matches!(err, WormholeError::AlreadyRedeemed(addr) if addr == burn_address));
    }
    assert_eq!(h.client.chain().mint_count(), 1);
    assert_eq!(h.client.list().unwrap().len(), 1);
}

#[tokio::test]
async fn test_reverted_mint_leaves_record_redeemable() {
    let h = harness();
    let sent = h.client.send(receiver(), U256::from(ONE_TOKEN)).await.unwrap();
    let burn_address = sent.record.burn_address;

    h.client.chain().revert_mint.store(true, Ordering::SeqCst);
    let err = h.client.redeem(burn_address).await.unwrap_err();
    assert!(matches!(err, WormholeError::MintFailed(_)));
    let record = h.client.ledger().find(&burn_address).unwrap().unwrap();
    assert_eq!(record.status(), TransferStatus::Ready);
    assert!(!h.client.prover().is_busy());

    h.client.chain().revert_mint.store(false, Ordering::SeqCst);
    let retry = h.client.redeem(burn_address).await.unwrap();
    let mints = h.client.chain().mints.lock().unwrap().clone();
    assert_eq!(mints.len(), 2);
    // Same ledger state, same proof inputs.
    assert_eq!(mints[0].nullifier, mints[1].nullifier);
    assert_eq!(mints[0].root, retry.root);
}

#[tokio::test]
async fn test_preflight_rejection_skips_broadcast() {
    let mut h = harness();
    h.client = h.client.with_preflight(true);
    let sent = h.client.send(receiver(), U256::from(3u64)).await.unwrap();

    h.client.chain().reject_preflight.store(true, Ordering::SeqCst);
    let err = h.client.redeem(sent.record.burn_address).await.unwrap_err();
    assert!(matches!(err, WormholeError::MintFailed(ref msg) if msg.contains("unknown root")));
    assert_eq!(h.client.chain().mint_count(), 0);
}

#[tokio::test]
async fn test_redeem_rejected_while_prover_busy() {
    let h = harness();
    let sent = h.client.send(receiver(), U256::from(ONE_TOKEN)).await.unwrap();

    let permit = h.client.prover().try_acquire().unwrap();
    let err = h.client.redeem(sent.record.burn_address).await.unwrap_err();
    assert!(matches!(err, WormholeError::Prover(ProverError::Busy)));
    assert_eq!(h.client.chain().mint_count(), 0);

    drop(permit);
    h.client.redeem(sent.record.burn_address).await.unwrap();
}

#[tokio::test]
async fn test_unindexed_funding_is_not_found() {
    let h = harness();
    add_noise(h.client.chain());
    let commitment = create_commitment(receiver()).unwrap();
    let ledger = h.client.ledger();
    ledger
        .append(TransferRecord::pending(
            receiver(),
            U256::from(8u64),
            commitment.burn_address,
            commitment.secret,
        ))
        .unwrap();
    ledger.mark_funded(&commitment.burn_address, tx_hash(1)).unwrap();
    let before = ledger.list_all().unwrap();

    let err = h.client.redeem(commitment.burn_address).await.unwrap_err();
    assert!(matches!(err, WormholeError::Merkle(MerkleError::NotFound)));
    assert!(err.is_retryable());
    assert_eq!(ledger.list_all().unwrap(), before);
}

#[tokio::test]
async fn test_redeem_prechecks() {
    let h = harness();
    let unknown = Address::repeat_byte(0x99);
    assert!(matches!(
        h.client.redeem(unknown).await,
        Err(WormholeError::UnknownTransfer(addr)) if addr == unknown
    ));

    let commitment = create_commitment(receiver()).unwrap();
    h.client
        .ledger()
        .append(TransferRecord::pending(
            receiver(),
            U256::from(1u64),
            commitment.burn_address,
            commitment.secret,
        ))
        .unwrap();
    assert!(matches!(
        h.client.redeem(commitment.burn_address).await,
        Err(WormholeError::NotFunded(_))
    ));

    // A record whose secret does not open its burn address.
    let tampered = Address::repeat_byte(0x77);
    h.client
        .ledger()
        .append(TransferRecord::pending(
            receiver(),
            U256::from(1u64),
            tampered,
            Secret::from_u256(U256::from(12345u64)),
        ))
        .unwrap();
    h.client.ledger().mark_funded(&tampered, tx_hash(2)).unwrap();
    assert!(matches!(
        h.client.redeem(tampered).await,
        Err(WormholeError::BurnAddressMismatch(addr)) if addr == tampered
    ));
    assert_eq!(h.client.chain().mint_count(), 0);
}

#[tokio::test]
async fn test_reconcile_promotes_landed_transfers() {
    let h = harness();
    let landed = create_commitment(receiver()).unwrap();
    let lost = create_commitment(receiver()).unwrap();
    for commitment in [&landed, &lost] {
        h.client
            .ledger()
            .append(TransferRecord::pending(
                receiver(),
                U256::from(50u64),
                commitment.burn_address,
                commitment.secret,
            ))
            .unwrap();
    }
    // Wrong amount does not count as the funding transfer.
    h.client.chain().external_transfer(lost.burn_address, U256::from(49u64));
    let hash = h.client.chain().external_transfer(landed.burn_address, U256::from(50u64));

    let promoted = h.client.reconcile_pending().await.unwrap();
    assert_eq!(promoted.len(), 1);
    assert_eq!(promoted[0].burn_address, landed.burn_address);
    assert_eq!(promoted[0].transaction_hash, Some(hash));

    let statuses: Vec<TransferStatus> = h.client.list().unwrap().iter().map(|r| r.status()).collect();
    assert_eq!(statuses, vec![TransferStatus::Ready, TransferStatus::Pending]);

    h.client.redeem(landed.burn_address).await.unwrap();
}

#[tokio::test]
async fn test_json_ledger_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wormhole-sends.json");
    let h = harness_with(JsonFileStore::new(&path));
    let sent = h.client.send(receiver(), U256::from(ONE_TOKEN)).await.unwrap();

    let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let entry = &raw.as_array().unwrap()[0];
    assert_eq!(entry["amount"], "1000000000000000000");
    assert_eq!(entry["used"], false);
    assert!(entry["burnAddress"].is_string());
    assert!(entry["transactionHash"].as_str().unwrap().starts_with("0x"));

    let reopened = TransferLedger::new(JsonFileStore::new(&path));
    assert_eq!(reopened.list_all().unwrap(), vec![sent.record]);
}

#[tokio::test]
async fn test_prover_failure_leaves_record_redeemable() {
    let h = harness_with_backend(MemoryStore::new(), FlakyBackend::default());
    let sent = h.client.send(receiver(), U256::from(ONE_TOKEN)).await.unwrap();
    let burn_address = sent.record.burn_address;

    h.client.prover().backend().fail_next.store(true, Ordering::SeqCst);
    let err = h.client.redeem(burn_address).await.unwrap_err();
    match &err {
        WormholeError::Prover(ProverError::Backend(message)) => {
            assert_eq!(message, "witness generation failed: constraint 7 not satisfied")
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(!err.is_retryable());
    assert_eq!(h.client.chain().mint_count(), 0);
    assert_eq!(
        h.client.ledger().find(&burn_address).unwrap().unwrap().status(),
        TransferStatus::Ready
    );
    assert!(!h.client.prover().is_busy());

    h.client.redeem(burn_address).await.unwrap();
    assert_eq!(h.client.prover().backend().proofs.load(Ordering::SeqCst), 2);
    assert_eq!(h.client.chain().mint_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_redeems_mint_once() {
    let h = Arc::new(harness_with(StallingStore::default()));
    let sent = h.client.send(receiver(), U256::from(ONE_TOKEN)).await.unwrap();
    let burn_address = sent.record.burn_address;

    // The second redeem reads the record while it is still Ready, then stalls.
    h.client.ledger().store().arm();
    let late = {
        let h = h.clone();
        tokio::spawn(async move { h.client.redeem(burn_address).await })
    };
    while !h.client.ledger().store().stalled.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    h.client.redeem(burn_address).await.unwrap();
    h.client.ledger().store().release();

    let err = late.await.unwrap().unwrap_err();
    assert!(matches!(err, WormholeError::AlreadyRedeemed(addr) if addr == burn_address));
    assert_eq!(h.client.chain().mint_count(), 1);
}
