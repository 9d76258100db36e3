//! Proof orchestration
//!
//! Packs a commitment and its Merkle path into the wormhole circuit's input
//! map, hands it to an opaque [`ProofBackend`], and decodes the nullifier from
//! the proof's public outputs.
//!
//! The backend is set up once per orchestrator and is not safe for concurrent
//! proving, so callers must hold the single [`ProvingPermit`] while proving
//! and submitting.

use alloy_primitives::{Address, Bytes, B256, U256};
use ark_bn254::Fr;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{OnceCell, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info};

use crate::commitment::Secret;
use crate::crypto::{address_to_field, field_to_decimal};
use crate::merkle::{MerklePath, MAX_DEPTH};

/// Position of the nullifier among the circuit's public outputs
pub const NULLIFIER_POSITION: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum ProverError {
    #[error("a proof is already being generated")]
    Busy,
    #[error("proving permit was issued by a different orchestrator")]
    ForeignPermit,
    #[error("circuit artifact for {circuit} not found at {}", path.display())]
    MissingArtifact { circuit: CircuitId, path: PathBuf },
    #[error("proof has {found} public outputs, expected at least {expected}")]
    MalformedOutputs { found: usize, expected: usize },
    /// Backend failure, message preserved verbatim
    #[error("{0}")]
    Backend(String),
}

/// Circuits known to this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CircuitId {
    Wormhole,
}

impl CircuitId {
    /// Compiled artifact file name, relative to the artifacts directory
    pub fn artifact_file(&self) -> &'static str {
        match self {
            CircuitId::Wormhole => "wormhole.json",
        }
    }
}

impl fmt::Display for CircuitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitId::Wormhole => f.write_str("wormhole"),
        }
    }
}

/// A resolved, existing compiled circuit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitArtifact {
    pub circuit: CircuitId,
    pub path: PathBuf,
}

/// Static mapping from circuit id to compiled artifact.
#[derive(Debug, Clone)]
pub struct CircuitRegistry {
    artifacts_dir: PathBuf,
}

impl CircuitRegistry {
    pub fn new(artifacts_dir: impl Into<PathBuf>) -> Self {
        Self {
            artifacts_dir: artifacts_dir.into(),
        }
    }

    pub fn artifacts_dir(&self) -> &Path {
        &self.artifacts_dir
    }

    pub fn path_for(&self, circuit: CircuitId) -> PathBuf {
        self.artifacts_dir.join(circuit.artifact_file())
    }

    /// Resolve `circuit` to an artifact that exists on disk.
    pub fn resolve(&self, circuit: CircuitId) -> Result<CircuitArtifact, ProverError> {
        let path = self.path_for(circuit);
        if !path.is_file() {
            return Err(ProverError::MissingArtifact { circuit, path });
        }
        Ok(CircuitArtifact { circuit, path })
    }
}

/// One circuit input: a field or an array of fields, as base-10 strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputValue {
    Field(String),
    Array(Vec<String>),
}

pub type InputMap = BTreeMap<String, InputValue>;

/// Raw backend output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofData {
    pub proof: Bytes,
    pub public_inputs: Vec<B256>,
}

/// Opaque proving service.
#[async_trait]
pub trait ProofBackend: Send + Sync {
    /// One-time preparation for `artifact` (key generation, WASM init...)
    async fn setup(&self, artifact: &CircuitArtifact) -> Result<(), ProverError>;

    async fn prove(&self, artifact: &CircuitArtifact, inputs: &InputMap) -> Result<ProofData, ProverError>;

    async fn verify(&self, artifact: &CircuitArtifact, proof: &ProofData) -> Result<bool, ProverError>;
}

/// Witness for one redemption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WormholeInputs {
    pub secret: Secret,
    pub receiver: Address,
    pub amount: U256,
    pub merkle_path: MerklePath,
}

impl WormholeInputs {
    /// The circuit's input schema. Field names are fixed by the circuit ABI.
    pub fn to_input_map(&self) -> InputMap {
        let path: Vec<String> = self.merkle_path.siblings.iter().map(field_to_decimal).collect();
        debug_assert_eq!(path.len(), MAX_DEPTH);

        let mut inputs = InputMap::new();
        inputs.insert("secret".into(), InputValue::Field(self.secret.as_u256().to_string()));
        inputs.insert(
            "receiver".into(),
            InputValue::Field(field_to_decimal(&address_to_field(&self.receiver))),
        );
        inputs.insert("amount".into(), InputValue::Field(self.amount.to_string()));
        inputs.insert(
            "merkle_root".into(),
            InputValue::Field(field_to_decimal(&self.merkle_path.root)),
        );
        inputs.insert("merkle_path".into(), InputValue::Array(path));
        inputs.insert(
            "merkle_index".into(),
            InputValue::Field(self.merkle_path.index.to_string()),
        );
        inputs
    }
}

/// Named view over the proof's public outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicOutputs {
    pub nullifier: B256,
}

impl PublicOutputs {
    pub fn decode(public_inputs: &[B256]) -> Result<Self, ProverError> {
        let nullifier = public_inputs
            .get(NULLIFIER_POSITION)
            .copied()
            .ok_or(ProverError::MalformedOutputs {
                found: public_inputs.len(),
                expected: NULLIFIER_POSITION + 1,
            })?;
        Ok(Self { nullifier })
    }
}

/// A generated proof with its decoded outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WormholeProof {
    pub data: ProofData,
    pub outputs: PublicOutputs,
    pub root: Fr,
}

impl WormholeProof {
    pub fn nullifier(&self) -> B256 {
        self.outputs.nullifier
    }
}

/// Exclusive right to use the proving backend. Released on drop.
///
/// Only valid with the orchestrator that issued it.
#[derive(Debug)]
pub struct ProvingPermit {
    slot: Arc<Semaphore>,
    _permit: OwnedSemaphorePermit,
}

/// Front end of the proving backend.
pub struct ProofOrchestrator<B> {
    backend: B,
    registry: CircuitRegistry,
    circuit: CircuitId,
    artifact: OnceCell<CircuitArtifact>,
    slot: Arc<Semaphore>,
}

impl<B: ProofBackend> ProofOrchestrator<B> {
    pub fn new(backend: B, registry: CircuitRegistry) -> Self {
        Self {
            backend,
            registry,
            circuit: CircuitId::Wormhole,
            artifact: OnceCell::new(),
            slot: Arc::new(Semaphore::new(1)),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn is_initialized(&self) -> bool {
        self.artifact.initialized()
    }

    /// Resolve the circuit artifact and set the backend up.
    ///
    /// Runs once; later calls return the cached artifact. A failed setup is
    /// not cached and will be attempted again.
    pub async fn init(&self) -> Result<&CircuitArtifact, ProverError> {
        self.artifact
            .get_or_try_init(|| async {
                let artifact = self.registry.resolve(self.circuit)?;
                info!(circuit = %artifact.circuit, path = %artifact.path.display(), "initializing proving backend");
                self.backend.setup(&artifact).await?;
                Ok::<_, ProverError>(artifact)
            })
            .await
    }

    /// Take the proving slot, failing immediately if it is held.
    pub fn try_acquire(&self) -> Result<ProvingPermit, ProverError> {
        self.slot
            .clone()
            .try_acquire_owned()
            .map(|permit| ProvingPermit {
                slot: self.slot.clone(),
                _permit: permit,
            })
            .map_err(|_| ProverError::Busy)
    }

    fn check_permit(&self, permit: &ProvingPermit) -> Result<(), ProverError> {
        if Arc::ptr_eq(&self.slot, &permit.slot) {
            Ok(())
        } else {
            Err(ProverError::ForeignPermit)
        }
    }

    pub fn is_busy(&self) -> bool {
        self.slot.available_permits() == 0
    }

    /// Generate a proof for `inputs`. Backend errors are returned as-is and
    /// never retried.
    pub async fn generate_proof(
        &self,
        permit: &ProvingPermit,
        inputs: &WormholeInputs,
    ) -> Result<WormholeProof, ProverError> {
        self.check_permit(permit)?;
        let artifact = self.init().await?;
        let input_map = inputs.to_input_map();

        debug!(leaf_index = inputs.merkle_path.leaf_index, "generating wormhole proof");
        let data = self.backend.prove(artifact, &input_map).await?;
        let outputs = PublicOutputs::decode(&data.public_inputs)?;
        debug!(proof_len = data.proof.len(), nullifier = %outputs.nullifier, "proof generated");

        Ok(WormholeProof {
            data,
            outputs,
            root: inputs.merkle_path.root,
        })
    }

    /// Verify a proof locally with the backend. Shares the proving slot,
    /// since the backend cannot verify while it proves.
    pub async fn verify_proof(
        &self,
        permit: &ProvingPermit,
        proof: &ProofData,
    ) -> Result<bool, ProverError> {
        self.check_permit(permit)?;
        let artifact = self.init().await?;
        self.backend.verify(artifact, proof).await
    }
}
