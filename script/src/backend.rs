//! Proving backend that runs an external prover executable.
//!
//! The executable is invoked as `<program> <action> --circuit <artifact>`
//! with a JSON request on stdin and a JSON response on stdout:
//!
//! - `setup`: no request body, output ignored
//! - `prove`: circuit input map in, `{"proof": "0x..", "publicInputs": ["0x..", ..]}` out
//! - `verify`: proof object in, `{"valid": true|false}` out
//!
//! A non-zero exit status fails the call with the tool's stderr as message.

use async_trait::async_trait;
use serde::Deserialize;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;
use wormhole_lib::prover::{CircuitArtifact, InputMap, ProofBackend, ProofData, ProverError};

#[derive(Debug, Clone)]
pub struct ExternalProver {
    program: PathBuf,
    leading_args: Vec<OsString>,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    valid: bool,
}

impl ExternalProver {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
        }
    }

    /// Arguments placed before the action, e.g. a script for an interpreter
    pub fn with_args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        self.leading_args.extend(args.into_iter().map(Into::into));
        self
    }

    async fn run(&self, action: &str, artifact: &CircuitArtifact, request: Option<Vec<u8>>) -> Result<Vec<u8>, ProverError> {
        debug!(program = %self.program.display(), action, circuit = %artifact.circuit, "invoking prover");
        let mut child = Command::new(&self.program)
            .args(&self.leading_args)
            .arg(action)
            .arg("--circuit")
            .arg(&artifact.path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ProverError::Backend(format!("failed to start {}: {e}", self.program.display())))?;

        // Dropping stdin closes it, so the tool sees EOF.
        if let Some(mut stdin) = child.stdin.take() {
            if let Some(body) = request {
                match stdin.write_all(&body).await {
                    Ok(()) => {}
                    // The tool exited without reading; its status decides.
                    Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                    Err(e) => return Err(ProverError::Backend(format!("failed to write {action} request: {e}"))),
                }
            }
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ProverError::Backend(format!("prover {action} did not finish: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(ProverError::Backend(if stderr.is_empty() {
                format!("prover {action} exited with {}", output.status)
            } else {
                stderr
            }));
        }
        Ok(output.stdout)
    }
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, ProverError> {
    serde_json::to_vec(value).map_err(|e| ProverError::Backend(format!("failed to encode prover request: {e}")))
}

fn decode<'a, T: Deserialize<'a>>(action: &str, stdout: &'a [u8]) -> Result<T, ProverError> {
    serde_json::from_slice(stdout).map_err(|e| ProverError::Backend(format!("unreadable {action} output: {e}")))
}

#[async_trait]
impl ProofBackend for ExternalProver {
    async fn setup(&self, artifact: &CircuitArtifact) -> Result<(), ProverError> {
        self.run("setup", artifact, None).await?;
        Ok(())
    }

    async fn prove(&self, artifact: &CircuitArtifact, inputs: &InputMap) -> Result<ProofData, ProverError> {
        let stdout = self.run("prove", artifact, Some(encode(inputs)?)).await?;
        decode("prove", &stdout)
    }

    async fn verify(&self, artifact: &CircuitArtifact, proof: &ProofData) -> Result<bool, ProverError> {
        let stdout = self.run("verify", artifact, Some(encode(proof)?)).await?;
        let response: VerifyResponse = decode("verify", &stdout)?;
        Ok(response.valid)
    }
}
