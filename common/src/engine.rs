use std::fmt::{self, Write as _};
use std::time::Duration;

use solana_sdk::signature::Signature;
use tracing::{debug, info, warn};

use crate::assembler::SignedTransaction;
use crate::error::{SwapError, SwapResult};
use crate::report::TransactionRecord;
use crate::rpc::ChainRpc;

pub const DEFAULT_CONFIRM_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Built,
    SimulateRequested,
    SubmitRequested,
    Completed,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Built => "built",
            Self::SimulateRequested => "simulate-requested",
            Self::SubmitRequested => "submit-requested",
            Self::Completed => "completed",
            Self::Failed => "failed",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimulationOutcome {
    pub error: Option<String>,
    pub logs: Vec<String>,
    pub expected_out_amount: u64,
}

impl SimulationOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    pub fn render(&self) -> String {
        let mut out = String::from("Simulation mode:\n");
        match &self.error {
            Some(error) => {
                let _ = writeln!(out, "\tError: {error}");
                for line in &self.logs {
                    let _ = writeln!(out, "\t\t{line}");
                }
            }
            None => {
                let _ = writeln!(
                    out,
                    "simulation succeeded, swapped out: {}",
                    self.expected_out_amount
                );
            }
        }
        out
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Execution {
    Simulated(SimulationOutcome),
    Confirmed {
        signature: Signature,
        record: TransactionRecord,
    },
}

#[derive(Clone, Copy, Debug)]
pub enum Mode {
    Simulate { expected_out_amount: u64 },
    Submit { confirm_timeout: Duration },
}

/// Drives one signed transaction to a terminal phase.
pub struct ExecutionEngine<'a> {
    rpc: &'a dyn ChainRpc,
    phase: Phase,
}

impl<'a> ExecutionEngine<'a> {
    pub fn new(rpc: &'a dyn ChainRpc) -> Self {
        Self {
            rpc,
            phase: Phase::Built,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn transition(&mut self, next: Phase) {
        debug!(from = %self.phase, to = %next, "execution phase");
        self.phase = next;
    }

    pub async fn execute(&mut self, signed: &SignedTransaction, mode: Mode) -> SwapResult<Execution> {
        let result = match mode {
            Mode::Simulate { expected_out_amount } => {
                self.transition(Phase::SimulateRequested);
                self.simulate(signed, expected_out_amount).await
            }
            Mode::Submit { confirm_timeout } => {
                self.transition(Phase::SubmitRequested);
                self.submit_and_confirm(signed, confirm_timeout).await
            }
        };
        self.transition(match &result {
            Ok(_) => Phase::Completed,
            Err(err) if err.is_soft() => Phase::Completed,
            Err(_) => Phase::Failed,
        });
        result
    }

    async fn simulate(&self, signed: &SignedTransaction, expected_out_amount: u64) -> SwapResult<Execution> {
        let result = self
            .rpc
            .simulate(&signed.transaction)
            .await
            .map_err(|err| SwapError::rpc("simulateTransaction", err))?;
        info!(succeeded = result.error.is_none(), logs = result.logs.len(), "simulation finished");
        Ok(Execution::Simulated(SimulationOutcome {
            error: result.error,
            logs: result.logs,
            expected_out_amount,
        }))
    }

    async fn submit_and_confirm(
        &self,
        signed: &SignedTransaction,
        confirm_timeout: Duration,
    ) -> SwapResult<Execution> {
        let expected = signed.signature();
        info!(
            signature = %expected,
            recent_blockhash = %signed.recent_blockhash,
            last_valid_block_height = signed.last_valid_block_height,
            timeout_secs = confirm_timeout.as_secs(),
            "sending transaction and waiting for confirmation"
        );

        let signature = self
            .rpc
            .submit(&signed.transaction)
            .await
            .map_err(SwapError::Submission)?;

        match tokio::time::timeout(confirm_timeout, self.rpc.await_confirmation(&signature)).await {
            Err(_elapsed) => {
                warn!(
                    %signature,
                    last_valid_block_height = signed.last_valid_block_height,
                    "confirmation wait timed out, transaction expires after this block height"
                );
                return Err(SwapError::ConfirmationTimeout {
                    signature,
                    timeout: confirm_timeout,
                });
            }
            Ok(Err(err)) => {
                return Err(SwapError::Submission(
                    err.context(format!("confirmation of {signature} failed")),
                ));
            }
            Ok(Ok(Err(tx_err))) => {
                return Err(SwapError::Submission(anyhow::anyhow!(
                    "transaction {signature} failed on-chain: {tx_err}"
                )));
            }
            Ok(Ok(Ok(()))) => info!(%signature, "transaction finalized"),
        }

        let record = self
            .rpc
            .fetch_transaction(&signature)
            .await
            .map_err(|source| SwapError::RecordFetch { signature, source })?;
        Ok(Execution::Confirmed { signature, record })
    }
}
