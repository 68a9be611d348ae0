use bincode::deserialize;
use solana_sdk::{
    hash::Hash,
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    transaction::VersionedTransaction,
};
use tracing::debug;

use crate::error::{SwapError, SwapResult};
use crate::jupiter::SwapResponse;
use crate::rpc::ChainRpc;

/// Signing capability handed to the assembler.
///
/// Returns `None` when the signer does not hold `required`.
pub trait TransactionSigner {
    fn sign_for(&self, required: &Pubkey, message: &[u8]) -> Option<SwapResult<Signature>>;
}

impl TransactionSigner for Keypair {
    fn sign_for(&self, required: &Pubkey, message: &[u8]) -> Option<SwapResult<Signature>> {
        if self.pubkey() != *required {
            return None;
        }
        Some(
            self.try_sign_message(message)
                .map_err(|err| SwapError::Sign(err.to_string())),
        )
    }
}

/// A transaction ready for the execution engine.
#[derive(Clone, Debug)]
pub struct SignedTransaction {
    pub transaction: VersionedTransaction,
    pub recent_blockhash: Hash,
    pub last_valid_block_height: u64,
}

impl SignedTransaction {
    pub fn signature(&self) -> Signature {
        self.transaction.signatures.first().copied().unwrap_or_default()
    }
}

pub fn decode_transaction(encoded: &str) -> SwapResult<VersionedTransaction> {
    let raw = base64::decode(encoded)
        .map_err(|err| SwapError::Decode(format!("invalid base64: {err}")))?;
    deserialize(&raw).map_err(|err| SwapError::Decode(format!("invalid transaction bytes: {err}")))
}

/// Signs with one signature per required signer, each produced by `signer`.
pub fn sign_transaction(
    tx: &mut VersionedTransaction,
    signer: &dyn TransactionSigner,
) -> SwapResult<()> {
    let required = usize::from(tx.message.header().num_required_signatures);
    let keys = tx.message.static_account_keys();
    if keys.len() < required {
        return Err(SwapError::Decode(format!(
            "message lists {required} signers but only {} keys",
            keys.len()
        )));
    }
    if required == 0 {
        return Err(SwapError::Sign("message has no required signer for the user key".into()));
    }
    let message = tx.message.serialize();

    let mut signatures = Vec::with_capacity(required);
    for key in &keys[..required] {
        let signature = signer
            .sign_for(key, &message)
            .ok_or_else(|| SwapError::Sign(format!("signer for required key {key} not available")))??;
        signatures.push(signature);
    }
    tx.signatures = signatures;
    Ok(())
}

/// Decodes the envelope, pins the freshest finalized blockhash, and signs.
///
/// The blockhash fetch must stay the last network call before submission.
pub async fn assemble(
    rpc: &dyn ChainRpc,
    signer: &dyn TransactionSigner,
    envelope: &SwapResponse,
) -> SwapResult<SignedTransaction> {
    let mut transaction = decode_transaction(&envelope.swap_transaction)?;

    let (recent_blockhash, last_valid_block_height) = rpc
        .latest_blockhash()
        .await
        .map_err(|err| SwapError::rpc("getLatestBlockhash", err))?;
    transaction.message.set_recent_blockhash(recent_blockhash);
    sign_transaction(&mut transaction, signer)?;

    let signed = SignedTransaction {
        transaction,
        recent_blockhash,
        last_valid_block_height,
    };
    debug!(
        %recent_blockhash,
        last_valid_block_height,
        signature = %signed.signature(),
        "transaction signed"
    );
    Ok(signed)
}
