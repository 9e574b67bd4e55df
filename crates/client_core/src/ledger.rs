//! Boundary to the external ledger client: account reads, balance reads,
//! mint transaction submission and signature status lookups.

use async_trait::async_trait;
use shared::domain::{Identity, Lamports, ProgramId, TransactionId};
use thiserror::Error;

use crate::wallet::WalletSigner;

/// Commitment levels reported by the ledger, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Commitment {
    Processed,
    Confirmed,
    Finalized,
}

/// Handle to the loaded sale program. Opaque to the controller; it is only
/// carried from a sale-state read into the next mint submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProgramHandle {
    pub sale_account: ProgramId,
}

/// Sale account contents as decoded by the ledger client, read from a single slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSaleAccount {
    pub items_available: u64,
    pub items_redeemed: u64,
    /// Unix seconds; `None` when the sale authority has not scheduled a start.
    pub go_live_unix: Option<i64>,
    pub handle: ProgramHandle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureStatus {
    pub confirmation: Commitment,
    pub err: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerFault {
    #[error("ledger endpoint unreachable: {0}")]
    Unreachable(String),
    #[error("account data failed to decode: {0}")]
    Decode(String),
    #[error("program returned custom error {code:#x}")]
    Program { code: u32 },
    #[error("transaction rejected: {0}")]
    Rejected(String),
}

pub struct MintRequest<'a> {
    pub program: &'a ProgramHandle,
    pub config_account: &'a ProgramId,
    pub payer: &'a Identity,
    pub treasury: &'a Identity,
    pub signer: &'a dyn WalletSigner,
}

#[async_trait]
pub trait LedgerConnection: Send + Sync {
    async fn read_sale_account(&self, program_id: &ProgramId) -> Result<RawSaleAccount, LedgerFault>;
    async fn balance(&self, identity: &Identity) -> Result<Lamports, LedgerFault>;
    /// Builds, signs and sends exactly one mint transaction.
    async fn send_mint(&self, request: MintRequest<'_>) -> Result<TransactionId, LedgerFault>;
    /// `Ok(None)` while the ledger has not seen the transaction yet.
    async fn signature_status(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Option<SignatureStatus>, LedgerFault>;
}
