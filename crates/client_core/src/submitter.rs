use std::sync::Arc;

use shared::{
    domain::{Identity, ProgramId, TransactionId},
    error::{MintError, MintErrorKind},
};
use tracing::{info, warn};

use crate::{
    ledger::{LedgerConnection, LedgerFault, MintRequest, ProgramHandle},
    wallet::WalletSession,
};

/// Candy machine `CandyMachineEmpty` (311).
pub const ERR_SOLD_OUT: u32 = 0x137;
/// Candy machine `NotEnoughSOL` (309).
pub const ERR_INSUFFICIENT_FUNDS: u32 = 0x135;
/// Candy machine `CandyMachineNotLiveYet` (0x138).
pub const ERR_SALE_NOT_STARTED: u32 = 312;

pub fn classify_program_error(code: u32) -> MintErrorKind {
    match code {
        ERR_SOLD_OUT => MintErrorKind::SoldOut,
        ERR_INSUFFICIENT_FUNDS => MintErrorKind::InsufficientFunds,
        ERR_SALE_NOT_STARTED => MintErrorKind::SaleNotStarted,
        _ => MintErrorKind::SubmissionRejected,
    }
}

/// Pulls the program error code out of a simulation/log line, either the
/// runtime's `custom program error: 0x137` or the framework's `Error Number: 311`.
pub fn parse_custom_program_error(message: &str) -> Option<u32> {
    const HEX_MARKER: &str = "custom program error: 0x";
    const DEC_MARKER: &str = "Error Number: ";

    if let Some(idx) = message.find(HEX_MARKER) {
        let digits: String = message[idx + HEX_MARKER.len()..]
            .chars()
            .take_while(|c| c.is_ascii_hexdigit())
            .collect();
        return u32::from_str_radix(&digits, 16).ok();
    }

    if let Some(idx) = message.find(DEC_MARKER) {
        let digits: String = message[idx + DEC_MARKER.len()..]
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        return digits.parse().ok();
    }

    None
}

pub fn map_submit_fault(fault: LedgerFault) -> MintError {
    match fault {
        LedgerFault::Program { code } => {
            MintError::new(classify_program_error(code), format!("program error {code:#x}"))
        }
        LedgerFault::Rejected(detail) => {
            let kind = parse_custom_program_error(&detail)
                .map(classify_program_error)
                .unwrap_or(MintErrorKind::SubmissionRejected);
            MintError::new(kind, detail)
        }
        LedgerFault::Unreachable(detail) => MintError::new(MintErrorKind::LedgerUnavailable, detail),
        LedgerFault::Decode(detail) => MintError::new(MintErrorKind::UnknownMintError, detail),
    }
}

pub struct TransactionSubmitter {
    connection: Arc<dyn LedgerConnection>,
    config_account: ProgramId,
}

impl TransactionSubmitter {
    pub fn new(connection: Arc<dyn LedgerConnection>, config_account: ProgramId) -> Self {
        Self {
            connection,
            config_account,
        }
    }

    pub async fn submit_mint(
        &self,
        program: &ProgramHandle,
        payer: &WalletSession,
        treasury: &Identity,
    ) -> Result<TransactionId, MintError> {
        let request = MintRequest {
            program,
            config_account: &self.config_account,
            payer: &payer.identity,
            treasury,
            signer: payer.signer.as_ref(),
        };

        match self.connection.send_mint(request).await {
            Ok(transaction_id) => {
                info!(
                    identity = %payer.identity,
                    transaction_id = %transaction_id,
                    "mint: transaction submitted"
                );
                Ok(transaction_id)
            }
            Err(fault) => {
                let err = map_submit_fault(fault);
                warn!(identity = %payer.identity, kind = ?err.kind, detail = %err.detail, "mint: submission failed");
                Err(err)
            }
        }
    }
}
