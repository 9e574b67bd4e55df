use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MintErrorKind {
    LedgerUnavailable,
    MalformedAccountData,
    AllowlistUnavailable,
    WalletNotConnected,
    NotAllowlisted,
    ReserveExhausted,
    SoldOut,
    SaleNotStarted,
    InsufficientFunds,
    SubmissionRejected,
    ConfirmationTimeout,
    ConfirmationFailed,
    ReservationUpdateFailed,
    UnknownMintError,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind:?}: {detail}")]
pub struct MintError {
    pub kind: MintErrorKind,
    pub detail: String,
}

impl MintError {
    pub fn new(kind: MintErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn kind(&self) -> MintErrorKind {
        self.kind
    }
}

impl From<MintErrorKind> for MintError {
    fn from(kind: MintErrorKind) -> Self {
        Self {
            kind,
            detail: String::new(),
        }
    }
}
