//! User-facing alert text. Errors carry a kind; wording is decided here.

use chrono::{DateTime, Duration, Utc};
use shared::{
    domain::AlertSeverity,
    error::{MintError, MintErrorKind},
};

pub const MINT_SUCCEEDED: &str = "Congratulations! Mint succeeded!";
pub const RESERVATION_NOT_UPDATED: &str =
    "Mint succeeded, but your remaining reservations could not be updated.";

pub fn user_message(kind: MintErrorKind) -> &'static str {
    match kind {
        MintErrorKind::SoldOut => "SOLD OUT!",
        MintErrorKind::InsufficientFunds => "Insufficient funds to mint. Please fund your wallet.",
        MintErrorKind::SaleNotStarted => "Minting period hasn't started yet.",
        MintErrorKind::NotAllowlisted => "You are not whitelisted",
        MintErrorKind::ReserveExhausted => "Not enough reserves",
        MintErrorKind::ConfirmationFailed => "Mint failed! Please try again!",
        MintErrorKind::ConfirmationTimeout => {
            "Timed out waiting for confirmation. Check your wallet before minting again."
        }
        MintErrorKind::WalletNotConnected => "Connect your wallet to mint.",
        MintErrorKind::AllowlistUnavailable => {
            "The allow-list service is unavailable. Please try again."
        }
        MintErrorKind::LedgerUnavailable => "Unable to reach the network. Please try again.",
        MintErrorKind::ReservationUpdateFailed => RESERVATION_NOT_UPDATED,
        MintErrorKind::MalformedAccountData
        | MintErrorKind::SubmissionRejected
        | MintErrorKind::UnknownMintError => "Minting failed! Please try again!",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AlertState {
    pub visible: bool,
    pub message: String,
    pub severity: Option<AlertSeverity>,
    pub raised_at: Option<DateTime<Utc>>,
}

impl AlertState {
    pub fn raise(message: impl Into<String>, severity: AlertSeverity, now: DateTime<Utc>) -> Self {
        Self {
            visible: true,
            message: message.into(),
            severity: Some(severity),
            raised_at: Some(now),
        }
    }

    pub fn mint_succeeded(now: DateTime<Utc>) -> Self {
        Self::raise(MINT_SUCCEEDED, AlertSeverity::Success, now)
    }

    pub fn from_error(err: &MintError, now: DateTime<Utc>) -> Self {
        let severity = match err.kind {
            MintErrorKind::ReservationUpdateFailed => AlertSeverity::Warning,
            _ => AlertSeverity::Error,
        };
        Self::raise(user_message(err.kind), severity, now)
    }

    pub fn dismissed(&self) -> Self {
        Self {
            visible: false,
            ..self.clone()
        }
    }

    pub fn is_showing(&self, now: DateTime<Utc>, auto_hide: Duration) -> bool {
        match self.raised_at {
            Some(raised_at) if self.visible => now - raised_at < auto_hide,
            _ => false,
        }
    }
}
