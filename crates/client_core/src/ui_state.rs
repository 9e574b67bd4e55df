//! Pure projection from controller state to what the page renders.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use shared::domain::{Identity, Lamports, TransactionId};

use crate::{alert::AlertState, reservation::ReservationStatus, sale_state::SaleSnapshot};

const ADDRESS_DISPLAY_CHARS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MintPhase {
    Preflight,
    Submitting,
    AwaitingConfirmation,
    Reconciling,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintAttempt {
    pub transaction_id: Option<TransactionId>,
    pub phase: MintPhase,
    pub balance_at_start: Option<Lamports>,
    pub started_at: DateTime<Utc>,
}

impl MintAttempt {
    pub fn begin(balance_at_start: Option<Lamports>, now: DateTime<Utc>) -> Self {
        Self {
            transaction_id: None,
            phase: MintPhase::Preflight,
            balance_at_start,
            started_at: now,
        }
    }

    /// False while the attempt is still in local pre-flight checks.
    pub fn reached_ledger(&self) -> bool {
        self.phase != MintPhase::Preflight
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerPhase {
    Disconnected,
    Idle,
    Eligible,
    Ineligible,
    Minting,
    Reconciling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DerivedUiState {
    pub is_live: bool,
    pub is_sold_out: bool,
    pub is_minting: bool,
    pub can_mint: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MintButton {
    ConnectWallet,
    SoldOut,
    Minting,
    Mint,
    CountingDown { remaining: Duration },
}

/// Owned copy of everything the projection reads, taken under one lock.
#[derive(Debug, Clone, Default)]
pub struct UiInputs {
    pub wallet: Option<Identity>,
    pub balance: Option<Lamports>,
    pub sale: Option<Arc<SaleSnapshot>>,
    pub sold_out_latched: bool,
    pub reservation: Option<ReservationStatus>,
    pub attempt: Option<MintAttempt>,
    pub alert: AlertState,
    pub notice: Option<AlertState>,
    pub fallback_go_live: Option<DateTime<Utc>>,
}

impl UiInputs {
    fn go_live_at(&self) -> Option<DateTime<Utc>> {
        self.sale
            .as_ref()
            .map(|sale| sale.go_live_at)
            .or(self.fallback_go_live)
    }
}

pub fn derive_ui_state(inputs: &UiInputs, now: DateTime<Utc>) -> DerivedUiState {
    let is_live = inputs.go_live_at().is_some_and(|go_live| now >= go_live);
    let is_sold_out =
        inputs.sold_out_latched || inputs.sale.as_ref().is_some_and(|sale| sale.is_sold_out());
    let is_minting = inputs.attempt.is_some();
    let reservation_ok = inputs
        .reservation
        .is_some_and(|reservation| reservation.can_reserve());

    DerivedUiState {
        is_live,
        is_sold_out,
        is_minting,
        can_mint: inputs.wallet.is_some()
            && !is_sold_out
            && !is_minting
            && is_live
            && reservation_ok,
    }
}

pub fn controller_phase(inputs: &UiInputs) -> ControllerPhase {
    if let Some(attempt) = &inputs.attempt {
        return match attempt.phase {
            MintPhase::Reconciling => ControllerPhase::Reconciling,
            _ => ControllerPhase::Minting,
        };
    }
    if inputs.wallet.is_none() {
        return ControllerPhase::Disconnected;
    }
    match inputs.reservation {
        None => ControllerPhase::Idle,
        Some(reservation) if reservation.can_reserve() => ControllerPhase::Eligible,
        Some(_) => ControllerPhase::Ineligible,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MintView {
    pub state: DerivedUiState,
    pub phase: ControllerPhase,
    pub button: MintButton,
    pub address: Option<String>,
    pub balance_sol: Option<f64>,
    pub items_redeemed: Option<u64>,
    pub items_available: Option<u64>,
    pub items_remaining: Option<u64>,
    pub reservation: Option<ReservationStatus>,
    pub alert: Option<AlertState>,
    pub notice: Option<AlertState>,
}

impl MintView {
    pub fn project(inputs: &UiInputs, now: DateTime<Utc>, alert_auto_hide: Duration) -> Self {
        let state = derive_ui_state(inputs, now);

        // Same precedence as the mint button: sold out, then live (spinner or
        // mint), otherwise the countdown.
        let button = if inputs.wallet.is_none() {
            MintButton::ConnectWallet
        } else if state.is_sold_out {
            MintButton::SoldOut
        } else if state.is_live {
            if state.is_minting {
                MintButton::Minting
            } else {
                MintButton::Mint
            }
        } else {
            MintButton::CountingDown {
                remaining: inputs
                    .go_live_at()
                    .map(|go_live| go_live - now)
                    .unwrap_or_else(Duration::zero),
            }
        };

        Self {
            state,
            phase: controller_phase(inputs),
            button,
            address: inputs
                .wallet
                .as_ref()
                .map(|identity| identity.shortened(ADDRESS_DISPLAY_CHARS)),
            balance_sol: inputs.balance.map(Lamports::as_sol),
            items_redeemed: inputs.sale.as_ref().map(|sale| sale.items_redeemed),
            items_available: inputs.sale.as_ref().map(|sale| sale.items_available),
            items_remaining: inputs.sale.as_ref().map(|sale| sale.items_remaining),
            reservation: inputs.reservation,
            alert: Some(inputs.alert.clone()).filter(|alert| alert.is_showing(now, alert_auto_hide)),
            notice: inputs
                .notice
                .clone()
                .filter(|notice| notice.is_showing(now, alert_auto_hide)),
        }
    }
}
