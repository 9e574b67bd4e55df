//! Mint orchestration: reconciles on-chain sale state, allow-list
//! eligibility and the wallet session, and drives one mint at a time through
//! submission, confirmation and reservation bookkeeping.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use shared::{
    domain::{Identity, Lamports, ProgramId, TransactionId},
    error::{MintError, MintErrorKind},
};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

use crate::{
    alert::AlertState,
    config::Settings,
    confirmation::{ConfirmationOutcome, ConfirmationWatcher},
    ledger::LedgerConnection,
    reservation::{HttpReservationClient, ReservationService, ReservationStatus},
    sale_state::{SaleSnapshot, SaleStateReader},
    submitter::TransactionSubmitter,
    ui_state::{derive_ui_state, DerivedUiState, MintAttempt, MintPhase, MintView, UiInputs},
    wallet::WalletSession,
};

/// Floor for the live ticker period; `interval` rejects a zero period.
const MIN_TICK: Duration = Duration::from_millis(1);

#[derive(Debug, Clone)]
pub enum ControllerEvent {
    SaleStateUpdated(Arc<SaleSnapshot>),
    EligibilityUpdated(Option<ReservationStatus>),
    BalanceUpdated(Lamports),
    /// `None` once the attempt has resolved and the controller is idle again.
    MintPhaseChanged(Option<MintPhase>),
    Alert(AlertState),
    ReconciliationGap {
        identity: Identity,
        intended_reserve: i64,
    },
    LiveChanged(bool),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MintOutcome {
    Minted {
        transaction_id: TransactionId,
        reservation_synced: bool,
    },
    /// Another attempt was already in flight; nothing was sent.
    AlreadyInFlight,
}

#[derive(Default)]
struct ControllerState {
    epoch: u64,
    wallet: Option<WalletSession>,
    balance: Option<Lamports>,
    sale: Option<Arc<SaleSnapshot>>,
    sale_fetched_at: Option<DateTime<Utc>>,
    sale_reads_issued: u64,
    sale_read_applied: u64,
    /// Read sequence at the time a submission reported sold out; cleared by
    /// any snapshot issued after it.
    sold_out_latch: Option<u64>,
    reservation: Option<ReservationStatus>,
    attempt: Option<MintAttempt>,
    alert: AlertState,
    notice: Option<AlertState>,
}

pub struct MintController {
    ledger: Arc<dyn LedgerConnection>,
    reservations: Arc<dyn ReservationService>,
    sale_reader: SaleStateReader,
    submitter: TransactionSubmitter,
    watcher: ConfirmationWatcher,
    treasury: Identity,
    tx_timeout: Duration,
    alert_auto_hide: chrono::Duration,
    sale_state_max_age: chrono::Duration,
    fallback_go_live: Option<DateTime<Utc>>,
    inner: Mutex<ControllerState>,
    events: broadcast::Sender<ControllerEvent>,
}

impl MintController {
    pub fn from_settings(
        settings: &Settings,
        ledger: Arc<dyn LedgerConnection>,
    ) -> anyhow::Result<Arc<Self>> {
        let reservations = HttpReservationClient::new(
            &settings.allowlist_api_url,
            settings.allowlist_auth_token.clone(),
        )?;
        Ok(Self::new(settings, ledger, Arc::new(reservations)))
    }

    pub fn new(
        settings: &Settings,
        ledger: Arc<dyn LedgerConnection>,
        reservations: Arc<dyn ReservationService>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            sale_reader: SaleStateReader::new(
                ledger.clone(),
                ProgramId::new(settings.candy_machine_id.clone()),
            ),
            submitter: TransactionSubmitter::new(
                ledger.clone(),
                ProgramId::new(settings.config_account.clone()),
            ),
            watcher: ConfirmationWatcher::new(ledger.clone(), settings.confirmation_poll_interval()),
            ledger,
            reservations,
            treasury: Identity::new(settings.treasury.clone()),
            tx_timeout: settings.tx_timeout(),
            alert_auto_hide: settings.alert_auto_hide(),
            sale_state_max_age: settings.sale_state_max_age(),
            fallback_go_live: settings.start_date,
            inner: Mutex::new(ControllerState::default()),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: ControllerEvent) {
        let _ = self.events.send(event);
    }

    /// Balance, eligibility and (when stale) sale state are fetched concurrently.
    pub async fn connect_wallet(&self, session: WalletSession) {
        let identity = session.identity.clone();
        let now = Utc::now();
        let (epoch, sale_is_fresh) = {
            let mut guard = self.inner.lock().await;
            guard.epoch += 1;
            guard.wallet = Some(session);
            guard.balance = None;
            guard.reservation = None;
            let fresh = guard
                .sale_fetched_at
                .is_some_and(|fetched_at| now - fetched_at < self.sale_state_max_age);
            (guard.epoch, fresh)
        };
        info!(identity = %identity, epoch, "wallet: connected");

        let sale_refresh = async {
            if sale_is_fresh {
                return;
            }
            if let Err(err) = self.refresh_sale_state().await {
                warn!(kind = ?err.kind, detail = %err.detail, "wallet: sale state refresh on connect failed");
            }
        };

        let (_, eligibility, _) = futures::join!(
            self.refresh_balance_for(epoch, &identity),
            self.refresh_eligibility_for(epoch, &identity),
            sale_refresh,
        );

        if let Err(err) = eligibility {
            self.raise_alert(AlertState::from_error(&err, Utc::now())).await;
        }
    }

    pub async fn disconnect_wallet(&self) {
        {
            let mut guard = self.inner.lock().await;
            guard.epoch += 1;
            guard.wallet = None;
            guard.balance = None;
            guard.reservation = None;
        }
        info!("wallet: disconnected");
        self.emit(ControllerEvent::EligibilityUpdated(None));
    }

    async fn current_identity(&self) -> Option<(u64, Identity)> {
        let guard = self.inner.lock().await;
        let current = guard
            .wallet
            .as_ref()
            .map(|session| (guard.epoch, session.identity.clone()));
        current
    }

    /// Reads are sequenced so a slow read never replaces a newer snapshot.
    pub async fn refresh_sale_state(&self) -> Result<Arc<SaleSnapshot>, MintError> {
        let seq = {
            let mut guard = self.inner.lock().await;
            guard.sale_reads_issued += 1;
            guard.sale_reads_issued
        };

        let snapshot = Arc::new(self.sale_reader.fetch_sale_state().await?);

        let applied = {
            let mut guard = self.inner.lock().await;
            if seq > guard.sale_read_applied {
                guard.sale = Some(snapshot.clone());
                guard.sale_fetched_at = Some(Utc::now());
                guard.sale_read_applied = seq;
                if guard.sold_out_latch.is_some_and(|latched_at| seq > latched_at) {
                    guard.sold_out_latch = None;
                }
                true
            } else {
                false
            }
        };

        if applied {
            self.emit(ControllerEvent::SaleStateUpdated(snapshot.clone()));
        } else {
            debug!(seq, "sale state: newer snapshot already applied; dropping read");
        }
        Ok(snapshot)
    }

    pub async fn on_countdown_complete(&self) -> Result<Arc<SaleSnapshot>, MintError> {
        self.refresh_sale_state().await
    }

    pub async fn refresh_eligibility(&self) -> Result<Option<ReservationStatus>, MintError> {
        let Some((epoch, identity)) = self.current_identity().await else {
            return Ok(None);
        };
        self.refresh_eligibility_for(epoch, &identity).await.map(Some)
    }

    async fn refresh_eligibility_for(
        &self,
        epoch: u64,
        identity: &Identity,
    ) -> Result<ReservationStatus, MintError> {
        let status = self
            .reservations
            .check_eligibility(identity)
            .await
            .inspect_err(|err| {
                warn!(identity = %identity, kind = ?err.kind, detail = %err.detail, "allowlist: eligibility check failed");
            })?;
        self.store_reservation(epoch, status).await;
        Ok(status)
    }

    async fn store_reservation(&self, epoch: u64, status: ReservationStatus) {
        {
            let mut guard = self.inner.lock().await;
            if guard.epoch != epoch {
                debug!(epoch, current = guard.epoch, "allowlist: dropping result for previous session");
                return;
            }
            guard.reservation = Some(status);
        }
        self.emit(ControllerEvent::EligibilityUpdated(Some(status)));
    }

    pub async fn refresh_balance(&self) -> Option<Lamports> {
        let (epoch, identity) = self.current_identity().await?;
        self.refresh_balance_for(epoch, &identity).await
    }

    async fn refresh_balance_for(&self, epoch: u64, identity: &Identity) -> Option<Lamports> {
        let balance = match self.ledger.balance(identity).await {
            Ok(balance) => balance,
            Err(fault) => {
                warn!(identity = %identity, %fault, "wallet: balance read failed");
                return None;
            }
        };

        {
            let mut guard = self.inner.lock().await;
            if guard.epoch != epoch {
                return None;
            }
            guard.balance = Some(balance);
        }
        self.emit(ControllerEvent::BalanceUpdated(balance));
        Some(balance)
    }

    async fn raise_alert(&self, alert: AlertState) {
        self.inner.lock().await.alert = alert.clone();
        self.emit(ControllerEvent::Alert(alert));
    }

    pub async fn dismiss_alert(&self) {
        let mut guard = self.inner.lock().await;
        guard.alert = guard.alert.dismissed();
        guard.notice = None;
    }

    async fn set_phase(&self, phase: MintPhase, transaction_id: Option<TransactionId>) {
        {
            let mut guard = self.inner.lock().await;
            guard.attempt = guard.attempt.take().map(|attempt| MintAttempt {
                phase,
                transaction_id: transaction_id.or(attempt.transaction_id),
                ..attempt
            });
        }
        self.emit(ControllerEvent::MintPhaseChanged(Some(phase)));
    }

    /// Runs one mint attempt end to end. A trigger while another attempt is
    /// in flight returns `AlreadyInFlight` without touching the network.
    ///
    /// The attempt runs on its own task: dropping the returned future stops
    /// waiting for it but the attempt still resolves and frees the slot.
    pub async fn mint(self: &Arc<Self>) -> Result<MintOutcome, MintError> {
        let now = Utc::now();
        let (epoch, session) = {
            let mut guard = self.inner.lock().await;
            if guard.attempt.is_some() {
                debug!("mint: attempt already in flight; trigger ignored");
                return Ok(MintOutcome::AlreadyInFlight);
            }
            let Some(session) = guard.wallet.clone() else {
                drop(guard);
                let err = MintError::from(MintErrorKind::WalletNotConnected);
                self.raise_alert(AlertState::from_error(&err, now)).await;
                return Err(err);
            };
            guard.attempt = Some(MintAttempt::begin(guard.balance, now));
            guard.notice = None;
            (guard.epoch, session)
        };
        info!(identity = %session.identity, "mint: attempt started");
        self.emit(ControllerEvent::MintPhaseChanged(Some(MintPhase::Preflight)));

        let controller = Arc::clone(self);
        let attempt = tokio::spawn(async move { controller.drive_attempt(epoch, session).await });
        match attempt.await {
            Ok(result) => result,
            Err(join_err) => {
                error!(error = %join_err, "mint: attempt task aborted");
                let err = MintError::new(MintErrorKind::UnknownMintError, join_err.to_string());
                self.raise_alert(AlertState::from_error(&err, Utc::now())).await;
                self.inner.lock().await.attempt = None;
                self.emit(ControllerEvent::MintPhaseChanged(None));
                Err(err)
            }
        }
    }

    async fn drive_attempt(
        &self,
        epoch: u64,
        session: WalletSession,
    ) -> Result<MintOutcome, MintError> {
        let result = self.run_mint_sequence(epoch, &session).await;
        if let Err(err) = &result {
            let reached_ledger = self
                .inner
                .lock()
                .await
                .attempt
                .as_ref()
                .is_some_and(MintAttempt::reached_ledger);
            if reached_ledger {
                warn!(
                    identity = %session.identity,
                    kind = ?err.kind,
                    detail = %err.detail,
                    "mint: attempt failed"
                );
            } else {
                info!(identity = %session.identity, kind = ?err.kind, "mint: rejected before submission");
            }
            self.raise_alert(AlertState::from_error(err, Utc::now())).await;
        }

        self.finish_attempt().await;
        result
    }

    async fn run_mint_sequence(
        &self,
        epoch: u64,
        session: &WalletSession,
    ) -> Result<MintOutcome, MintError> {
        let (cached, latched) = {
            let guard = self.inner.lock().await;
            (guard.sale.clone(), guard.sold_out_latch.is_some())
        };
        let snapshot = match cached {
            Some(snapshot) => snapshot,
            None => self.refresh_sale_state().await?,
        };

        if latched || snapshot.is_sold_out() {
            return Err(MintError::new(MintErrorKind::SoldOut, "no items remaining"));
        }
        if !snapshot.is_live_at(Utc::now()) {
            return Err(MintError::new(
                MintErrorKind::SaleNotStarted,
                format!("sale goes live at {}", snapshot.go_live_at),
            ));
        }

        let reservation = self
            .refresh_eligibility_for(epoch, &session.identity)
            .await?;
        if !reservation.is_allowlisted {
            return Err(MintError::new(
                MintErrorKind::NotAllowlisted,
                format!("{} is not on the allow-list", session.identity),
            ));
        }
        if reservation.remaining_reserve <= 0 {
            return Err(MintError::new(
                MintErrorKind::ReserveExhausted,
                format!("remaining reserve {}", reservation.remaining_reserve),
            ));
        }
        // Decrement from this value, not from a later read.
        let reserve_at_submit = reservation.remaining_reserve;

        self.set_phase(MintPhase::Submitting, None).await;
        let transaction_id = match self
            .submitter
            .submit_mint(&snapshot.program, session, &self.treasury)
            .await
        {
            Ok(transaction_id) => transaction_id,
            Err(err) => {
                if err.kind == MintErrorKind::SoldOut {
                    let mut guard = self.inner.lock().await;
                    guard.sold_out_latch = Some(guard.sale_reads_issued);
                }
                return Err(err);
            }
        };

        self.set_phase(MintPhase::AwaitingConfirmation, Some(transaction_id.clone()))
            .await;
        match self
            .watcher
            .await_confirmation(&transaction_id, self.tx_timeout)
            .await?
        {
            ConfirmationOutcome::Failed(detail) => {
                Err(MintError::new(MintErrorKind::ConfirmationFailed, detail))
            }
            ConfirmationOutcome::Confirmed => {
                info!(
                    identity = %session.identity,
                    transaction_id = %transaction_id,
                    "mint: confirmed"
                );
                self.raise_alert(AlertState::mint_succeeded(Utc::now())).await;
                self.set_phase(MintPhase::Reconciling, None).await;
                let reservation_synced = self
                    .reconcile_reservation(epoch, &session.identity, reserve_at_submit - 1)
                    .await;
                Ok(MintOutcome::Minted {
                    transaction_id,
                    reservation_synced,
                })
            }
        }
    }

    /// A failure here leaves the allow-list one reservation behind the chain;
    /// it is reported as a notice and never downgrades the success alert.
    async fn reconcile_reservation(&self, epoch: u64, identity: &Identity, new_value: i64) -> bool {
        match self
            .reservations
            .decrement_reservation(identity, new_value)
            .await
        {
            Ok(()) => {
                self.store_reservation(epoch, ReservationStatus::allowlisted(new_value))
                    .await;
                true
            }
            Err(err) => {
                warn!(
                    identity = %identity,
                    intended_reserve = new_value,
                    detail = %err.detail,
                    "mint: reservation not updated after confirmed mint"
                );
                self.inner.lock().await.notice = Some(AlertState::from_error(&err, Utc::now()));
                self.emit(ControllerEvent::ReconciliationGap {
                    identity: identity.clone(),
                    intended_reserve: new_value,
                });
                false
            }
        }
    }

    /// Runs after the attempt has fully resolved, whatever the outcome.
    async fn finish_attempt(&self) {
        if let Some((epoch, identity)) = self.current_identity().await {
            self.refresh_balance_for(epoch, &identity).await;
        }

        let attempt = self.inner.lock().await.attempt.take();
        if let Some(attempt) = attempt {
            debug!(
                transaction_id = ?attempt.transaction_id,
                balance_at_start = ?attempt.balance_at_start,
                elapsed_ms = (Utc::now() - attempt.started_at).num_milliseconds(),
                "mint: attempt cleared"
            );
        }
        self.emit(ControllerEvent::MintPhaseChanged(None));

        if let Err(err) = self.refresh_sale_state().await {
            warn!(kind = ?err.kind, detail = %err.detail, "mint: post-attempt sale state refresh failed");
        }
    }

    async fn ui_inputs(&self) -> UiInputs {
        let guard = self.inner.lock().await;
        UiInputs {
            wallet: guard.wallet.as_ref().map(|session| session.identity.clone()),
            balance: guard.balance,
            sale: guard.sale.clone(),
            sold_out_latched: guard.sold_out_latch.is_some(),
            reservation: guard.reservation,
            attempt: guard.attempt.clone(),
            alert: guard.alert.clone(),
            notice: guard.notice.clone(),
            fallback_go_live: self.fallback_go_live,
        }
    }

    pub async fn derived_state(&self, now: DateTime<Utc>) -> DerivedUiState {
        derive_ui_state(&self.ui_inputs().await, now)
    }

    pub async fn view(&self, now: DateTime<Utc>) -> MintView {
        MintView::project(&self.ui_inputs().await, now, self.alert_auto_hide)
    }

    /// Recomputes `is_live` every `period` and refreshes the sale state when
    /// the countdown crosses go-live.
    pub fn spawn_live_ticker(self: &Arc<Self>, period: Duration) -> LiveTicker {
        let controller = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut ticker = interval(period.max(MIN_TICK));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut was_live: Option<bool> = None;
            loop {
                ticker.tick().await;
                let is_live = controller.derived_state(Utc::now()).await.is_live;
                if was_live != Some(is_live) {
                    controller.emit(ControllerEvent::LiveChanged(is_live));
                    if was_live == Some(false) && is_live {
                        info!("sale: go-live reached; refreshing sale state");
                        if let Err(err) = controller.on_countdown_complete().await {
                            warn!(kind = ?err.kind, detail = %err.detail, "sale: go-live refresh failed");
                        }
                    }
                }
                was_live = Some(is_live);
            }
        });
        LiveTicker { task }
    }
}

/// Stops the ticker task when dropped.
pub struct LiveTicker {
    task: JoinHandle<()>,
}

impl Drop for LiveTicker {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
