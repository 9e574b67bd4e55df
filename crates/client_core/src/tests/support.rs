use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use shared::{
    domain::{Identity, Lamports, ProgramId, TransactionId, LAMPORTS_PER_SOL},
    error::MintError,
};
use tokio::sync::Notify;

use crate::{
    ledger::{
        Commitment, LedgerConnection, LedgerFault, MintRequest, ProgramHandle, RawSaleAccount,
        SignatureStatus,
    },
    reservation::{ReservationService, ReservationStatus},
    wallet::{WalletSession, WalletSigner},
};

pub(crate) const PAST_GO_LIVE: i64 = 1_600_000_000;
pub(crate) const MINT_PRICE: u64 = LAMPORTS_PER_SOL;
pub(crate) const TX_FEE: u64 = 5_000;

#[derive(Debug, Clone)]
pub(crate) enum FakeConfirmation {
    /// Confirmed on the nth answered status poll.
    AfterPolls(u32),
    Fail(String),
    ProcessedOnly,
    Never,
}

struct FakeLedgerState {
    items_available: u64,
    items_redeemed: u64,
    go_live_unix: Option<i64>,
    balance: u64,
    read_fault: Option<LedgerFault>,
    submit_fault: Option<LedgerFault>,
    drain_on_submit: bool,
    confirmation: FakeConfirmation,
    status_fault_polls: u32,
    answered_polls: u32,
    status_calls: u32,
    reads: u32,
    balance_reads: u32,
    submits: u32,
    submit_gate: Option<Arc<Notify>>,
    next_read_gate: Option<Arc<Notify>>,
    balance_gate: Option<Arc<Notify>>,
}

pub(crate) struct FakeLedger {
    state: Mutex<FakeLedgerState>,
    submitted: Notify,
    read_started: Notify,
}

impl FakeLedger {
    pub(crate) fn new(items_available: u64, items_redeemed: u64) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FakeLedgerState {
                items_available,
                items_redeemed,
                go_live_unix: Some(PAST_GO_LIVE),
                balance: 5 * LAMPORTS_PER_SOL,
                read_fault: None,
                submit_fault: None,
                drain_on_submit: false,
                confirmation: FakeConfirmation::AfterPolls(1),
                status_fault_polls: 0,
                answered_polls: 0,
                status_calls: 0,
                reads: 0,
                balance_reads: 0,
                submits: 0,
                submit_gate: None,
                next_read_gate: None,
                balance_gate: None,
            }),
            submitted: Notify::new(),
            read_started: Notify::new(),
        })
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut FakeLedgerState) -> T) -> T {
        let mut guard = self.state.lock().expect("fake ledger lock");
        f(&mut guard)
    }

    pub(crate) fn set_confirmation(&self, confirmation: FakeConfirmation) {
        self.with_state(|s| s.confirmation = confirmation);
    }

    pub(crate) fn set_status_fault_polls(&self, polls: u32) {
        self.with_state(|s| s.status_fault_polls = polls);
    }

    pub(crate) fn set_go_live(&self, go_live_unix: Option<i64>) {
        self.with_state(|s| s.go_live_unix = go_live_unix);
    }

    pub(crate) fn set_read_fault(&self, fault: Option<LedgerFault>) {
        self.with_state(|s| s.read_fault = fault);
    }

    pub(crate) fn set_submit_fault(&self, fault: Option<LedgerFault>) {
        self.with_state(|s| s.submit_fault = fault);
    }

    /// Another buyer empties the machine just before our transaction lands.
    pub(crate) fn drain_on_submit(&self) {
        self.with_state(|s| s.drain_on_submit = true);
    }

    /// Holds every `send_mint` until the returned notify is signalled.
    pub(crate) fn gate_submissions(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.with_state(|s| s.submit_gate = Some(gate.clone()));
        gate
    }

    pub(crate) fn set_items_redeemed(&self, items_redeemed: u64) {
        self.with_state(|s| s.items_redeemed = items_redeemed);
    }

    /// Holds only the next sale account read, after it has captured the
    /// account contents, until the returned notify is signalled.
    pub(crate) fn gate_next_read(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.with_state(|s| s.next_read_gate = Some(gate.clone()));
        gate
    }

    /// Holds every balance read until the returned notify is signalled.
    pub(crate) fn gate_balance_reads(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.with_state(|s| s.balance_gate = Some(gate.clone()));
        gate
    }

    pub(crate) async fn wait_for_read(&self) {
        self.read_started.notified().await;
    }

    pub(crate) async fn wait_for_submission(&self) {
        self.submitted.notified().await;
    }

    pub(crate) fn submits(&self) -> u32 {
        self.with_state(|s| s.submits)
    }

    pub(crate) fn status_calls(&self) -> u32 {
        self.with_state(|s| s.status_calls)
    }

    pub(crate) fn reads(&self) -> u32 {
        self.with_state(|s| s.reads)
    }

    pub(crate) fn balance_reads(&self) -> u32 {
        self.with_state(|s| s.balance_reads)
    }

    pub(crate) fn balance(&self) -> Lamports {
        Lamports(self.with_state(|s| s.balance))
    }
}

#[async_trait]
impl LedgerConnection for FakeLedger {
    async fn read_sale_account(
        &self,
        program_id: &ProgramId,
    ) -> Result<RawSaleAccount, LedgerFault> {
        let (result, gate) = self.with_state(|s| {
            s.reads += 1;
            let result = match s.read_fault.clone() {
                Some(fault) => Err(fault),
                None => Ok(RawSaleAccount {
                    items_available: s.items_available,
                    items_redeemed: s.items_redeemed,
                    go_live_unix: s.go_live_unix,
                    handle: ProgramHandle {
                        sale_account: program_id.clone(),
                    },
                }),
            };
            (result, s.next_read_gate.take())
        });
        self.read_started.notify_one();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        result
    }

    async fn balance(&self, _identity: &Identity) -> Result<Lamports, LedgerFault> {
        let (balance, gate) = self.with_state(|s| {
            s.balance_reads += 1;
            (Lamports(s.balance), s.balance_gate.clone())
        });
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(balance)
    }

    async fn send_mint(&self, _request: MintRequest<'_>) -> Result<TransactionId, LedgerFault> {
        let (result, gate) = self.with_state(|s| {
            s.submits += 1;
            if s.drain_on_submit {
                s.items_redeemed = s.items_available;
            }
            let result = if let Some(fault) = s.submit_fault.clone() {
                s.balance = s.balance.saturating_sub(TX_FEE);
                Err(fault)
            } else {
                if matches!(s.confirmation, FakeConfirmation::AfterPolls(_)) {
                    s.items_redeemed += 1;
                    s.balance = s.balance.saturating_sub(MINT_PRICE + TX_FEE);
                }
                Ok(TransactionId::new(format!("sig-{}", s.submits)))
            };
            (result, s.submit_gate.clone())
        });
        self.submitted.notify_one();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        result
    }

    async fn signature_status(
        &self,
        _transaction_id: &TransactionId,
    ) -> Result<Option<SignatureStatus>, LedgerFault> {
        self.with_state(|s| {
            s.status_calls += 1;
            if s.status_fault_polls > 0 {
                s.status_fault_polls -= 1;
                return Err(LedgerFault::Unreachable("rpc node busy".into()));
            }
            s.answered_polls += 1;
            Ok(match &s.confirmation {
                FakeConfirmation::AfterPolls(n) if s.answered_polls >= *n => Some(SignatureStatus {
                    confirmation: Commitment::Confirmed,
                    err: None,
                }),
                FakeConfirmation::AfterPolls(_) | FakeConfirmation::Never => None,
                FakeConfirmation::ProcessedOnly => Some(SignatureStatus {
                    confirmation: Commitment::Processed,
                    err: None,
                }),
                FakeConfirmation::Fail(detail) => Some(SignatureStatus {
                    confirmation: Commitment::Confirmed,
                    err: Some(detail.clone()),
                }),
            })
        })
    }
}

struct FakeReservationState {
    status: Result<ReservationStatus, MintError>,
    decrement_error: Option<MintError>,
    decrements: Vec<(Identity, i64)>,
    checks: u32,
    check_gate: Option<Arc<Notify>>,
}

pub(crate) struct FakeReservations {
    state: Mutex<FakeReservationState>,
    check_started: Notify,
}

impl FakeReservations {
    pub(crate) fn allowlisted(reserve: i64) -> Arc<Self> {
        Self::with_status(Ok(ReservationStatus::allowlisted(reserve)))
    }

    pub(crate) fn not_listed() -> Arc<Self> {
        Self::with_status(Ok(ReservationStatus::not_listed()))
    }

    pub(crate) fn with_status(status: Result<ReservationStatus, MintError>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FakeReservationState {
                status,
                decrement_error: None,
                decrements: Vec::new(),
                checks: 0,
                check_gate: None,
            }),
            check_started: Notify::new(),
        })
    }

    pub(crate) fn fail_decrements(&self, err: MintError) {
        self.state.lock().expect("lock").decrement_error = Some(err);
    }

    /// Holds every eligibility check until the returned notify is signalled.
    pub(crate) fn gate_checks(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.state.lock().expect("lock").check_gate = Some(gate.clone());
        gate
    }

    pub(crate) async fn wait_for_check(&self) {
        self.check_started.notified().await;
    }

    pub(crate) fn decrements(&self) -> Vec<(Identity, i64)> {
        self.state.lock().expect("lock").decrements.clone()
    }

    pub(crate) fn checks(&self) -> u32 {
        self.state.lock().expect("lock").checks
    }
}

#[async_trait]
impl ReservationService for FakeReservations {
    async fn check_eligibility(&self, _identity: &Identity) -> Result<ReservationStatus, MintError> {
        let (status, gate) = {
            let mut guard = self.state.lock().expect("lock");
            guard.checks += 1;
            (guard.status.clone(), guard.check_gate.clone())
        };
        self.check_started.notify_one();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        status
    }

    async fn decrement_reservation(&self, identity: &Identity, new_value: i64) -> Result<(), MintError> {
        let mut guard = self.state.lock().expect("lock");
        guard.decrements.push((identity.clone(), new_value));
        if let Some(err) = guard.decrement_error.clone() {
            return Err(err);
        }
        if let Ok(status) = guard.status.as_mut() {
            status.remaining_reserve = new_value;
        }
        Ok(())
    }
}

pub(crate) struct NoopSigner;

#[async_trait]
impl WalletSigner for NoopSigner {
    async fn sign_transaction(&self, message: Vec<u8>) -> Result<Vec<u8>> {
        Ok(message)
    }
}

pub(crate) fn wallet(identity: &str) -> WalletSession {
    WalletSession::new(Identity::new(identity), Arc::new(NoopSigner))
}
