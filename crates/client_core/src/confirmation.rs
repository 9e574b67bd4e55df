use std::{sync::Arc, time::Duration};

use shared::{
    domain::TransactionId,
    error::{MintError, MintErrorKind},
};
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::ledger::{Commitment, LedgerConnection};

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    Confirmed,
    Failed(String),
}

pub struct ConfirmationWatcher {
    connection: Arc<dyn LedgerConnection>,
    poll_interval: Duration,
    commitment: Commitment,
}

impl ConfirmationWatcher {
    pub fn new(connection: Arc<dyn LedgerConnection>, poll_interval: Duration) -> Self {
        Self {
            connection,
            poll_interval: poll_interval.max(MIN_POLL_INTERVAL),
            commitment: Commitment::Confirmed,
        }
    }

    pub fn with_commitment(mut self, commitment: Commitment) -> Self {
        self.commitment = commitment;
        self
    }

    /// Polls until the transaction reaches the watcher's commitment level or
    /// fails. The poll loop is dropped with the timeout future, so nothing
    /// keeps querying the ledger after this returns.
    pub async fn await_confirmation(
        &self,
        transaction_id: &TransactionId,
        timeout_after: Duration,
    ) -> Result<ConfirmationOutcome, MintError> {
        let polling = async {
            let mut ticker = interval(self.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut attempt: u32 = 0;
            loop {
                ticker.tick().await;
                attempt += 1;
                match self.connection.signature_status(transaction_id).await {
                    Ok(Some(status)) => {
                        if let Some(err) = status.err {
                            return ConfirmationOutcome::Failed(err);
                        }
                        if status.confirmation >= self.commitment {
                            return ConfirmationOutcome::Confirmed;
                        }
                        debug!(
                            transaction_id = %transaction_id,
                            attempt,
                            level = ?status.confirmation,
                            "confirmation: below target commitment"
                        );
                    }
                    Ok(None) => {
                        debug!(transaction_id = %transaction_id, attempt, "confirmation: not seen yet");
                    }
                    Err(fault) => {
                        warn!(transaction_id = %transaction_id, attempt, %fault, "confirmation: status read failed");
                    }
                }
            }
        };

        match timeout(timeout_after, polling).await {
            Ok(outcome) => {
                info!(transaction_id = %transaction_id, ?outcome, "confirmation: terminal status");
                Ok(outcome)
            }
            Err(_) => {
                warn!(
                    transaction_id = %transaction_id,
                    timeout_ms = timeout_after.as_millis() as u64,
                    "confirmation: timed out"
                );
                Err(MintError::new(
                    MintErrorKind::ConfirmationTimeout,
                    format!(
                        "transaction {transaction_id} not confirmed within {}ms",
                        timeout_after.as_millis()
                    ),
                ))
            }
        }
    }
}
