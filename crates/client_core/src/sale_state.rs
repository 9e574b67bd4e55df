use std::sync::Arc;

use chrono::{DateTime, Utc};
use shared::{
    domain::ProgramId,
    error::{MintError, MintErrorKind},
};
use tracing::{debug, warn};

use crate::ledger::{LedgerConnection, LedgerFault, ProgramHandle, RawSaleAccount};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaleSnapshot {
    pub items_available: u64,
    pub items_redeemed: u64,
    pub items_remaining: u64,
    pub go_live_at: DateTime<Utc>,
    pub program: ProgramHandle,
}

impl SaleSnapshot {
    pub fn from_account(account: RawSaleAccount) -> Result<Self, MintError> {
        let items_remaining = account
            .items_available
            .checked_sub(account.items_redeemed)
            .ok_or_else(|| {
                MintError::new(
                    MintErrorKind::MalformedAccountData,
                    format!(
                        "redeemed count {} exceeds available supply {}",
                        account.items_redeemed, account.items_available
                    ),
                )
            })?;

        let go_live_at = match account.go_live_unix {
            Some(secs) => DateTime::<Utc>::from_timestamp(secs, 0).ok_or_else(|| {
                MintError::new(
                    MintErrorKind::MalformedAccountData,
                    format!("go-live timestamp {secs} out of range"),
                )
            })?,
            // An unscheduled sale never goes live for a public minter.
            None => DateTime::<Utc>::MAX_UTC,
        };

        Ok(Self {
            items_available: account.items_available,
            items_redeemed: account.items_redeemed,
            items_remaining,
            go_live_at,
            program: account.handle,
        })
    }

    pub fn is_sold_out(&self) -> bool {
        self.items_remaining == 0
    }

    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.go_live_at
    }
}

pub struct SaleStateReader {
    connection: Arc<dyn LedgerConnection>,
    program_id: ProgramId,
}

impl SaleStateReader {
    pub fn new(connection: Arc<dyn LedgerConnection>, program_id: ProgramId) -> Self {
        Self {
            connection,
            program_id,
        }
    }

    pub fn program_id(&self) -> &ProgramId {
        &self.program_id
    }

    pub async fn fetch_sale_state(&self) -> Result<SaleSnapshot, MintError> {
        let account = self
            .connection
            .read_sale_account(&self.program_id)
            .await
            .map_err(|fault| {
                warn!(program_id = %self.program_id, %fault, "sale state: read failed");
                map_read_fault(fault)
            })?;

        let snapshot = SaleSnapshot::from_account(account)?;
        debug!(
            program_id = %self.program_id,
            available = snapshot.items_available,
            redeemed = snapshot.items_redeemed,
            remaining = snapshot.items_remaining,
            go_live_at = %snapshot.go_live_at,
            "sale state: snapshot read"
        );
        Ok(snapshot)
    }
}

fn map_read_fault(fault: LedgerFault) -> MintError {
    match fault {
        LedgerFault::Decode(detail) => MintError::new(MintErrorKind::MalformedAccountData, detail),
        other => MintError::new(MintErrorKind::LedgerUnavailable, other.to_string()),
    }
}
