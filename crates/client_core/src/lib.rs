//! Client-side mint orchestration for a candy-machine style NFT sale.

pub mod alert;
pub mod config;
pub mod confirmation;
pub mod controller;
pub mod ledger;
pub mod reservation;
pub mod sale_state;
pub mod submitter;
pub mod ui_state;
pub mod wallet;

pub use alert::AlertState;
pub use config::{load_settings, Settings};
pub use confirmation::{ConfirmationOutcome, ConfirmationWatcher};
pub use controller::{ControllerEvent, LiveTicker, MintController, MintOutcome};
pub use ledger::{Commitment, LedgerConnection, LedgerFault, ProgramHandle};
pub use reservation::{HttpReservationClient, ReservationService, ReservationStatus};
pub use sale_state::{SaleSnapshot, SaleStateReader};
pub use submitter::TransactionSubmitter;
pub use ui_state::{DerivedUiState, MintButton, MintView};
pub use wallet::{WalletSession, WalletSigner};

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;
