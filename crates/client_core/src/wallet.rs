use std::{fmt, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use shared::domain::Identity;

/// Signing capability handed over by the wallet adapter once the user connects.
#[async_trait]
pub trait WalletSigner: Send + Sync {
    async fn sign_transaction(&self, message: Vec<u8>) -> Result<Vec<u8>>;
}

#[derive(Clone)]
pub struct WalletSession {
    pub identity: Identity,
    pub signer: Arc<dyn WalletSigner>,
}

impl WalletSession {
    pub fn new(identity: Identity, signer: Arc<dyn WalletSigner>) -> Self {
        Self { identity, signer }
    }
}

impl fmt::Debug for WalletSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletSession")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}
