//! Allow-list (reservation) service client.
//!
//! `GET /whitelisted/member/{identity}` answers 200 `{reserve}` for listed
//! identities and 404 otherwise. `PUT /whitelisted/update/{identity}/{token}`
//! stores a new reserve value. No retries: each call is a single attempt.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use shared::{
    domain::Identity,
    error::{MintError, MintErrorKind},
    protocol::ReserveBody,
};
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservationStatus {
    pub is_allowlisted: bool,
    pub remaining_reserve: i64,
}

impl ReservationStatus {
    pub fn allowlisted(remaining_reserve: i64) -> Self {
        Self {
            is_allowlisted: true,
            remaining_reserve,
        }
    }

    pub fn not_listed() -> Self {
        Self {
            is_allowlisted: false,
            remaining_reserve: 0,
        }
    }

    pub fn can_reserve(&self) -> bool {
        self.is_allowlisted && self.remaining_reserve > 0
    }
}

#[async_trait]
pub trait ReservationService: Send + Sync {
    async fn check_eligibility(&self, identity: &Identity) -> Result<ReservationStatus, MintError>;
    async fn decrement_reservation(&self, identity: &Identity, new_value: i64) -> Result<(), MintError>;
}

pub struct HttpReservationClient {
    http: Client,
    base_url: Url,
    auth_token: String,
}

impl HttpReservationClient {
    pub fn new(base_url: &str, auth_token: impl Into<String>) -> anyhow::Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("invalid allow-list base url '{base_url}'"))?;
        if base_url.cannot_be_a_base() {
            return Err(anyhow!("allow-list base url '{base_url}' cannot carry a path"));
        }
        Ok(Self {
            http: Client::new(),
            base_url,
            auth_token: auth_token.into(),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

#[async_trait]
impl ReservationService for HttpReservationClient {
    async fn check_eligibility(&self, identity: &Identity) -> Result<ReservationStatus, MintError> {
        let url = self.endpoint(&["whitelisted", "member", identity.as_str()]);
        let unavailable = |detail: String| MintError::new(MintErrorKind::AllowlistUnavailable, detail);

        let res = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| unavailable(e.without_url().to_string()))?;

        if res.status() == StatusCode::NOT_FOUND {
            info!(identity = %identity, "allowlist: identity not listed");
            return Ok(ReservationStatus::not_listed());
        }

        let res = res.error_for_status().map_err(|e| {
            warn!(identity = %identity, status = ?e.status(), "allowlist: eligibility check failed");
            unavailable(e.without_url().to_string())
        })?;

        let body: ReserveBody = res
            .json()
            .await
            .map_err(|e| unavailable(format!("invalid member payload: {}", e.without_url())))?;

        debug!(identity = %identity, reserve = body.reserve, "allowlist: member found");
        Ok(ReservationStatus::allowlisted(body.reserve))
    }

    async fn decrement_reservation(&self, identity: &Identity, new_value: i64) -> Result<(), MintError> {
        // The token is a path segment; keep the url out of logs and errors.
        let url = self.endpoint(&[
            "whitelisted",
            "update",
            identity.as_str(),
            self.auth_token.as_str(),
        ]);
        let failed = |detail: String| MintError::new(MintErrorKind::ReservationUpdateFailed, detail);

        self.http
            .put(url)
            .json(&ReserveBody { reserve: new_value })
            .send()
            .await
            .map_err(|e| failed(e.without_url().to_string()))?
            .error_for_status()
            .map_err(|e| failed(e.without_url().to_string()))?;

        info!(identity = %identity, reserve = new_value, "allowlist: reservation updated");
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/reservation_tests.rs"]
mod tests;
