use serde::{Deserialize, Serialize};

/// Body of `GET /whitelisted/member/{identity}` and `PUT /whitelisted/update/...`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveBody {
    pub reserve: i64,
}
