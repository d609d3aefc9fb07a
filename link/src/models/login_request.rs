use serde::{Deserialize, Serialize};

/// Body of `POST {base}/token/`
#[derive(Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}
