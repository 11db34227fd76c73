use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Authenticated actor resolved by the external identity provider before any
/// core operation runs. Corral never authenticates, only authorizes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Principal {
    pub id: Uuid,
    pub email: String,
}

impl Principal {
    pub fn new(id: Uuid, email: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
        }
    }
}
