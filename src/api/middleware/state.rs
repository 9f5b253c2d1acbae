use secrecy::Secret;
use std::sync::Arc;

use crate::registry::RevocationRegistry;

/// Header carrying the shared key for the revocation admin endpoints
pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// Application state shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<RevocationRegistry>,
    pub admin_api_key: Secret<String>,
}
