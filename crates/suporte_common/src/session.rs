//! Who is using the assistant.
//!
//! Identity only gates presentation (greeting, audit lines in logs); no
//! engine operation checks it. A dev session bypasses directory lookup
//! entirely for local testing.

use serde::{Deserialize, Serialize};
use tracing::info;

/// The active user session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Account name, e.g. "maria.souza"
    pub username: String,
    /// Name shown in greetings
    pub display_name: String,
    authenticated: bool,
}

impl Session {
    /// Session for an authenticated directory user.
    pub fn authenticated(username: impl Into<String>, display_name: impl Into<String>) -> Self {
        let session = Self {
            username: username.into(),
            display_name: display_name.into(),
            authenticated: true,
        };
        info!("Session started for {}", session.username);
        session
    }

    /// Local development session, no directory behind it.
    pub fn dev() -> Self {
        Self {
            username: "dev".to_string(),
            display_name: "Desenvolvedor".to_string(),
            authenticated: true,
        }
    }

    /// Session for a user that has not signed in.
    pub fn anonymous() -> Self {
        Self {
            username: String::new(),
            display_name: "Visitante".to_string(),
            authenticated: false,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }
}
