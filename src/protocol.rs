//! Request/response protocol for UI collaborators.
//!
//! Popups, option pages and form fillers never touch the store or the
//! session cache.  They send one `Command` per request and render the
//! `Response`.  On the wire a command is a JSON object:
//!
//! ```text
//! { "action": "CMD_UNLOCK", "payload": { "password": "..." } }
//! ```
//!
//! Commands without a payload omit the `payload` key.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::manager::VaultManager;
use crate::profile::{Profile, VaultDocument};
use crate::vault::VaultStore;

/// Code returned when a raw message cannot be parsed.
pub const INVALID_COMMAND: &str = "INVALID_COMMAND";

/// A request from a UI surface.
#[derive(Clone, Deserialize)]
#[serde(tag = "action", content = "payload")]
pub enum Command {
    #[serde(rename = "CMD_CHECK_STATUS")]
    CheckStatus,

    #[serde(rename = "CMD_CREATE_VAULT")]
    CreateVault { password: String },

    #[serde(rename = "CMD_UNLOCK")]
    Unlock { password: String },

    #[serde(rename = "CMD_LOCK")]
    Lock,

    #[serde(rename = "CMD_GET_PROFILES")]
    GetProfiles,

    #[serde(rename = "CMD_SAVE_PROFILES")]
    SaveProfiles { profiles: Vec<Profile> },

    #[serde(rename = "CMD_WIPE")]
    Wipe,
}

impl Command {
    /// The wire name of this command.
    pub fn action(&self) -> &'static str {
        match self {
            Self::CheckStatus => "CMD_CHECK_STATUS",
            Self::CreateVault { .. } => "CMD_CREATE_VAULT",
            Self::Unlock { .. } => "CMD_UNLOCK",
            Self::Lock => "CMD_LOCK",
            Self::GetProfiles => "CMD_GET_PROFILES",
            Self::SaveProfiles { .. } => "CMD_SAVE_PROFILES",
            Self::Wipe => "CMD_WIPE",
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateVault { .. } | Self::Unlock { .. } => f
                .debug_struct(self.action())
                .field("password", &"[REDACTED]")
                .finish(),
            Self::SaveProfiles { profiles } => f
                .debug_struct(self.action())
                .field("profiles", &profiles.len())
                .finish(),
            _ => f.write_str(self.action()),
        }
    }
}

/// The reply to a `Command`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Status {
        #[serde(rename = "hasVault")]
        has_vault: bool,
        locked: bool,
    },
    Ack {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Profiles {
        profiles: Vec<Profile>,
    },
    Error {
        error: String,
    },
}

impl Response {
    pub fn ok() -> Self {
        Self::Ack {
            success: true,
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::Ack {
            success: false,
            error: Some(message.into()),
        }
    }

    pub fn error(code: impl Into<String>) -> Self {
        Self::Error { error: code.into() }
    }
}

/// Run one command against `manager`.
///
/// `CreateVault` and `Unlock` report failures as `{success: false,
/// error: <message>}`; the other commands report an error code.
pub async fn handle<S: VaultStore>(manager: &VaultManager<S>, command: Command) -> Response {
    debug!(action = command.action(), "handling command");

    match command {
        Command::CheckStatus => match manager.status().await {
            Ok(status) => Response::Status {
                has_vault: status.has_vault,
                locked: status.locked,
            },
            Err(e) => Response::error(e.code()),
        },

        Command::CreateVault { password } => {
            match manager
                .create_vault(&password, &VaultDocument::default())
                .await
            {
                Ok(()) => Response::ok(),
                Err(e) => Response::failed(e.to_string()),
            }
        }

        Command::Unlock { password } => match manager.unlock(&password).await {
            Ok(()) => Response::ok(),
            Err(e) => Response::failed(e.to_string()),
        },

        Command::Lock => {
            manager.lock().await;
            Response::ok()
        }

        Command::GetProfiles => match manager.profiles().await {
            Ok(profiles) => Response::Profiles { profiles },
            Err(e) => Response::error(e.code()),
        },

        Command::SaveProfiles { profiles } => match manager.save_profiles(profiles).await {
            Ok(()) => Response::ok(),
            Err(e) => Response::error(e.code()),
        },

        Command::Wipe => match manager.wipe().await {
            Ok(()) => Response::ok(),
            Err(e) => Response::error(e.code()),
        },
    }
}

/// Parse a JSON message, run it, and serialize the reply.
pub async fn handle_json<S: VaultStore>(manager: &VaultManager<S>, message: &str) -> String {
    let response = match serde_json::from_str::<Command>(message) {
        Ok(command) => handle(manager, command).await,
        Err(e) => {
            debug!(error = %e, "rejecting unparsable command");
            Response::error(INVALID_COMMAND)
        }
    };

    serde_json::to_string(&response).unwrap_or_else(|_| r#"{"error":"INTERNAL_ERROR"}"#.into())
}
