//! Command table - the typed verbs the control plane accepts
//!
//! Every wire command names a server and a verb; parameters are
//! declared per-verb and validated before anything touches an
//! instance. Unknown verbs are rejected outright - there is no
//! dispatch-by-name fallback.

use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use uuid::Uuid;

use crate::core::{Error, Result, Value};

/// A raw request as received off the wire
#[derive(Debug, Clone, Deserialize)]
pub struct CommandRequest {
    pub server_name: String,
    pub cmd: String,
    /// Correlation id, echoed back in the receipt
    #[serde(default)]
    pub id: Option<String>,
    /// Verb-specific parameters, validated by `Command::parse`
    #[serde(flatten)]
    pub params: serde_json::Map<String, Json>,
}

#[derive(Debug, Deserialize)]
struct CreateParams {
    server_type: String,
}

#[derive(Debug, Deserialize)]
struct ConsoleParams {
    text: String,
}

#[derive(Debug, Deserialize)]
struct ModifyConfigParams {
    key: String,
    value: Value,
    section: String,
}

#[derive(Debug, Deserialize)]
struct ModifyPropertiesParams {
    key: String,
    value: Value,
}

#[derive(Debug, Deserialize)]
struct RestoreIntoParams {
    archive_path: PathBuf,
}

/// A parsed, typed command ready for execution
#[derive(Debug)]
pub enum Command {
    Create { server_type: String },
    Start,
    Console { text: String },
    Delete,
    ModifyConfig { key: String, value: Value, section: String },
    ModifyProperties { key: String, value: Value },
    Archive,
    RestoreInto { archive_path: PathBuf },
}

fn typed<T: DeserializeOwned>(cmd: &str, params: serde_json::Map<String, Json>) -> Result<T> {
    serde_json::from_value(Json::Object(params))
        .map_err(|e| Error::validation(format!("invalid parameters for {}: {}", cmd, e)))
}

impl Command {
    /// Parse a verb and its parameters against the registered table
    pub fn parse(cmd: &str, params: serde_json::Map<String, Json>) -> Result<Self> {
        match cmd {
            "create" => {
                let p: CreateParams = typed(cmd, params)?;
                Ok(Self::Create {
                    server_type: p.server_type,
                })
            }
            "start" => Ok(Self::Start),
            "console" => {
                let p: ConsoleParams = typed(cmd, params)?;
                Ok(Self::Console { text: p.text })
            }
            "delete" => Ok(Self::Delete),
            "modify_config" => {
                let p: ModifyConfigParams = typed(cmd, params)?;
                Ok(Self::ModifyConfig {
                    key: p.key,
                    value: p.value,
                    section: p.section,
                })
            }
            "modify_properties" => {
                let p: ModifyPropertiesParams = typed(cmd, params)?;
                Ok(Self::ModifyProperties {
                    key: p.key,
                    value: p.value,
                })
            }
            "archive" => Ok(Self::Archive),
            "restore_into" => {
                let p: RestoreIntoParams = typed(cmd, params)?;
                Ok(Self::RestoreInto {
                    archive_path: p.archive_path,
                })
            }
            other => Err(Error::not_supported(format!(
                "unsupported operation: {}",
                other
            ))),
        }
    }
}

/// The outcome of one dispatched command
#[derive(Debug, Serialize)]
pub struct Receipt {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    pub server_name: String,
    pub cmd: String,
    pub success: bool,
    pub retval: Json,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Receipt {
    pub fn success(request: &CommandRequest, retval: Json) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            correlation_id: request.id.clone(),
            server_name: request.server_name.clone(),
            cmd: request.cmd.clone(),
            success: true,
            retval,
            error: None,
        }
    }

    pub fn failure(request: &CommandRequest, error: &Error) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            correlation_id: request.id.clone(),
            server_name: request.server_name.clone(),
            cmd: request.cmd.clone(),
            success: false,
            retval: Json::Null,
            error: Some(error.to_string()),
        }
    }
}
