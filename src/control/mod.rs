//! Control plane - owned instance registry and command dispatch
//!
//! One `ControlPlane` owns the mapping from server name to live
//! `Instance` for a single base directory. There are no process-wide
//! singletons: construct it, `scan()` it, and feed it commands.

mod command;

pub use command::{Command, CommandRequest, Receipt};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value as Json;
use tracing::{info, warn};

use crate::core::{Instance, Result};

/// One framed console output line from a supervised process
#[derive(Debug, Clone, Serialize)]
pub struct ConsoleLine {
    pub server_name: String,
    pub msg: String,
}

/// Registry of managed instances plus the command dispatcher
pub struct ControlPlane {
    base: PathBuf,
    instances: HashMap<String, Arc<Instance>>,
    console_tx: Sender<ConsoleLine>,
}

impl ControlPlane {
    pub fn new(base: PathBuf, console_tx: Sender<ConsoleLine>) -> Self {
        Self {
            base,
            instances: HashMap::new(),
            console_tx,
        }
    }

    pub fn base(&self) -> &PathBuf {
        &self.base
    }

    /// Register every server directory already present under
    /// `<base>/servers/`, returning how many were registered
    pub fn scan(&mut self) -> Result<usize> {
        let servers = self.base.join("servers");
        if !servers.is_dir() {
            return Ok(0);
        }
        let mut registered = 0;
        for entry in std::fs::read_dir(&servers)? {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                warn!("Skipping server directory with non-UTF-8 name: {:?}", name);
                continue;
            };
            match self.register(name) {
                Ok(_) => registered += 1,
                Err(e) => warn!("Skipping server directory `{}`: {}", name, e),
            }
        }
        Ok(registered)
    }

    /// The instance registered under `name`, registering it on first
    /// use as the original worker does
    pub fn instance(&mut self, name: &str) -> Result<Arc<Instance>> {
        if let Some(instance) = self.instances.get(name) {
            return Ok(Arc::clone(instance));
        }
        self.register(name)
    }

    pub fn instance_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.instances.keys().cloned().collect();
        names.sort();
        names
    }

    fn register(&mut self, name: &str) -> Result<Arc<Instance>> {
        let instance = Arc::new(Instance::new(name, &self.base)?);

        // Per-instance relay: blocking pops off the console FIFO,
        // forwarded to whoever owns the event channel
        let relay = Arc::clone(&instance);
        let tx = self.console_tx.clone();
        let server_name = name.to_string();
        std::thread::spawn(move || {
            while let Ok(msg) = relay.next_console_line() {
                let line = ConsoleLine {
                    server_name: server_name.clone(),
                    msg,
                };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });

        info!("Finished setting up server instance: `{}`", name);
        self.instances.insert(name.to_string(), Arc::clone(&instance));
        Ok(instance)
    }

    /// Execute one request and describe the outcome as a receipt
    pub fn dispatch(&mut self, request: &CommandRequest) -> Receipt {
        match self.execute(request) {
            Ok(retval) => Receipt::success(request, retval),
            Err(e) => {
                warn!(
                    "Command {} for server `{}` failed: {}",
                    request.cmd, request.server_name, e
                );
                Receipt::failure(request, &e)
            }
        }
    }

    fn execute(&mut self, request: &CommandRequest) -> Result<Json> {
        let command = Command::parse(&request.cmd, request.params.clone())?;
        let instance = self.instance(&request.server_name)?;
        match command {
            Command::Create { server_type } => {
                instance.create(&server_type)?;
                Ok(Json::Bool(true))
            }
            Command::Start => {
                let pid = instance.start()?;
                Ok(Json::from(pid))
            }
            Command::Console { text } => {
                instance.console(&text)?;
                Ok(Json::Bool(true))
            }
            Command::Delete => {
                instance.delete()?;
                self.instances.remove(&request.server_name);
                Ok(Json::Bool(true))
            }
            Command::ModifyConfig {
                key,
                value,
                section,
            } => {
                instance.modify_config(&key, value, &section)?;
                Ok(Json::Bool(true))
            }
            Command::ModifyProperties { key, value } => {
                instance.modify_properties(&key, value)?;
                Ok(Json::Bool(true))
            }
            Command::Archive => {
                let filename = instance.archive()?;
                Ok(Json::String(filename))
            }
            Command::RestoreInto { archive_path } => {
                instance.restore_from_archive(&archive_path)?;
                Ok(Json::Bool(true))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use tempfile::tempdir;

    fn request(server_name: &str, cmd: &str, params: serde_json::Value) -> CommandRequest {
        let mut body = serde_json::json!({"server_name": server_name, "cmd": cmd});
        if let (Some(body), Some(params)) = (body.as_object_mut(), params.as_object()) {
            for (k, v) in params {
                body.insert(k.clone(), v.clone());
            }
        }
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn dispatch_creates_and_configures_a_server() {
        let dir = tempdir().unwrap();
        let (tx, _rx) = mpsc::channel();
        let mut plane = ControlPlane::new(dir.path().to_path_buf(), tx);

        let receipt = plane.dispatch(&request(
            "test",
            "create",
            serde_json::json!({"server_type": "conventional_jar"}),
        ));
        assert!(receipt.success);
        assert!(dir.path().join("servers").join("test").is_dir());

        let receipt = plane.dispatch(&request(
            "test",
            "modify_config",
            serde_json::json!({"key": "java_xmx", "value": 256, "section": "java"}),
        ));
        assert!(receipt.success);

        let instance = plane.instance("test").unwrap();
        let config = instance.config().read().unwrap();
        assert_eq!(config["java"]["java_xmx"], crate::core::Value::Int(256));
    }

    #[test]
    fn dispatch_surfaces_exact_error_text() {
        let dir = tempdir().unwrap();
        let (tx, _rx) = mpsc::channel();
        let mut plane = ControlPlane::new(dir.path().to_path_buf(), tx);

        plane.dispatch(&request(
            "test",
            "create",
            serde_json::json!({"server_type": "conventional_jar"}),
        ));
        let receipt = plane.dispatch(&request("test", "start", serde_json::json!({})));
        assert!(!receipt.success);
        assert_eq!(receipt.error.as_deref(), Some("no runnable jarfile selected"));

        let receipt = plane.dispatch(&request("test", "frobnicate", serde_json::json!({})));
        assert!(!receipt.success);
        assert_eq!(
            receipt.error.as_deref(),
            Some("unsupported operation: frobnicate")
        );
    }

    #[test]
    fn delete_forgets_the_instance() {
        let dir = tempdir().unwrap();
        let (tx, _rx) = mpsc::channel();
        let mut plane = ControlPlane::new(dir.path().to_path_buf(), tx);

        plane.dispatch(&request(
            "test",
            "create",
            serde_json::json!({"server_type": "phar"}),
        ));
        assert_eq!(plane.instance_names(), vec!["test".to_string()]);

        let receipt = plane.dispatch(&request("test", "delete", serde_json::json!({})));
        assert!(receipt.success);
        assert!(plane.instance_names().is_empty());
    }

    #[test]
    fn scan_registers_existing_server_directories() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("servers").join("alpha")).unwrap();
        std::fs::create_dir_all(dir.path().join("servers").join("beta")).unwrap();

        let (tx, _rx) = mpsc::channel();
        let mut plane = ControlPlane::new(dir.path().to_path_buf(), tx);
        assert_eq!(plane.scan().unwrap(), 2);
        assert_eq!(
            plane.instance_names(),
            vec!["alpha".to_string(), "beta".to_string()]
        );
    }
}
