//! Managed instance - identity, on-disk layout, and lifecycle facade
//!
//! An instance is a validated name bound to a base directory. The
//! three derived directories are fixed:
//! `<base>/servers/<name>` (live working directory),
//! `<base>/backup/<name>` and `<base>/archive/<name>`. Everything the
//! control plane does to a server goes through this facade.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::archive;
use super::args;
use super::config::{ConfigStore, PropertiesStore, ServerProperties, Value};
use super::error::{Error, Result};
use super::monitor::MemoryUsage;
use super::process::Supervisor;

/// ConfigStore file inside the working directory
pub const SERVER_CONFIG_FILE: &str = "server.config";

/// PropertiesStore file inside the working directory
pub const SERVER_PROPERTIES_FILE: &str = "server.properties";

/// EULA marker file inside the working directory
pub const EULA_FILE: &str = "eula.txt";

/// The kind of supervised process an instance runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerType {
    ConventionalJar,
    UnconventionalJar,
    Phar,
}

impl ServerType {
    pub fn token(&self) -> &'static str {
        match self {
            Self::ConventionalJar => "conventional_jar",
            Self::UnconventionalJar => "unconventional_jar",
            Self::Phar => "phar",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "conventional_jar" => Some(Self::ConventionalJar),
            "unconventional_jar" => Some(Self::UnconventionalJar),
            "phar" => Some(Self::Phar),
            _ => None,
        }
    }
}

/// A single named server: its directories, configuration stores, and
/// supervised process
#[derive(Debug)]
pub struct Instance {
    name: String,
    cwd: PathBuf,
    bwd: PathBuf,
    awd: PathBuf,
    server_type: RwLock<ServerType>,
    config: ConfigStore,
    properties: PropertiesStore,
    supervisor: Supervisor,
}

impl Instance {
    /// Bind a name to a base directory, validating the name
    pub fn new(name: &str, base: &Path) -> Result<Self> {
        if !name_is_valid(name) {
            return Err(Error::validation(format!("invalid server name: {}", name)));
        }
        let cwd = base.join("servers").join(name);
        let bwd = base.join("backup").join(name);
        let awd = base.join("archive").join(name);
        let config = ConfigStore::new(cwd.join(SERVER_CONFIG_FILE));
        let properties = PropertiesStore::new(cwd.join(SERVER_PROPERTIES_FILE));
        let supervisor = Supervisor::new(cwd.clone());
        Ok(Self {
            name: name.to_string(),
            cwd,
            bwd,
            awd,
            server_type: RwLock::new(ServerType::ConventionalJar),
            config,
            properties,
            supervisor,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn bwd(&self) -> &Path {
        &self.bwd
    }

    pub fn awd(&self) -> &Path {
        &self.awd
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    pub fn properties(&self) -> &PropertiesStore {
        &self.properties
    }

    pub fn server_type(&self) -> Result<ServerType> {
        self.server_type
            .read()
            .map(|t| *t)
            .map_err(|e| Error::Io(std::io::Error::other(format!("lock poisoned: {}", e))))
    }

    /// Create whichever of the three directories are missing
    pub fn create_paths(&self) -> Result<()> {
        for dir in [&self.cwd, &self.bwd, &self.awd] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Remove the three directories; absent ones are skipped
    pub fn delete_paths(&self) -> Result<()> {
        for dir in [&self.cwd, &self.bwd, &self.awd] {
            if dir.exists() {
                fs::remove_dir_all(dir)?;
            }
        }
        Ok(())
    }

    /// Composite creation: paths, server type, and the configuration
    /// files a fresh server of that type starts from
    pub fn create(&self, type_token: &str) -> Result<()> {
        let server_type = ServerType::from_token(type_token).ok_or_else(|| {
            Error::validation(format!("unrecognized server type: {}", type_token))
        })?;
        self.create_paths()?;
        self.config.materialize()?;
        if server_type == ServerType::ConventionalJar {
            self.properties.materialize()?;
        }
        *self
            .server_type
            .write()
            .map_err(|e| Error::Io(std::io::Error::other(format!("lock poisoned: {}", e))))? =
            server_type;
        info!("Created server `{}` as {}", self.name, type_token);
        Ok(())
    }

    /// Remove the server from disk entirely; refused while running
    pub fn delete(&self) -> Result<()> {
        if self.supervisor.pid().is_some() {
            return Err(Error::state("cannot delete a server that is running"));
        }
        self.delete_paths()?;
        info!("Deleted server `{}`", self.name);
        Ok(())
    }

    /// Derive the argv the configured server type would start with
    pub fn start_args(&self, type_token: &str) -> Result<Vec<String>> {
        args::build(type_token, &self.config.read()?)
    }

    /// Spawn the supervised process and return its pid
    pub fn start(&self) -> Result<u32> {
        if self.supervisor.pid().is_some() {
            return Err(Error::state("server is already running"));
        }
        let argv = self.start_args(self.server_type()?.token())?;
        self.supervisor.spawn(&argv)
    }

    /// Liveness-probed pid of the supervised process
    pub fn pid(&self) -> Option<u32> {
        self.supervisor.pid()
    }

    /// Send one line to the supervised process's stdin
    pub fn console(&self, text: &str) -> Result<()> {
        self.supervisor.console(text)
    }

    /// Blocking pop of the next console output line
    pub fn next_console_line(&self) -> Result<String> {
        self.supervisor.next_console_line()
    }

    /// Resident memory of the supervised process
    pub fn memory(&self) -> MemoryUsage {
        self.supervisor.memory()
    }

    /// Whether the EULA marker inside the working directory reads true
    pub fn eula(&self) -> Result<bool> {
        let path = self.cwd.join(EULA_FILE);
        if !path.exists() {
            return Ok(false);
        }
        let text = fs::read_to_string(&path)?;
        Ok(text
            .lines()
            .filter_map(|line| line.split_once('='))
            .any(|(key, value)| key.trim() == "eula" && value.trim() == "true"))
    }

    /// Rewrite the EULA marker to accepted
    pub fn accept_eula(&self) -> Result<()> {
        fs::write(self.cwd.join(EULA_FILE), "eula=true\n")?;
        info!("Accepted EULA for `{}`", self.name);
        Ok(())
    }

    pub fn modify_config(&self, key: &str, value: Value, section: &str) -> Result<()> {
        self.config.upsert(key, value, section)
    }

    pub fn modify_properties(&self, key: &str, value: Value) -> Result<()> {
        self.properties.upsert(key, value)
    }

    pub fn overlay_properties(&self, pairs: &ServerProperties) -> Result<()> {
        self.properties.overlay(pairs)
    }

    /// Snapshot the working directory; returns the bare archive
    /// filename under the archive directory
    pub fn archive(&self) -> Result<String> {
        archive::archive(&self.name, &self.cwd, &self.awd)
    }

    /// Unpack a snapshot into this instance's working directory,
    /// refusing to clobber an already-configured server
    pub fn restore_from_archive(&self, archive_path: &Path) -> Result<()> {
        if self.config.path().exists() {
            return Err(Error::state(
                "cannot restore into an already-configured server",
            ));
        }
        self.create_paths()?;
        archive::restore_into(&self.cwd, archive_path)
    }
}

fn name_is_valid(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '.' | '-'))
}
