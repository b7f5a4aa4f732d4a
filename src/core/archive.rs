//! Archive snapshots - capture and restore of a working directory tree
//!
//! Snapshots are gzip-compressed tars rooted at `./` so a restore
//! recreates the tree exactly, wherever it is unpacked.

use std::fs::{self, File};
use std::path::Path;

use chrono::Local;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::info;

use super::error::{Error, Result};

/// Extension used for snapshot files
pub const ARCHIVE_EXT: &str = "tgz";

/// Compress the whole `cwd` tree into a timestamped snapshot under
/// `awd` and return the bare filename
pub fn archive(name: &str, cwd: &Path, awd: &Path) -> Result<String> {
    if !cwd.is_dir() {
        return Err(Error::state("server directory does not exist"));
    }
    fs::create_dir_all(awd)?;

    let filename = format!(
        "{}_{}.{}",
        name,
        Local::now().format("%Y-%m-%d_%H:%M:%S"),
        ARCHIVE_EXT
    );
    let file = File::create(awd.join(&filename))?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    builder.append_dir_all(".", cwd)?;
    builder.into_inner()?.finish()?;

    info!("Archived {} as {}", cwd.display(), filename);
    Ok(filename)
}

/// Unpack a snapshot into `cwd`, recreating whatever files and
/// directories it contained
pub fn restore_into(cwd: &Path, archive_path: &Path) -> Result<()> {
    let file = File::open(archive_path)?;
    tar::Archive::new(GzDecoder::new(file)).unpack(cwd)?;
    info!("Restored {} into {}", archive_path.display(), cwd.display());
    Ok(())
}
