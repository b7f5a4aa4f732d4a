//! Start-argument construction - derive a process argv from a server config
//!
//! Pure derivation: no filesystem access, no process state. Every
//! failure message here is matched verbatim by control-plane consumers.

use super::config::{ServerConfig, Value};
use super::error::{Error, Result};

/// Base executable for the jar server types
pub const JAVA_BIN: &str = "/usr/bin/java";

/// Base executable for the phar server type
pub const PHP_BIN: &str = "/usr/bin/php";

/// An optional heap size: 0 and absent both mean unset
#[derive(Debug, Clone, Copy, PartialEq)]
enum Heap {
    Unset,
    Set(i64),
}

fn lookup<'a>(config: &'a ServerConfig, section: &str, key: &str) -> Option<&'a Value> {
    config.get(section).and_then(|s| s.get(key))
}

fn non_empty(config: &ServerConfig, section: &str, key: &str) -> Option<String> {
    lookup(config, section, key).and_then(Value::as_non_empty_str)
}

/// Xmx for `conventional_jar`: required, and a positive integer
fn required_xmx(config: &ServerConfig) -> Result<i64> {
    let value = lookup(config, "java", "java_xmx")
        .ok_or_else(|| Error::validation("missing java argument: Xmx"))?;
    match value.as_int() {
        Some(n) if n > 0 => Ok(n),
        _ => Err(Error::validation(
            "invalid java argument: Xmx must be an integer > 0",
        )),
    }
}

/// Xms for `conventional_jar`: optional, 0 treated as unset
fn optional_xms(config: &ServerConfig) -> Result<Heap> {
    let Some(value) = lookup(config, "java", "java_xms") else {
        return Ok(Heap::Unset);
    };
    match value.as_int() {
        Some(0) => Ok(Heap::Unset),
        Some(n) if n > 0 => Ok(Heap::Set(n)),
        _ => Err(Error::validation(
            "invalid java argument: Xms must be unset or an integer > 0",
        )),
    }
}

/// Optional heap for `unconventional_jar`, where a numeric
/// non-positive and a non-numeric value report differently
fn optional_heap(config: &ServerConfig, key: &str, label: &str) -> Result<Heap> {
    let Some(value) = lookup(config, "java", key) else {
        return Ok(Heap::Unset);
    };
    match value.as_int() {
        Some(0) => Ok(Heap::Unset),
        Some(n) if n > 0 => Ok(Heap::Set(n)),
        Some(_) => Err(Error::validation(format!(
            "invalid java argument: {} must be unset or > 0",
            label
        ))),
        None => Err(Error::validation(format!(
            "invalid java argument: {} must be unset or an integer > 0",
            label
        ))),
    }
}

fn conventional_jar(config: &ServerConfig) -> Result<Vec<String>> {
    let jarfile = non_empty(config, "java", "jarfile")
        .ok_or_else(|| Error::validation("no runnable jarfile selected"))?;
    let xmx = required_xmx(config)?;
    let xms = match optional_xms(config)? {
        Heap::Set(n) => n,
        Heap::Unset => xmx,
    };
    if xms > xmx {
        return Err(Error::validation("invalid java argument: Xmx must be > Xms"));
    }

    let mut args = vec![
        JAVA_BIN.to_string(),
        "-server".to_string(),
        format!("-Xmx{}M", xmx),
        format!("-Xms{}M", xms),
    ];
    if let Some(tweaks) = non_empty(config, "java", "java_tweaks") {
        args.push(tweaks);
    }
    args.push("-jar".to_string());
    args.push(jarfile);
    args.push(non_empty(config, "java", "jar_args").unwrap_or_else(|| "nogui".to_string()));
    Ok(args)
}

fn unconventional_jar(config: &ServerConfig) -> Result<Vec<String>> {
    let jarfile = non_empty(config, "java", "jarfile")
        .ok_or_else(|| Error::validation("no runnable jarfile selected"))?;
    let xmx = optional_heap(config, "java_xmx", "Xmx")?;
    let xms = optional_heap(config, "java_xms", "Xms")?;

    if let (Heap::Set(_), Heap::Unset) = (xms, xmx) {
        return Err(Error::validation(
            "invalid java argument: Xms may not be set without Xmx",
        ));
    }
    if let (Heap::Set(min), Heap::Set(max)) = (xms, xmx) {
        if min > max {
            return Err(Error::validation(
                "invalid java argument: Xmx may not be lower than Xms",
            ));
        }
    }

    let mut args = vec![JAVA_BIN.to_string(), "-server".to_string()];
    if let Heap::Set(n) = xmx {
        args.push(format!("-Xmx{}M", n));
    }
    if let Heap::Set(n) = xms {
        args.push(format!("-Xms{}M", n));
    }
    if let Some(tweaks) = non_empty(config, "java", "java_tweaks") {
        args.push(tweaks);
    }
    args.push("-jar".to_string());
    args.push(jarfile);
    if let Some(jar_args) = non_empty(config, "java", "jar_args") {
        args.push(jar_args);
    }
    Ok(args)
}

fn phar(config: &ServerConfig) -> Result<Vec<String>> {
    // [nonjava] executable wins; [java] jarfile is the backward-compat
    // fallback used by older front ends
    let file = non_empty(config, "nonjava", "executable")
        .or_else(|| non_empty(config, "java", "jarfile"))
        .ok_or_else(|| Error::validation("no runnable pharfile selected"))?;
    Ok(vec![PHP_BIN.to_string(), file])
}

/// Derive the full argv for a server type token, or a descriptive
/// validation failure
pub fn build(server_type: &str, config: &ServerConfig) -> Result<Vec<String>> {
    match server_type {
        "conventional_jar" => conventional_jar(config),
        "unconventional_jar" => unconventional_jar(config),
        "phar" => phar(config),
        other => Err(Error::not_supported(format!(
            "unrecognized start_args argument: {}",
            other
        ))),
    }
}
