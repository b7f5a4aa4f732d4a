//! Process-table probes - liveness and memory accounting via sysinfo

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// Resident memory of a supervised process, in the units the control
/// plane reports
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize)]
pub struct MemoryUsage {
    pub kb: f64,
    pub mb: f64,
    pub gb: f64,
}

impl MemoryUsage {
    pub fn from_bytes(bytes: u64) -> Self {
        let kb = bytes as f64 / 1024.0;
        Self {
            kb,
            mb: kb / 1024.0,
            gb: kb / 1024.0 / 1024.0,
        }
    }
}

/// Probes the OS process table for a single pid at a time
#[derive(Debug)]
pub struct ProcessProbe {
    system: System,
}

impl ProcessProbe {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }

    fn refresh(&mut self, pid: u32) {
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[Pid::from_u32(pid)]),
            true,
            ProcessRefreshKind::everything(),
        );
    }

    /// Whether the pid is present in the process table
    pub fn is_running(&mut self, pid: u32) -> bool {
        self.refresh(pid);
        self.system.process(Pid::from_u32(pid)).is_some()
    }

    /// Resident set size in bytes, 0 when the pid is gone
    pub fn resident_bytes(&mut self, pid: u32) -> u64 {
        self.refresh(pid);
        self.system
            .process(Pid::from_u32(pid))
            .map(|p| p.memory())
            .unwrap_or(0)
    }
}

impl Default for ProcessProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_units_derive_from_bytes() {
        let usage = MemoryUsage::from_bytes(2 * 1024 * 1024 * 1024);
        assert_eq!(usage.kb, 2097152.0);
        assert_eq!(usage.mb, 2048.0);
        assert_eq!(usage.gb, 2.0);
    }

    #[test]
    fn own_process_is_visible() {
        let mut probe = ProcessProbe::new();
        let pid = std::process::id();
        assert!(probe.is_running(pid));
        assert!(probe.resident_bytes(pid) > 0);
    }
}
