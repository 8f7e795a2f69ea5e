//! Host telemetry: memory, threads, load and collector activity of the
//! running process.
//!
//! The reporter reads a `HostTelemetry` once per cycle when host telemetry is
//! enabled. `ProcessTelemetry` is the Linux implementation. It reads
//! `/proc/self/status` and `getloadavg(3)`; anything it cannot read is
//! reported as zero rather than failing the cycle.

use std::fs;
use std::io;

/// Cumulative activity of one garbage collector.
#[derive(Clone, Debug, PartialEq)]
pub struct GarbageCollectorStats {
    /// collector name, becomes the `type:` tag
    pub name: String,
    /// total collections run
    pub runs: i64,
    /// total time spent collecting, in milliseconds
    pub time_ms: i64,
}

/// The five host measures the reporter knows how to emit.
pub trait HostTelemetry: Send + Sync {
    /// Bytes of memory committed to the process.
    fn heap_committed(&self) -> u64;
    /// Bytes of memory in use by the process.
    fn heap_used(&self) -> u64;
    /// Live threads in the process.
    fn thread_count(&self) -> u64;
    /// One minute system load average. Negative when unavailable.
    fn system_load_average(&self) -> f64;
    /// One entry per managed collector. Empty for unmanaged runtimes.
    fn garbage_collectors(&self) -> Vec<GarbageCollectorStats>;
}

/// Telemetry about the current process.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessTelemetry;

impl ProcessTelemetry {
    /// Create the telemetry source.
    pub fn new() -> ProcessTelemetry {
        ProcessTelemetry
    }

    fn status(&self) -> ProcStatus {
        match read_status() {
            Ok(s) => s,
            Err(e) => {
                trace!("could not read /proc/self/status: {}", e);
                ProcStatus::default()
            }
        }
    }
}

impl HostTelemetry for ProcessTelemetry {
    fn heap_committed(&self) -> u64 {
        self.status().vm_size
    }

    fn heap_used(&self) -> u64 {
        self.status().vm_rss
    }

    fn thread_count(&self) -> u64 {
        self.status().threads
    }

    fn system_load_average(&self) -> f64 {
        load_average()
    }

    fn garbage_collectors(&self) -> Vec<GarbageCollectorStats> {
        Vec::new()
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct ProcStatus {
    vm_size: u64,
    vm_rss: u64,
    threads: u64,
}

fn read_status() -> io::Result<ProcStatus> {
    let contents = fs::read_to_string("/proc/self/status")?;
    Ok(parse_status(&contents))
}

/// Pull the fields we care about out of `/proc/<pid>/status`. Memory fields
/// are reported by the kernel in kB.
fn parse_status(contents: &str) -> ProcStatus {
    let mut status = ProcStatus::default();
    for line in contents.lines() {
        let mut parts = line.splitn(2, ':');
        let key = parts.next().unwrap_or("").trim();
        let rest = parts.next().unwrap_or("").trim();
        let value = rest
            .split_whitespace()
            .next()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        let kb = rest.ends_with("kB");
        let scaled = if kb { value.saturating_mul(1024) } else { value };
        match key {
            "VmSize" => status.vm_size = scaled,
            "VmRSS" => status.vm_rss = scaled,
            "Threads" => status.threads = value,
            _ => {}
        }
    }
    status
}

#[cfg(unix)]
fn load_average() -> f64 {
    let mut loads: [libc::c_double; 3] = [0.0; 3];
    let n = unsafe { libc::getloadavg(loads.as_mut_ptr(), 3) };
    if n < 1 {
        -1.0
    } else {
        loads[0]
    }
}

#[cfg(not(unix))]
fn load_average() -> f64 {
    -1.0
}
