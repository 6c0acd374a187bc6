//! Memory pressure levels and default budget detection
//!
//! The default cache budget scales with total system RAM: a tiered ratio of
//! physical memory, clamped to a sane range so small machines keep a usable
//! cache and large machines don't dedicate gigabytes to decoded images.
//! Deployments can override detection with environment variables:
//!
//! - `LIGHTBOX_CACHE_MB` - use exactly this budget, in megabytes
//! - `LIGHTBOX_TOTAL_RAM_GB` - override RAM detection (containers, tests)
//!
//! Unparseable values are ignored with a warning rather than failing cache
//! construction.

use tracing::warn;

const MB: u64 = 1024 * 1024;
const GB: u64 = 1024 * MB;

/// Fallback RAM guess when the platform probe is unavailable
const DEFAULT_TOTAL_RAM_GB_HINT: u64 = 8;

/// Smallest budget the detection will produce
const MIN_DETECTED_BUDGET_BYTES: u64 = 32 * MB;

/// Largest budget the detection will produce
const MAX_DETECTED_BUDGET_BYTES: u64 = 1024 * MB;

/// Memory pressure levels derived from cache utilization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryPressure {
    /// Memory usage is comfortable (< 50% utilization)
    Low,

    /// Memory usage is elevated (50-75% utilization)
    Moderate,

    /// Memory usage is high (75-90% utilization)
    High,

    /// Memory usage is critical (> 90% utilization)
    Critical,
}

impl MemoryPressure {
    /// Get the memory pressure level from a utilization ratio (0.0 to 1.0)
    pub fn from_utilization(utilization: f64) -> Self {
        if utilization < 0.5 {
            MemoryPressure::Low
        } else if utilization < 0.75 {
            MemoryPressure::Moderate
        } else if utilization < 0.90 {
            MemoryPressure::High
        } else {
            MemoryPressure::Critical
        }
    }

    /// Returns true if the pressure level calls for shrinking the cache
    pub fn needs_eviction(&self) -> bool {
        matches!(self, MemoryPressure::High | MemoryPressure::Critical)
    }
}

/// Compute a cache budget from a total-RAM figure
///
/// Uses a tiered ratio (larger machines give up a slightly larger share),
/// capped at a quarter of RAM and clamped to the supported budget range.
pub fn budget_from_total_ram_bytes(total_ram_bytes: u64) -> usize {
    let ratio = tier_ratio(total_ram_bytes);
    let proposed = (total_ram_bytes as f64 * ratio) as u64;
    let upper_from_ram = total_ram_bytes / 4;
    let upper_bound = upper_from_ram.min(MAX_DETECTED_BUDGET_BYTES);
    proposed.clamp(MIN_DETECTED_BUDGET_BYTES.min(upper_bound.max(1)), upper_bound.max(1)) as usize
}

fn tier_ratio(total_ram_bytes: u64) -> f64 {
    let gb = (total_ram_bytes as f64) / (GB as f64);
    if gb <= 4.0 {
        0.10
    } else if gb <= 8.0 {
        0.12
    } else if gb <= 16.0 {
        0.15
    } else {
        0.18
    }
}

/// Detect the default cache budget for this machine
///
/// Consults `LIGHTBOX_CACHE_MB` first, then derives a budget from detected
/// (or `LIGHTBOX_TOTAL_RAM_GB`-overridden) physical memory.
pub fn default_cache_budget() -> usize {
    if let Ok(value) = std::env::var("LIGHTBOX_CACHE_MB") {
        match value.parse::<u64>() {
            Ok(mb) => return mb.saturating_mul(MB) as usize,
            Err(_) => {
                warn!(value = %value, "ignoring unparseable LIGHTBOX_CACHE_MB");
            }
        }
    }

    let total_ram_bytes = detect_total_ram_bytes();
    budget_from_total_ram_bytes(total_ram_bytes)
}

/// Total physical memory, honoring the `LIGHTBOX_TOTAL_RAM_GB` override
pub(crate) fn detect_total_ram_bytes() -> u64 {
    if let Ok(value) = std::env::var("LIGHTBOX_TOTAL_RAM_GB") {
        match value.parse::<u64>() {
            Ok(gb) => return gb.saturating_mul(GB),
            Err(_) => {
                warn!(value = %value, "ignoring unparseable LIGHTBOX_TOTAL_RAM_GB");
            }
        }
    }

    system_total_ram_bytes().unwrap_or(DEFAULT_TOTAL_RAM_GB_HINT.saturating_mul(GB))
}

#[cfg(target_os = "macos")]
fn system_total_ram_bytes() -> Option<u64> {
    use std::ffi::CString;
    use std::mem::size_of;
    use std::ptr;

    let key = CString::new("hw.memsize").ok()?;
    let mut value: u64 = 0;
    let mut len = size_of::<u64>();
    let result = unsafe {
        libc::sysctlbyname(
            key.as_ptr(),
            &mut value as *mut u64 as *mut libc::c_void,
            &mut len,
            ptr::null_mut(),
            0,
        )
    };
    if result == 0 && len == size_of::<u64>() {
        Some(value)
    } else {
        None
    }
}

#[cfg(target_os = "linux")]
fn system_total_ram_bytes() -> Option<u64> {
    let mut info = std::mem::MaybeUninit::<libc::sysinfo>::uninit();
    let rc = unsafe { libc::sysinfo(info.as_mut_ptr()) };
    if rc != 0 {
        return None;
    }
    let info = unsafe { info.assume_init() };
    Some((info.totalram as u64).saturating_mul(info.mem_unit as u64))
}

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
fn system_total_ram_bytes() -> Option<u64> {
    None
}
