//! Resource limits - per-child CPU and address-space ceilings
//!
//! The limiter only describes limits. They are committed inside the forked
//! child by [`ResourceLimits::apply_to_current_process`], called from a
//! `pre_exec` hook, so the target program never runs unbounded.

use serde::{Deserialize, Serialize};
use warden_foundation::{Error, LimitsConfig, Result};

/// Default CPU ceiling (seconds)
pub const DEFAULT_CPU_SECONDS: u64 = 5;

/// Default address-space ceiling (512 MiB)
pub const DEFAULT_MEMORY_BYTES: u64 = 512 * 1024 * 1024;

/// Limits descriptor handed to a runner for one spawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// RLIMIT_CPU, soft = hard
    pub cpu_seconds: u64,
    /// RLIMIT_AS, soft = hard
    pub memory_bytes: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            cpu_seconds: DEFAULT_CPU_SECONDS,
            memory_bytes: DEFAULT_MEMORY_BYTES,
        }
    }
}

impl ResourceLimits {
    /// Memory ceiling in MiB, for logs
    pub fn memory_mib(&self) -> u64 {
        self.memory_bytes / (1024 * 1024)
    }

    /// Commit the ceilings to the calling process.
    ///
    /// Runs between fork and exec: only async-signal-safe calls, no
    /// allocation, no logging.
    #[cfg(unix)]
    pub fn apply_to_current_process(&self) -> std::io::Result<()> {
        set_rlimit(libc::RLIMIT_CPU, self.cpu_seconds)?;
        set_rlimit(libc::RLIMIT_AS, self.memory_bytes)?;
        Ok(())
    }
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
type RlimitResource = libc::__rlimit_resource_t;

#[cfg(all(unix, not(all(target_os = "linux", target_env = "gnu"))))]
type RlimitResource = libc::c_int;

#[cfg(unix)]
fn set_rlimit(resource: RlimitResource, limit: u64) -> std::io::Result<()> {
    let rlim = libc::rlimit {
        rlim_cur: limit as libc::rlim_t,
        rlim_max: limit as libc::rlim_t,
    };

    // SAFETY: setrlimit only reads the struct we pass.
    let ret = unsafe { libc::setrlimit(resource, &rlim) };
    if ret != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

/// Produces the limits for the next spawn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLimiter {
    base: ResourceLimits,
}

impl Default for ResourceLimiter {
    fn default() -> Self {
        Self {
            base: ResourceLimits::default(),
        }
    }
}

impl ResourceLimiter {
    /// Limiter with explicit ceilings; both must be non-zero
    pub fn new(cpu_seconds: u64, memory_bytes: u64) -> Result<Self> {
        if cpu_seconds == 0 {
            return Err(Error::InvalidInput("cpu_seconds must be > 0".to_string()));
        }
        if memory_bytes == 0 {
            return Err(Error::InvalidInput("memory_bytes must be > 0".to_string()));
        }
        Ok(Self {
            base: ResourceLimits {
                cpu_seconds,
                memory_bytes,
            },
        })
    }

    pub fn from_config(config: &LimitsConfig) -> Result<Self> {
        Self::new(config.cpu_seconds, config.memory_bytes)
    }

    /// Limits for one call. Recomputed per call so per-command overrides can
    /// slot in here.
    pub fn build(&self) -> ResourceLimits {
        self.base
    }

    pub fn cpu_seconds(&self) -> u64 {
        self.base.cpu_seconds
    }

    pub fn memory_bytes(&self) -> u64 {
        self.base.memory_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let limits = ResourceLimiter::default().build();
        assert_eq!(limits.cpu_seconds, 5);
        assert_eq!(limits.memory_bytes, 512 * 1024 * 1024);
        assert_eq!(limits.memory_mib(), 512);
    }

    #[test]
    fn test_overrides() {
        let limiter = ResourceLimiter::new(1, 64 * 1024 * 1024).unwrap();
        let limits = limiter.build();
        assert_eq!(limits.cpu_seconds, 1);
        assert_eq!(limits.memory_mib(), 64);
    }

    #[test]
    fn test_zero_rejected() {
        assert!(matches!(
            ResourceLimiter::new(0, 1024),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            ResourceLimiter::new(1, 0),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_from_config() {
        let config = LimitsConfig {
            cpu_seconds: 3,
            memory_bytes: 1 << 30,
        };
        let limiter = ResourceLimiter::from_config(&config).unwrap();
        assert_eq!(limiter.cpu_seconds(), 3);
        assert_eq!(limiter.memory_bytes(), 1 << 30);
    }

    #[test]
    fn test_build_is_stable_across_calls() {
        let limiter = ResourceLimiter::default();
        assert_eq!(limiter.build(), limiter.build());
    }
}
