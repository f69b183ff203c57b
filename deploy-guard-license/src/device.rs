//! Machine identity for license binding.
//!
//! Produces a stable, privacy-hashed machine identifier plus auxiliary
//! descriptive signals. Raw hardware identifiers never leave this module;
//! only their salted SHA-256 does.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::env;

/// Salt mixed into the machine hash so IDs are specific to this product.
const IDENTITY_SALT: &str = "deploy-guard";

/// Source of the identity attached to every authority request.
pub trait IdentityProvider: Send + Sync {
    /// Stable opaque machine identifier.
    fn machine_id(&self) -> &str;

    /// Descriptive hints (os, arch, optional cpu/ram) sent alongside the ID.
    fn aux_signals(&self) -> &BTreeMap<String, String>;
}

/// Machine identity presented to the authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFingerprint {
    /// `sha256:<hex>` of the salted hardware identifiers.
    id: String,
    /// Auxiliary signals reported with the ID.
    aux_signals: BTreeMap<String, String>,
    taken_at: chrono::DateTime<chrono::Utc>,
}

impl DeviceFingerprint {
    /// Fingerprints the running host. The ID is stable across reboots and
    /// process restarts.
    #[must_use]
    pub fn generate() -> Self {
        let components = identity_inputs();
        Self {
            id: hash_identifiers(&components),
            aux_signals: collect_aux_signals(),
            taken_at: chrono::Utc::now(),
        }
    }

    /// Builds a fingerprint from an already-known identity.
    #[must_use]
    pub fn from_parts(id: impl Into<String>, aux_signals: BTreeMap<String, String>) -> Self {
        Self {
            id: id.into(),
            aux_signals,
            taken_at: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl IdentityProvider for DeviceFingerprint {
    fn machine_id(&self) -> &str {
        &self.id
    }

    fn aux_signals(&self) -> &BTreeMap<String, String> {
        &self.aux_signals
    }
}

/// Returns the machine hostname, or `unknown`.
#[must_use]
pub fn hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

fn hash_identifiers(components: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(IDENTITY_SALT.as_bytes());
    for component in components {
        hasher.update(b"|");
        hasher.update(component.as_bytes());
    }
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

/// Inputs to the machine hash, strongest first.
fn identity_inputs() -> Vec<String> {
    let mut ids = vec![env::consts::OS.to_string(), env::consts::ARCH.to_string()];

    // Machine ID is the strongest signal; hostname and user only back it up.
    match platform_machine_id() {
        Some(machine_id) => ids.push(machine_id),
        None => {
            ids.push(hostname());
            if let Ok(user) = env::var("USER").or_else(|_| env::var("USERNAME")) {
                ids.push(user);
            }
        }
    }

    ids
}

fn collect_aux_signals() -> BTreeMap<String, String> {
    let mut aux = BTreeMap::new();
    aux.insert("os".to_string(), env::consts::OS.to_string());
    aux.insert("arch".to_string(), env::consts::ARCH.to_string());
    aux.insert("os_version".to_string(), os_version_string());

    if let Ok(cores) = std::thread::available_parallelism() {
        aux.insert("cpu_cores".to_string(), cores.get().to_string());
    }
    if let Some(model) = cpu_model() {
        aux.insert("cpu_model".to_string(), model);
    }
    if let Some(ram_mb) = total_ram_mb() {
        aux.insert("total_ram_mb".to_string(), ram_mb.to_string());
    }

    aux
}

/// `sw_vers` on macOS, `VERSION_ID` from os-release on Linux.
fn os_version_string() -> String {
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("sw_vers")
            .arg("-productVersion")
            .output()
            .ok()
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/etc/os-release")
            .ok()
            .and_then(|content| {
                content
                    .lines()
                    .find(|l| l.starts_with("VERSION_ID="))
                    .map(|l| {
                        l.trim_start_matches("VERSION_ID=")
                            .trim_matches('"')
                            .to_string()
                    })
            })
            .unwrap_or_else(|| "unknown".to_string())
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        "unknown".to_string()
    }
}

/// IOPlatformUUID on macOS, systemd machine-id on Linux.
fn platform_machine_id() -> Option<String> {
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("ioreg")
            .args(["-rd1", "-c", "IOPlatformExpertDevice"])
            .output()
            .ok()
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .and_then(|output| {
                output
                    .lines()
                    .find(|l| l.contains("IOPlatformUUID"))
                    .and_then(|l| l.split('"').nth(3))
                    .map(String::from)
            })
    }

    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/etc/machine-id")
            .or_else(|_| std::fs::read_to_string("/var/lib/dbus/machine-id"))
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        None
    }
}

fn cpu_model() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/proc/cpuinfo").ok().and_then(|content| {
            content
                .lines()
                .find(|l| l.starts_with("model name"))
                .and_then(|l| l.split_once(':'))
                .map(|(_, model)| model.trim().to_string())
        })
    }

    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

fn total_ram_mb() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/proc/meminfo").ok().and_then(|content| {
            content
                .lines()
                .find(|l| l.starts_with("MemTotal:"))
                .and_then(|l| l.split_whitespace().nth(1))
                .and_then(|kb| kb.parse::<u64>().ok())
                .map(|kb| kb / 1024)
        })
    }

    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}
