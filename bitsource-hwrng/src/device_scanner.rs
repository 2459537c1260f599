//! Discovery of hw_random device nodes.
//!
//! The kernel exposes one multiplexed node (`/dev/hwrng`) backed by
//! whichever driver is current; its name is published under
//! `/sys/class/misc/hw_random/rng_current` and becomes the device type.

use std::fs;
use std::path::{Path, PathBuf};

use bitsource_core::models::device::{DeviceDescriptor, DEVICE_TEXT_CAPACITY};
use bitsource_core::models::error::SourceError;

use crate::permissions::check_device_access;

pub const DEFAULT_NODE: &str = "/dev/hwrng";
pub const DEFAULT_DRIVER_FILE: &str = "/sys/class/misc/hw_random/rng_current";

/// Type reported when the active driver cannot be determined.
pub const FALLBACK_DEVICE_TYPE: &str = "hwrng";

/// Finds readable random device nodes.
#[derive(Debug, Clone)]
pub struct DeviceScanner {
    nodes: Vec<PathBuf>,
    driver_file: PathBuf,
}

impl DeviceScanner {
    /// Scan the standard kernel node only.
    pub fn new() -> Self {
        Self::with_nodes(vec![PathBuf::from(DEFAULT_NODE)])
    }

    pub fn with_nodes(nodes: Vec<PathBuf>) -> Self {
        Self {
            nodes,
            driver_file: PathBuf::from(DEFAULT_DRIVER_FILE),
        }
    }

    /// Read the driver name from `path` instead of sysfs.
    pub fn with_driver_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.driver_file = path.into();
        self
    }

    pub fn nodes(&self) -> &[PathBuf] {
        &self.nodes
    }

    /// List the configured nodes that exist and are readable.
    ///
    /// The identity is the node path, so the same node always maps to the
    /// same source.
    pub fn scan(&self) -> Result<Vec<DeviceDescriptor>, SourceError> {
        let device_type = self.driver_name();
        let mut found = Vec::new();
        for node in &self.nodes {
            if !check_device_access(node)? {
                continue;
            }
            let identity = node.to_string_lossy().into_owned();
            found.push(DeviceDescriptor::new(device_type.clone(), identity));
        }
        log::debug!("scanned {} node(s), {} usable", self.nodes.len(), found.len());
        Ok(found)
    }

    fn driver_name(&self) -> String {
        read_driver_name(&self.driver_file).unwrap_or_else(|| FALLBACK_DEVICE_TYPE.to_string())
    }
}

impl Default for DeviceScanner {
    fn default() -> Self {
        Self::new()
    }
}

fn read_driver_name(path: &Path) -> Option<String> {
    let text = fs::read_to_string(path).ok()?;
    let name = text.trim();
    if name.is_empty() || name == "none" {
        return None;
    }
    Some(truncate_text(name))
}

/// Clamp to the bounded text size callers copy device names into.
fn truncate_text(text: &str) -> String {
    if text.len() < DEVICE_TEXT_CAPACITY {
        return text.to_string();
    }
    let mut end = DEVICE_TEXT_CAPACITY - 1;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn reports_driver_name_as_type() {
        let dir = tempfile::tempdir().unwrap();
        let node = dir.path().join("hwrng");
        fs::write(&node, [0u8; 4]).unwrap();
        let mut driver = tempfile::NamedTempFile::new().unwrap();
        writeln!(driver, "virtio_rng.0").unwrap();

        let scanner = DeviceScanner::with_nodes(vec![node.clone()]).with_driver_file(driver.path());
        let found = scanner.scan().unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].device_type, "virtio_rng.0");
        assert_eq!(found[0].identity, node.to_string_lossy());
    }

    #[test]
    fn falls_back_when_driver_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let node = dir.path().join("hwrng");
        fs::write(&node, [0u8; 4]).unwrap();
        let none = dir.path().join("rng_current");
        fs::write(&none, "none\n").unwrap();

        let scanner = DeviceScanner::with_nodes(vec![node]).with_driver_file(&none);
        assert_eq!(scanner.scan().unwrap()[0].device_type, FALLBACK_DEVICE_TYPE);

        let scanner = scanner.with_driver_file(dir.path().join("missing"));
        assert_eq!(scanner.scan().unwrap()[0].device_type, FALLBACK_DEVICE_TYPE);
    }

    #[test]
    fn skips_missing_nodes() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("hwrng0");
        fs::write(&present, [1u8]).unwrap();

        let scanner = DeviceScanner::with_nodes(vec![dir.path().join("hwrng1"), present]);
        let found = scanner.scan().unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].identity.ends_with("hwrng0"));
    }

    #[test]
    fn long_driver_names_are_clamped() {
        let long = "x".repeat(200);
        assert_eq!(truncate_text(&long).len(), DEVICE_TEXT_CAPACITY - 1);
        assert_eq!(truncate_text("tpm-rng"), "tpm-rng");
    }
}
