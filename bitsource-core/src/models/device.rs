use serde::{Deserialize, Serialize};

/// Recommended capacity for caller buffers receiving device type or identity text.
pub const DEVICE_TEXT_CAPACITY: usize = 64;

/// A physical random-bit device as reported by a probe.
///
/// Identifies hardware, not a session. Two descriptors refer to the same
/// device when their `identity` matches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    #[serde(rename = "type")]
    pub device_type: String,
    pub identity: String,
}

impl DeviceDescriptor {
    pub fn new(device_type: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            device_type: device_type.into(),
            identity: identity.into(),
        }
    }

    /// Human-readable label, e.g. `"REG-1: R1-0042"`.
    pub fn display_name(&self) -> String {
        format!("{}: {}", self.device_type, self.identity)
    }

    pub fn same_device(&self, other: &DeviceDescriptor) -> bool {
        self.identity == other.identity
    }
}

/// Per-source counters and session information, pulled on demand.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDiagnostics {
    /// Identifier of the current (or most recent) open session.
    pub session_id: Option<String>,
    /// RFC 3339 timestamp of the last successful open.
    pub opened_at: Option<String>,
    pub sessions: u64,
    pub refills: u64,
    pub bits_produced: u64,
    pub bits_delivered: u64,
    /// Bits thrown away by `reset()` or `close()`.
    pub bits_discarded: u64,
    pub last_fault: Option<String>,
}

impl SourceDiagnostics {
    pub(crate) fn begin_session(&mut self) {
        self.session_id = Some(uuid::Uuid::new_v4().to_string());
        self.opened_at = Some(chrono::Utc::now().to_rfc3339());
        self.sessions += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_joins_type_and_identity() {
        let device = DeviceDescriptor::new("REG-1", "R1-0042");
        assert_eq!(device.display_name(), "REG-1: R1-0042");
    }

    #[test]
    fn identity_decides_sameness() {
        let a = DeviceDescriptor::new("REG-1", "R1-0042");
        let b = DeviceDescriptor::new("REG-1 (rev B)", "R1-0042");
        let c = DeviceDescriptor::new("REG-1", "R1-0043");
        assert!(a.same_device(&b));
        assert!(!a.same_device(&c));
    }

    #[test]
    fn serializes_type_field() {
        let json = serde_json::to_string(&DeviceDescriptor::new("REG-1", "x")).unwrap();
        assert_eq!(json, r#"{"type":"REG-1","identity":"x"}"#);
    }

    #[test]
    fn begin_session_assigns_fresh_id() {
        let mut diagnostics = SourceDiagnostics::default();
        diagnostics.begin_session();
        let first = diagnostics.session_id.clone();
        diagnostics.begin_session();

        assert_eq!(diagnostics.sessions, 2);
        assert!(diagnostics.opened_at.is_some());
        assert_ne!(first, diagnostics.session_id);
    }
}
