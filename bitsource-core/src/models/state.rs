use serde::{Deserialize, Serialize};

/// Source lifecycle state machine.
///
/// State transitions:
/// ```text
/// unopened → connecting → open → closed
///               ↓                  ↑ ↓
///             closed ──── open() ──┘ connecting
///
/// any state → invalid (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Unopened,
    Connecting,
    Open,
    Closed,
    Invalid,
}

impl LifecycleState {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Whether an `open()` may start a new connection from this state.
    pub fn can_open(&self) -> bool {
        matches!(self, Self::Unopened | Self::Closed)
    }

    /// Connecting or open: the device is (being) held by this process.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Connecting | Self::Open)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unopened_and_closed_can_open() {
        assert!(LifecycleState::Unopened.can_open());
        assert!(LifecycleState::Closed.can_open());
        assert!(!LifecycleState::Connecting.can_open());
        assert!(!LifecycleState::Open.can_open());
        assert!(!LifecycleState::Invalid.can_open());
    }

    #[test]
    fn active_states() {
        assert!(LifecycleState::Connecting.is_active());
        assert!(LifecycleState::Open.is_active());
        assert!(!LifecycleState::Closed.is_active());
        assert!(LifecycleState::Invalid.is_terminal());
    }
}
