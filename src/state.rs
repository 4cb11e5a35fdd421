//! # Connection State Machine
//!
//! The closed set of lifecycle states and the transition table between them.
//! The client owns one [`ConnectionState`] and only ever changes it through
//! [`ConnectionState::on`], so every move is checked against the table below:
//!
//! ```text
//! Idle --Init--> Init --Start--> Start --LinkUp--> Connected <--LinkUp-- Disconnected
//!                                 |  \--ConnectFailed--> Disconnected --LinkLost--/
//!                                 |
//!                          BeginProvisioning
//!                                 v
//!                           Provisioning --Provisioned--> Start
//!                                 \--ProvisionFailed--> ProvisionFailed
//!
//! Start | Connected | Disconnected --Suspend--> Suspended --Resume--> Resumed --Start--> Start
//! ```

/// Lifecycle state of the cloud client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionState {
    #[default]
    Idle,
    Init,
    Start,
    Provisioning,
    Connected,
    Disconnected,
    Suspended,
    Resumed,
    ProvisionFailed,
}

/// Something that happened and may move the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Trigger {
    /// Configuration was validated.
    Init,
    /// Transport bring-up was requested.
    Start,
    /// No identity is available but claim credentials are.
    BeginProvisioning,
    Provisioned,
    ProvisionFailed,
    /// The broker session is up.
    LinkUp,
    /// A connection attempt failed.
    ConnectFailed,
    /// An established session dropped.
    LinkLost,
    Suspend,
    Resume,
    /// Tear down and reconnect.
    Restart,
    /// Tear down and return to idle.
    Close,
}

/// A trigger that is not allowed from the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InvalidTransition {
    pub from: ConnectionState,
    pub trigger: Trigger,
}

impl ConnectionState {
    /// Applies `trigger`, returning the next state.
    pub fn on(self, trigger: Trigger) -> Result<ConnectionState, InvalidTransition> {
        use ConnectionState as S;
        use Trigger as T;

        let next = match (self, trigger) {
            (S::Idle, T::Init) => S::Init,
            (S::Init, T::Start) => S::Start,
            (S::Start, T::BeginProvisioning) => S::Provisioning,
            (S::Start, T::LinkUp) => S::Connected,
            (S::Start, T::ConnectFailed) => S::Disconnected,
            (S::Provisioning, T::Provisioned) => S::Start,
            (S::Provisioning, T::ProvisionFailed) => S::ProvisionFailed,
            (S::Connected, T::LinkLost) => S::Disconnected,
            (S::Disconnected, T::LinkUp) => S::Connected,
            (S::Disconnected, T::ConnectFailed) => S::Disconnected,
            (S::Start | S::Connected | S::Disconnected, T::Suspend) => S::Suspended,
            (S::Suspended, T::Resume) => S::Resumed,
            (S::Resumed, T::Start) => S::Start,
            (
                S::Start | S::Connected | S::Disconnected | S::Resumed | S::ProvisionFailed,
                T::Restart,
            ) => S::Start,
            (from, T::Close) if from != S::Idle => S::Idle,
            (from, trigger) => return Err(InvalidTransition { from, trigger }),
        };
        Ok(next)
    }

    /// Upper-case name used in logs and diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "IDLE",
            ConnectionState::Init => "INIT",
            ConnectionState::Start => "START",
            ConnectionState::Provisioning => "PROVISIONING",
            ConnectionState::Connected => "CONNECTED",
            ConnectionState::Disconnected => "DISCONNECTED",
            ConnectionState::Suspended => "SUSPENDED",
            ConnectionState::Resumed => "RESUME",
            ConnectionState::ProvisionFailed => "PROVISION_FAILED",
        }
    }

    pub fn is_connected(&self) -> bool {
        *self == ConnectionState::Connected
    }

    /// `true` while the client has been started and not yet closed or halted.
    pub fn is_running(&self) -> bool {
        !matches!(
            self,
            ConnectionState::Idle
                | ConnectionState::Init
                | ConnectionState::Suspended
                | ConnectionState::ProvisionFailed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionState as S;
    use Trigger as T;

    fn walk(start: ConnectionState, triggers: &[Trigger]) -> Result<ConnectionState, InvalidTransition> {
        triggers.iter().try_fold(start, |state, &t| state.on(t))
    }

    #[test]
    fn provisioning_path() {
        assert_eq!(
            walk(S::Idle, &[T::Init, T::Start, T::BeginProvisioning, T::Provisioned, T::LinkUp]),
            Ok(S::Connected)
        );
        assert_eq!(
            walk(S::Idle, &[T::Init, T::Start, T::BeginProvisioning, T::ProvisionFailed]),
            Ok(S::ProvisionFailed)
        );
    }

    #[test]
    fn reconnect_and_suspend_cycle() {
        assert_eq!(
            walk(
                S::Connected,
                &[T::LinkLost, T::ConnectFailed, T::LinkUp, T::Suspend, T::Resume, T::Start]
            ),
            Ok(S::Start)
        );
    }

    #[test]
    fn invalid_moves_are_errors() {
        assert_eq!(
            S::Idle.on(T::Start),
            Err(InvalidTransition {
                from: S::Idle,
                trigger: T::Start
            })
        );
        assert!(S::Provisioning.on(T::LinkUp).is_err());
        assert!(S::Suspended.on(T::Start).is_err());
        assert!(S::ProvisionFailed.on(T::Resume).is_err());
        assert!(S::Idle.on(T::Close).is_err());
    }

    #[test]
    fn close_and_restart() {
        for state in [S::Init, S::Start, S::Connected, S::Suspended, S::ProvisionFailed] {
            assert_eq!(state.on(T::Close), Ok(S::Idle));
        }
        assert_eq!(S::ProvisionFailed.on(T::Restart), Ok(S::Start));
        assert!(S::Suspended.on(T::Restart).is_err());
    }

    #[test]
    fn names_match_diagnostics() {
        assert_eq!(S::Resumed.as_str(), "RESUME");
        assert_eq!(S::ProvisionFailed.as_str(), "PROVISION_FAILED");
        assert!(S::Connected.is_connected());
        assert!(!S::Suspended.is_running());
    }
}
