//! Capability authorization contracts.
//!
//! The OS prompt itself belongs to the host application; capture code only
//! asks whether a capability is authorized and, when the answer is not yet
//! known, asks the broker to prompt and waits for the outcome.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A capability a track needs before its device may be opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ScreenRecording,
    Camera,
    Microphone,
    InputMonitoring,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Capability::ScreenRecording => "screen recording",
            Capability::Camera => "camera",
            Capability::Microphone => "microphone",
            Capability::InputMonitoring => "input monitoring",
        })
    }
}

/// Authorization state of one capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationStatus {
    Authorized,
    Denied,
    NotDetermined,
}

/// Source of truth for capability authorization.
#[async_trait::async_trait]
pub trait PermissionBroker: Send + Sync {
    /// Current authorization state, without side effects.
    fn status(&self, capability: Capability) -> AuthorizationStatus;

    /// Whether the capability is currently authorized.
    fn is_authorized(&self, capability: Capability) -> bool {
        self.status(capability) == AuthorizationStatus::Authorized
    }

    /// Ask the user (or the system settings) for the capability and resolve
    /// once a decision exists. May take arbitrarily long.
    async fn prompt_authorization(&self, capability: Capability) -> AuthorizationStatus;
}

/// Resolve authorization for `capability`, prompting only when undecided.
pub async fn resolve_authorization(
    broker: &dyn PermissionBroker,
    capability: Capability,
) -> AuthorizationStatus {
    match broker.status(capability) {
        AuthorizationStatus::NotDetermined => {
            tracing::info!(%capability, "Authorization not determined; prompting");
            let outcome = broker.prompt_authorization(capability).await;
            tracing::info!(%capability, ?outcome, "Authorization prompt resolved");
            outcome
        }
        status => status,
    }
}

/// A broker with fixed answers, for hosts that manage permissions elsewhere
/// and for tests.
///
/// Capabilities without an explicit entry are authorized. A `NotDetermined`
/// capability resolves to its scripted prompt answer after `prompt_delay`.
#[derive(Debug, Default)]
pub struct StaticPermissions {
    statuses: Mutex<HashMap<Capability, AuthorizationStatus>>,
    prompt_answers: HashMap<Capability, bool>,
    prompt_delay: Duration,
    prompts: Mutex<Vec<Capability>>,
}

impl StaticPermissions {
    /// Every capability authorized.
    pub fn all_authorized() -> Self {
        Self::default()
    }

    /// Set the current status of a capability.
    pub fn with_status(self, capability: Capability, status: AuthorizationStatus) -> Self {
        self.lock_statuses().insert(capability, status);
        self
    }

    /// Shorthand for a denied capability.
    pub fn deny(self, capability: Capability) -> Self {
        self.with_status(capability, AuthorizationStatus::Denied)
    }

    /// Mark a capability undecided; prompting it grants or denies.
    pub fn undetermined(mut self, capability: Capability, grant_on_prompt: bool) -> Self {
        self.prompt_answers.insert(capability, grant_on_prompt);
        self.with_status(capability, AuthorizationStatus::NotDetermined)
    }

    /// Delay every prompt, simulating a user who takes a while to answer.
    pub fn with_prompt_delay(mut self, delay: Duration) -> Self {
        self.prompt_delay = delay;
        self
    }

    /// Capabilities prompted so far, in order.
    pub fn prompts(&self) -> Vec<Capability> {
        self.prompts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn lock_statuses(&self) -> std::sync::MutexGuard<'_, HashMap<Capability, AuthorizationStatus>> {
        self.statuses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait::async_trait]
impl PermissionBroker for StaticPermissions {
    fn status(&self, capability: Capability) -> AuthorizationStatus {
        self.lock_statuses()
            .get(&capability)
            .copied()
            .unwrap_or(AuthorizationStatus::Authorized)
    }

    async fn prompt_authorization(&self, capability: Capability) -> AuthorizationStatus {
        self.prompts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(capability);

        if !self.prompt_delay.is_zero() {
            tokio::time::sleep(self.prompt_delay).await;
        }

        let current = self.status(capability);
        if current != AuthorizationStatus::NotDetermined {
            return current;
        }
        let decided = match self.prompt_answers.get(&capability) {
            Some(true) => AuthorizationStatus::Authorized,
            _ => AuthorizationStatus::Denied,
        };
        self.lock_statuses().insert(capability, decided);
        decided
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn undecided_capability_prompts_once_and_remembers() {
        let broker = StaticPermissions::all_authorized().undetermined(Capability::Camera, true);
        assert!(!broker.is_authorized(Capability::Camera));

        let outcome = resolve_authorization(&broker, Capability::Camera).await;
        assert_eq!(outcome, AuthorizationStatus::Authorized);
        assert!(broker.is_authorized(Capability::Camera));

        resolve_authorization(&broker, Capability::Camera).await;
        assert_eq!(broker.prompts(), vec![Capability::Camera]);
    }

    #[tokio::test]
    async fn denied_capability_is_not_prompted() {
        let broker = StaticPermissions::all_authorized().deny(Capability::Microphone);
        let outcome = resolve_authorization(&broker, Capability::Microphone).await;
        assert_eq!(outcome, AuthorizationStatus::Denied);
        assert!(broker.prompts().is_empty());
        assert!(broker.is_authorized(Capability::ScreenRecording));
    }

    #[tokio::test]
    async fn refused_prompt_resolves_to_denied() {
        let broker =
            StaticPermissions::all_authorized().undetermined(Capability::ScreenRecording, false);
        let outcome = resolve_authorization(&broker, Capability::ScreenRecording).await;
        assert_eq!(outcome, AuthorizationStatus::Denied);
    }
}
