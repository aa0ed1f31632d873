//! ECS error types

use std::any::Any;

use super::Entity;

/// Error type user hooks may return, so any error can be raised with `?`
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Result of a lifecycle hook or system callback
pub type HookResult = Result<(), HookError>;

/// Structural errors reported by the stricter world APIs
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// The handle's generation no longer matches its slot
    #[error("entity {0} is stale or destroyed")]
    StaleHandle(Entity),

    /// No store exists for the component type
    #[error("component type {0} is not registered")]
    UnregisteredComponent(&'static str),

    /// The entity is live but lacks the component
    #[error("entity {entity} has no {component} component")]
    MissingComponent {
        /// Entity that was looked up
        entity: Entity,
        /// Component type name
        component: &'static str,
    },

    /// A parenting change would break the tree
    #[error("cannot parent {child} to {parent}: {reason}")]
    TopologyViolation {
        /// Transform being re-parented
        child: Entity,
        /// Requested parent
        parent: Entity,
        /// What the change would break
        reason: &'static str,
    },

    /// The instance is moved out by its running hook, or its store is detached for iteration
    #[error("component {0} is in use")]
    StoreBusy(&'static str),
}

/// A user callback that failed during iteration or dispatch
#[derive(thiserror::Error, Debug)]
pub enum CallbackFailure {
    /// The callback returned an error
    #[error("{context}: {source}")]
    Failed {
        /// Entity or system and the type involved
        context: String,
        /// Error returned by the callback
        #[source]
        source: HookError,
    },

    /// The callback panicked
    #[error("{context}: panicked: {message}")]
    Panicked {
        /// Entity or system and the type involved
        context: String,
        /// Panic payload rendered as text
        message: String,
    },
}

impl CallbackFailure {
    /// Description of where the failure happened
    pub fn context(&self) -> &str {
        match self {
            Self::Failed { context, .. } | Self::Panicked { context, .. } => context,
        }
    }

    /// Build a failure from the outcome of a `catch_unwind` around a hook
    pub(crate) fn from_outcome(
        outcome: std::thread::Result<HookResult>,
        context: impl FnOnce() -> String,
    ) -> Result<(), Self> {
        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(Self::Failed {
                context: context(),
                source,
            }),
            Err(payload) => Err(Self::Panicked {
                context: context(),
                message: panic_message(payload.as_ref()),
            }),
        }
    }
}

/// Render a panic payload as text
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_reads_common_payloads() {
        let payload = std::panic::catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let formatted = std::panic::catch_unwind(|| panic!("value {}", 3)).unwrap_err();
        assert_eq!(panic_message(formatted.as_ref()), "value 3");
    }

    #[test]
    fn test_failure_keeps_context() {
        let failure = CallbackFailure::from_outcome(Ok(Err("bad input".into())), || {
            "entity 'ship' (0v0) Health".to_string()
        })
        .unwrap_err();

        assert_eq!(failure.context(), "entity 'ship' (0v0) Health");
        assert_eq!(failure.to_string(), "entity 'ship' (0v0) Health: bad input");
    }
}
