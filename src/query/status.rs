//! Remote query status as reported by a service, and the client-side lifecycle built on it.

use crate::query::error::QueryError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a submitted query as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum QueryStatus {
    Pending,
    Running,
    Succeeded,
    Failed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl QueryStatus {
    /// The lifecycle state this report moves a query into.
    pub fn state(&self) -> QueryState {
        match self {
            QueryStatus::Pending => QueryState::Pending,
            QueryStatus::Running => QueryState::Running,
            QueryStatus::Succeeded => QueryState::Succeeded,
            QueryStatus::Failed { .. } => QueryState::Failed,
        }
    }
}

/// Lifecycle of a query on the client side.
///
/// `Submitted` is entered once the service has accepted the query. `TimedOut` and
/// `Cancelled` are only ever entered by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryState {
    Submitted,
    Pending,
    Running,
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
}

impl QueryState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            QueryState::Succeeded
                | QueryState::Failed
                | QueryState::TimedOut
                | QueryState::Cancelled
        )
    }

    /// Moves to `next`, rejecting transitions the lifecycle does not allow.
    ///
    /// A query never goes back to `Pending` once it has been seen `Running`, and terminal
    /// states are final.
    pub fn transition(self, next: QueryState) -> Result<QueryState, QueryError> {
        use QueryState::*;

        let allowed = match (self, next) {
            (from, _) if from.is_terminal() => false,
            (_, TimedOut | Cancelled) => true,
            (Submitted | Pending, Pending | Running | Succeeded | Failed) => true,
            (Running, Running | Succeeded | Failed) => true,
            _ => false,
        };

        if allowed {
            Ok(next)
        } else {
            Err(QueryError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueryState::Submitted => "submitted",
            QueryState::Pending => "pending",
            QueryState::Running => "running",
            QueryState::Succeeded => "succeeded",
            QueryState::Failed => "failed",
            QueryState::TimedOut => "timed out",
            QueryState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use QueryState::*;

    #[test]
    fn test_status_wire_format() -> Result<(), Box<dyn std::error::Error>> {
        let status: QueryStatus = serde_json::from_str(r#"{"status": "running"}"#)?;
        assert_eq!(status, QueryStatus::Running);

        let failed: QueryStatus =
            serde_json::from_str(r#"{"status": "failed", "reason": "out of quota"}"#)?;
        assert_eq!(
            failed,
            QueryStatus::Failed {
                reason: Some("out of quota".to_string())
            }
        );

        let bare: QueryStatus = serde_json::from_str(r#"{"status": "failed"}"#)?;
        assert_eq!(bare, QueryStatus::Failed { reason: None });
        assert_eq!(serde_json::to_string(&QueryStatus::Pending)?, r#"{"status":"pending"}"#);
        Ok(())
    }

    #[test]
    fn test_forward_transitions() {
        assert_eq!(Submitted.transition(Pending).unwrap(), Pending);
        assert_eq!(Pending.transition(Pending).unwrap(), Pending);
        assert_eq!(Pending.transition(Running).unwrap(), Running);
        assert_eq!(Running.transition(Running).unwrap(), Running);
        assert_eq!(Running.transition(Succeeded).unwrap(), Succeeded);
        assert_eq!(Submitted.transition(Failed).unwrap(), Failed);
        assert_eq!(Running.transition(TimedOut).unwrap(), TimedOut);
        assert_eq!(Submitted.transition(Cancelled).unwrap(), Cancelled);
    }

    #[test]
    fn test_rejected_transitions() {
        assert!(matches!(
            Running.transition(Pending),
            Err(QueryError::InvalidTransition {
                from: Running,
                to: Pending
            })
        ));
        assert!(Pending.transition(Submitted).is_err());
        for terminal in [Succeeded, Failed, TimedOut, Cancelled] {
            assert!(terminal.is_terminal());
            assert!(terminal.transition(Running).is_err());
            assert!(terminal.transition(Cancelled).is_err());
        }
        assert!(!Submitted.is_terminal());
    }
}
