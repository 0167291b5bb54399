//! Mock token issuer.
//!
//! # Example
//!
//! ```rust,ignore
//! use classroom_test_utils::MockTokenIssuer;
//!
//! let issuer = MockTokenIssuer::rejecting();
//! // session.initialize() now fails with an Auth error
//! assert_eq!(issuer.call_count(), 0);
//! ```

use async_trait::async_trait;
use classroom_session::transport::TokenIssuer;
use classroom_session::SessionError;
use common::secret::SecretString;
use common::types::ParticipantId;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IssuerBehavior {
    Accept,
    Reject,
    Fail,
}

/// Token issuer that never leaves the process.
#[derive(Debug)]
pub struct MockTokenIssuer {
    behavior: IssuerBehavior,
    call_count: AtomicUsize,
}

impl MockTokenIssuer {
    /// Issue `token-{participant_id}` for every request.
    #[must_use]
    pub fn accepting() -> Self {
        Self::with_behavior(IssuerBehavior::Accept)
    }

    /// Reject every participant, as the endpoint does for unknown users.
    #[must_use]
    pub fn rejecting() -> Self {
        Self::with_behavior(IssuerBehavior::Reject)
    }

    /// Fail every request as if the endpoint were unreachable.
    #[must_use]
    pub fn failing() -> Self {
        Self::with_behavior(IssuerBehavior::Fail)
    }

    fn with_behavior(behavior: IssuerBehavior) -> Self {
        Self {
            behavior,
            call_count: AtomicUsize::new(0),
        }
    }

    /// Wrap in an `Arc` for `ClassroomSession::new`.
    #[must_use]
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Number of token requests made.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenIssuer for MockTokenIssuer {
    async fn issue_token(
        &self,
        participant_id: &ParticipantId,
    ) -> Result<SecretString, SessionError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        match self.behavior {
            IssuerBehavior::Accept => Ok(SecretString::from(format!("token-{participant_id}"))),
            IssuerBehavior::Reject => Err(SessionError::Auth(format!(
                "token request rejected for {participant_id}"
            ))),
            IssuerBehavior::Fail => Err(SessionError::Transport(
                "Mock token endpoint unavailable".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use classroom_session::ErrorKind;
    use common::secret::ExposeSecret;

    #[tokio::test]
    async fn test_mock_token_issuer_behaviors() {
        let id = ParticipantId::from("alice");

        let issuer = MockTokenIssuer::accepting();
        let token = issuer.issue_token(&id).await.unwrap();
        assert_eq!(token.expose_secret(), "token-alice");

        let issuer = MockTokenIssuer::rejecting();
        let err = issuer.issue_token(&id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Auth);

        let issuer = MockTokenIssuer::failing();
        let err = issuer.issue_token(&id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(issuer.call_count(), 1);
    }
}
