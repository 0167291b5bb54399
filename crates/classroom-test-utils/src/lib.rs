//! # Classroom Test Utilities
//!
//! Shared test utilities for the classroom session core.
//!
//! Provides an in-memory transport and token issuer so sessions can be
//! driven end to end without a real video backend.
//!
//! ## Modules
//!
//! - `mock_transport` - In-memory call room shared by every connected session
//! - `mock_token_issuer` - Token issuer that accepts, rejects or fails
//! - `fixtures` - Pre-configured config, credentials and event payloads
//!
//! ## Usage
//!
//! ```rust,ignore
//! use classroom_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let transport = MockTransport::new();
//!     let teacher = joined_session(&transport, TestParticipant::new("teacher")).await;
//!     let student = joined_session(&transport, TestParticipant::new("student")).await;
//!
//!     student.raise_hand().await;
//!     // Both sessions see the same queue once the event is delivered.
//! }
//! ```

pub mod fixtures;
pub mod mock_token_issuer;
pub mod mock_transport;

// Re-export commonly used items
pub use fixtures::*;
pub use mock_token_issuer::*;
pub use mock_transport::*;
