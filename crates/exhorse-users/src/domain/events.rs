//! Domain events and constants for the USER context.

use serde::{Deserialize, Serialize};

/// Aggregate name of the USER stream.
pub const USER_AGGREGATE: &str = "USER";

/// Event type recorded on every sign-in attempt.
pub const LOGIN_EVENT_TYPE: &str = "LOGIN";

/// Role given to every account at sign-up.
pub const ROLE_MEMBER: &str = "MEMBER";

/// Fields owned by the account itself. Callers cannot set them through a
/// profile replace, and views never list them as profile fields.
pub const ACCOUNT_FIELDS: [&str; 5] = ["username", "password", "role", "lastLoginAt", "loginCount"];

/// Payload of a `LOGIN` event. Never carries the password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginAttempted {
    /// Username that was presented.
    pub username: String,
    /// Whether the password matched.
    pub succeeded: bool,
}
