//! Commands for the USER context.

use exhorse_core::command::Command;
use serde_json::{Map, Value};
use uuid::Uuid;

/// Command to register a new account.
#[derive(Debug, Clone)]
pub struct SignUp {
    /// Caller issuing the command, if known.
    pub actor: Option<String>,
    /// Desired username; must be unused.
    pub username: String,
    /// Plain-text password, hashed before it is stored.
    pub password: String,
}

/// Command to authenticate.
#[derive(Debug, Clone)]
pub struct SignIn {
    /// Caller issuing the command, if known.
    pub actor: Option<String>,
    /// Username to authenticate as.
    pub username: String,
    /// Plain-text password to check.
    pub password: String,
}

/// Command to change a username.
#[derive(Debug, Clone)]
pub struct RenameUser {
    /// Caller issuing the command, if known.
    pub actor: Option<String>,
    /// The user identifier.
    pub user_id: Uuid,
    /// New username; must be unused.
    pub username: String,
}

/// Command to replace a user's username and profile fields. Profile fields
/// absent from `profile` are dropped; the password hash, role and login
/// bookkeeping are kept.
#[derive(Debug, Clone)]
pub struct ReplaceUser {
    /// Caller issuing the command, if known.
    pub actor: Option<String>,
    /// The user identifier.
    pub user_id: Uuid,
    /// New username; must be unused by anyone else.
    pub username: String,
    /// Free-form profile fields.
    pub profile: Map<String, Value>,
}

/// Command to delete an account.
#[derive(Debug, Clone)]
pub struct DeleteUser {
    /// Caller issuing the command, if known.
    pub actor: Option<String>,
    /// The user identifier.
    pub user_id: Uuid,
}

impl Command for SignUp {
    fn command_type(&self) -> &'static str {
        "user.sign_up"
    }

    fn actor(&self) -> Option<&str> {
        self.actor.as_deref()
    }
}

impl Command for SignIn {
    fn command_type(&self) -> &'static str {
        "user.sign_in"
    }

    fn actor(&self) -> Option<&str> {
        self.actor.as_deref()
    }
}

impl Command for RenameUser {
    fn command_type(&self) -> &'static str {
        "user.rename"
    }

    fn actor(&self) -> Option<&str> {
        self.actor.as_deref()
    }
}

impl Command for ReplaceUser {
    fn command_type(&self) -> &'static str {
        "user.replace"
    }

    fn actor(&self) -> Option<&str> {
        self.actor.as_deref()
    }
}

impl Command for DeleteUser {
    fn command_type(&self) -> &'static str {
        "user.delete"
    }

    fn actor(&self) -> Option<&str> {
        self.actor.as_deref()
    }
}
