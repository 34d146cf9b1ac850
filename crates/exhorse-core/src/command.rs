//! Command abstractions.

/// Trait that all commands implement.
pub trait Command: Send + Sync + std::fmt::Debug {
    /// The type name for this command (for logging/routing).
    fn command_type(&self) -> &'static str;

    /// Identity of the caller issuing the command, recorded verbatim on
    /// every event it produces. `None` for system-generated commands.
    fn actor(&self) -> Option<&str>;
}
