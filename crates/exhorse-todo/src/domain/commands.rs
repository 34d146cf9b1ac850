//! Commands for the TODO context.

use exhorse_core::command::Command;
use uuid::Uuid;

/// Command to create a todo.
#[derive(Debug, Clone)]
pub struct CreateTodo {
    /// Caller issuing the command, if known.
    pub actor: Option<String>,
    /// User who owns the todo.
    pub author_id: Uuid,
    /// Short description; must not be empty.
    pub title: String,
    /// Initial tags.
    pub tags: Vec<String>,
}

/// Command to change part of a todo. `None` fields are left untouched and
/// tags are appended to the existing ones.
#[derive(Debug, Clone)]
pub struct PatchTodo {
    /// Caller issuing the command, if known.
    pub actor: Option<String>,
    /// The todo identifier.
    pub todo_id: Uuid,
    /// New title.
    pub title: Option<String>,
    /// Tags to add.
    pub tags: Option<Vec<String>>,
}

/// Command to replace a todo's title and tags. Tags not listed are dropped.
/// The author and completion state carry over.
#[derive(Debug, Clone)]
pub struct ReplaceTodo {
    /// Caller issuing the command, if known.
    pub actor: Option<String>,
    /// The todo identifier.
    pub todo_id: Uuid,
    /// New title; must not be empty.
    pub title: String,
    /// The complete tag list.
    pub tags: Vec<String>,
}

/// Command to mark a todo done.
#[derive(Debug, Clone)]
pub struct CompleteTodo {
    /// Caller issuing the command, if known.
    pub actor: Option<String>,
    /// The todo identifier.
    pub todo_id: Uuid,
}

/// Command to delete a todo.
#[derive(Debug, Clone)]
pub struct DeleteTodo {
    /// Caller issuing the command, if known.
    pub actor: Option<String>,
    /// The todo identifier.
    pub todo_id: Uuid,
}

impl Command for CreateTodo {
    fn command_type(&self) -> &'static str {
        "todo.create"
    }

    fn actor(&self) -> Option<&str> {
        self.actor.as_deref()
    }
}

impl Command for PatchTodo {
    fn command_type(&self) -> &'static str {
        "todo.patch"
    }

    fn actor(&self) -> Option<&str> {
        self.actor.as_deref()
    }
}

impl Command for ReplaceTodo {
    fn command_type(&self) -> &'static str {
        "todo.replace"
    }

    fn actor(&self) -> Option<&str> {
        self.actor.as_deref()
    }
}

impl Command for CompleteTodo {
    fn command_type(&self) -> &'static str {
        "todo.complete"
    }

    fn actor(&self) -> Option<&str> {
        self.actor.as_deref()
    }
}

impl Command for DeleteTodo {
    fn command_type(&self) -> &'static str {
        "todo.delete"
    }

    fn actor(&self) -> Option<&str> {
        self.actor.as_deref()
    }
}
