//! Minimum-level guard for privileged command handlers.
//!
//! ```rust,no_run
//! use playerdb::access::{Gated, Permission, ReplySink, roles};
//! # fn demo(caller: &playerdb::storage::PlayerHandle, sink: &mut dyn ReplySink) -> Result<(), playerdb::storage::StoreError> {
//! const KICK: Permission = Permission::new(roles::MODERATOR);
//! match KICK.run(caller, sink, || "kicked")? {
//!     Gated::Allowed(msg) => println!("{msg}"),
//!     Gated::Refused => {}
//! }
//! # Ok(()) }
//! ```

use log::warn;

use crate::access::roles;
use crate::storage::{PlayerHandle, StoreError};

/// Message sent to a caller whose level is too low.
pub const REFUSAL_MESSAGE: &str = "You are not an admin.";

/// Where refusal messages go; normally the caller's chat connection.
pub trait ReplySink {
    fn send_chat_message(&mut self, message: &str);
}

impl ReplySink for Vec<String> {
    fn send_chat_message(&mut self, message: &str) {
        self.push(message.to_string());
    }
}

/// Result of a gated action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gated<T> {
    Allowed(T),
    /// The caller's level was too low and the action never ran.
    Refused,
}

impl<T> Gated<T> {
    pub fn is_refused(&self) -> bool {
        matches!(self, Gated::Refused)
    }

    pub fn allowed(self) -> Option<T> {
        match self {
            Gated::Allowed(value) => Some(value),
            Gated::Refused => None,
        }
    }
}

/// A required minimum access level. Never mutates the caller's record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permission {
    level: i32,
}

impl Default for Permission {
    fn default() -> Self {
        Self::new(roles::OWNER)
    }
}

impl Permission {
    pub const fn new(level: i32) -> Self {
        Self { level }
    }

    pub fn level(&self) -> i32 {
        self.level
    }

    /// Whether `caller` currently meets the level. Reads the stored level afresh.
    pub fn permits(&self, caller: &PlayerHandle) -> Result<bool, StoreError> {
        Ok(caller.access_level()? >= self.level)
    }

    /// Run `action` if `caller` meets the level, otherwise tell them why not.
    pub fn run<T, F>(
        &self,
        caller: &PlayerHandle,
        sink: &mut dyn ReplySink,
        action: F,
    ) -> Result<Gated<T>, StoreError>
    where
        F: FnOnce() -> T,
    {
        if self.permits(caller)? {
            return Ok(Gated::Allowed(action()));
        }
        warn!(
            target: "security",
            "Refused action requiring {} ({}) for {}",
            roles::rank_name(self.level),
            self.level,
            caller.uuid()
        );
        sink.send_chat_message(REFUSAL_MESSAGE);
        Ok(Gated::Refused)
    }
}

/// Shorthand for `Permission::new(level).run(caller, sink, action)`.
pub fn require<T, F>(
    level: i32,
    caller: &PlayerHandle,
    sink: &mut dyn ReplySink,
    action: F,
) -> Result<Gated<T>, StoreError>
where
    F: FnOnce() -> T,
{
    Permission::new(level).run(caller, sink, action)
}
