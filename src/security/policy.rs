//! Security policies governing which statement verbs may execute.

use crate::constants::{ALL_OPERATIONS, SAFE_ALLOWED_OPERATIONS, SAFE_BLOCKED_OPERATIONS};
use crate::error::ServerError;
use serde::{Deserialize, Serialize};

/// Allow-list and block-list of statement verbs plus the unsafe-mode switch.
///
/// Verbs are stored upper-cased and de-duplicated, in the order given.
/// Deserialization goes through [`SecurityPolicy::custom`] or
/// [`SecurityPolicy::unrestricted`], so it enforces the same rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PolicyFields")]
pub struct SecurityPolicy {
    allowed_operations: Vec<String>,
    blocked_operations: Vec<String>,
    allow_unsafe_mode: bool,
}

impl SecurityPolicy {
    /// Read-only preset: SELECT, SHOW, DESCRIBE and EXPLAIN; writes, DDL and
    /// privilege changes are blocked.
    pub fn safe() -> Self {
        Self {
            allowed_operations: normalize(SAFE_ALLOWED_OPERATIONS.iter().copied()),
            blocked_operations: normalize(SAFE_BLOCKED_OPERATIONS.iter().copied()),
            allow_unsafe_mode: false,
        }
    }

    /// Preset that permits every statement. Both lists are empty and ignored.
    pub fn unrestricted() -> Self {
        Self {
            allowed_operations: Vec::new(),
            blocked_operations: Vec::new(),
            allow_unsafe_mode: true,
        }
    }

    /// Build a custom restrictive policy.
    ///
    /// The allow-list must name at least one verb; a verb may not be both
    /// allowed and blocked.
    pub fn custom<A, B, S>(allowed: A, blocked: B) -> Result<Self, ServerError>
    where
        A: IntoIterator<Item = S>,
        B: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed_operations = normalize(allowed);
        let blocked_operations = normalize(blocked);

        if allowed_operations.is_empty() {
            return Err(ServerError::config(
                "a restrictive security policy needs at least one allowed operation",
            ));
        }

        if let Some(both) = allowed_operations
            .iter()
            .find(|verb| blocked_operations.contains(verb))
        {
            return Err(ServerError::config(format!(
                "operation '{}' cannot be both allowed and blocked",
                both
            )));
        }

        Ok(Self {
            allowed_operations,
            blocked_operations,
            allow_unsafe_mode: false,
        })
    }

    /// Whether every statement is permitted.
    pub fn allows_unsafe_mode(&self) -> bool {
        self.allow_unsafe_mode
    }

    /// Configured allow-list, regardless of mode.
    pub fn allowed(&self) -> &[String] {
        &self.allowed_operations
    }

    /// Configured block-list, regardless of mode.
    pub fn blocked(&self) -> &[String] {
        &self.blocked_operations
    }

    /// Allow-list as reported to callers: `["ALL_OPERATIONS"]` while unsafe.
    pub fn reported_allowed(&self) -> Vec<String> {
        if self.allow_unsafe_mode {
            vec![ALL_OPERATIONS.to_string()]
        } else {
            self.allowed_operations.clone()
        }
    }

    /// Block-list as reported to callers: empty while unsafe.
    pub fn reported_blocked(&self) -> Vec<String> {
        if self.allow_unsafe_mode {
            Vec::new()
        } else {
            self.blocked_operations.clone()
        }
    }

    /// Check a single verb against the lists, without any pattern checks.
    pub fn is_operation_allowed(&self, operation: &str) -> bool {
        if self.allow_unsafe_mode {
            return true;
        }

        let operation = operation.trim().to_uppercase();

        if self.blocked_operations.contains(&operation) {
            return false;
        }

        if !self.allowed_operations.is_empty() {
            return self.allowed_operations.contains(&operation);
        }

        true
    }
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self::safe()
    }
}

/// Wire shape of a policy before validation.
#[derive(Deserialize)]
struct PolicyFields {
    #[serde(default)]
    allowed_operations: Vec<String>,
    #[serde(default)]
    blocked_operations: Vec<String>,
    #[serde(default)]
    allow_unsafe_mode: bool,
}

impl TryFrom<PolicyFields> for SecurityPolicy {
    type Error = ServerError;

    fn try_from(fields: PolicyFields) -> Result<Self, Self::Error> {
        if fields.allow_unsafe_mode {
            Ok(Self::unrestricted())
        } else {
            Self::custom(fields.allowed_operations, fields.blocked_operations)
        }
    }
}

fn normalize<I, S>(verbs: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for verb in verbs {
        let verb = verb.as_ref().trim().to_uppercase();
        if !verb.is_empty() && !out.contains(&verb) {
            out.push(verb);
        }
    }
    out
}
