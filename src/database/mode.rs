//! Runtime switching of the security policy a manager enforces.

use super::manager::ConnectionManager;
use crate::security::{SecurityPolicy, SqlValidator, ValidationError};
use std::sync::Arc;
use tracing::{info, warn};

impl ConnectionManager {
    /// Check a statement against the active policy. No I/O.
    pub fn validate_sql(&self, sql: &str) -> Result<(), ValidationError> {
        self.validator().validate(sql)
    }

    /// Permit every statement until [`disable_unsafe_mode`](Self::disable_unsafe_mode).
    pub fn enable_unsafe_mode(&self) {
        self.install_policy(SecurityPolicy::unrestricted());
        warn!("Unsafe mode enabled: all SQL operations are permitted");
    }

    /// Return to the read-only preset.
    pub fn disable_unsafe_mode(&self) {
        self.install_policy(SecurityPolicy::safe());
        info!("Unsafe mode disabled: only read-only operations are permitted");
    }

    pub fn is_unsafe_mode_enabled(&self) -> bool {
        self.validator().policy().allows_unsafe_mode()
    }

    /// Allowed verbs, or `["ALL_OPERATIONS"]` while unsafe.
    pub fn allowed_operations(&self) -> Vec<String> {
        self.validator().policy().reported_allowed()
    }

    /// Blocked verbs, empty while unsafe.
    pub fn blocked_operations(&self) -> Vec<String> {
        self.validator().policy().reported_blocked()
    }

    pub fn is_operation_allowed(&self, operation: &str) -> bool {
        self.validator().is_operation_allowed(operation)
    }

    /// Install a custom policy.
    pub fn set_policy(&self, policy: SecurityPolicy) {
        info!(
            unsafe_mode = policy.allows_unsafe_mode(),
            allowed = %policy.allowed().join(","),
            blocked = %policy.blocked().join(","),
            "Security policy replaced"
        );
        self.install_policy(policy);
    }

    /// Snapshot of the active policy.
    pub fn policy(&self) -> SecurityPolicy {
        self.validator().policy().clone()
    }

    fn validator(&self) -> Arc<SqlValidator> {
        Arc::clone(&self.shared.state.read().validator)
    }

    fn install_policy(&self, policy: SecurityPolicy) {
        let validator = Arc::new(SqlValidator::new(policy));
        self.shared.state.write().validator = validator;
    }
}
