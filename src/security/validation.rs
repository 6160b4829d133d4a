//! Lexical SQL validation against a security policy.
//!
//! The validator looks at the leading verb of a statement and runs a fixed
//! battery of pattern checks. It is a heuristic, not a parser: keywords inside
//! string literals or identifiers can trip it, and encoded payloads can slip by.
//! Comment markers inside string literals are not recognized as literals, so
//! the procedure, file and timing checks also run on the unstripped text.

use crate::security::SecurityPolicy;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use thiserror::Error;

/// Pattern rules that reject a statement regardless of its verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DangerousRule {
    /// `;` followed by a blocked verb.
    StackedStatement,
    /// `UNION` followed somewhere by a blocked verb.
    UnionEscalation,
    /// `EXEC`, `EXECUTE`, `SP_`, `XP_`.
    StoredProcedure,
    /// `LOAD_FILE`, `INTO OUTFILE`, `INTO DUMPFILE`.
    FileSystem,
    /// `BENCHMARK`, `SLEEP`.
    Timing,
}

impl fmt::Display for DangerousRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DangerousRule::StackedStatement => {
                write!(f, "multiple statements with dangerous operations")
            }
            DangerousRule::UnionEscalation => write!(f, "UNION with dangerous operations"),
            DangerousRule::StoredProcedure => write!(f, "stored procedure execution"),
            DangerousRule::FileSystem => write!(f, "file system operations"),
            DangerousRule::Timing => write!(f, "timing attack functions"),
        }
    }
}

/// Reason a statement was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("empty query not allowed")]
    EmptyQuery,

    #[error(
        "operation '{operation}' is blocked for security reasons. \
         Only read-only operations are allowed: {allowed}"
    )]
    BlockedOperation { operation: String, allowed: String },

    #[error("operation '{operation}' is not allowed. Allowed operations: {allowed}")]
    NotAllowed { operation: String, allowed: String },

    #[error("dangerous SQL pattern detected: {rule}")]
    DangerousPattern { rule: DangerousRule },
}

/// Verb-independent patterns, compiled once.
///
/// All patterns are hardcoded constants that have been verified to be valid regex.
static FIXED_PATTERNS: Lazy<Vec<(Regex, DangerousRule)>> = Lazy::new(|| {
    fn compile(pattern: &str) -> Regex {
        Regex::new(pattern).unwrap_or_else(|e| {
            panic!("Internal error: invalid regex pattern '{}': {}", pattern, e)
        })
    }

    vec![
        (compile(r"EXEC|EXECUTE|SP_|XP_"), DangerousRule::StoredProcedure),
        (
            compile(r"LOAD_FILE|INTO\s+OUTFILE|INTO\s+DUMPFILE"),
            DangerousRule::FileSystem,
        ),
        (compile(r"BENCHMARK|SLEEP"), DangerousRule::Timing),
    ]
});

/// Validator bound to one security policy.
///
/// Escalation patterns are derived from the policy's block-list when the
/// validator is built, so swapping policies means building a new validator.
#[derive(Debug, Clone)]
pub struct SqlValidator {
    policy: SecurityPolicy,
    stacked: Option<Regex>,
    union: Option<Regex>,
}

impl SqlValidator {
    /// Create a validator for the given policy.
    pub fn new(policy: SecurityPolicy) -> Self {
        let (stacked, union) = if policy.blocked().is_empty() {
            (None, None)
        } else {
            let verbs = policy
                .blocked()
                .iter()
                .map(|v| regex::escape(v))
                .collect::<Vec<_>>()
                .join("|");
            (
                Regex::new(&format!(r";\s*(?:{})", verbs)).ok(),
                Regex::new(&format!(r"UNION.*?(?:{})", verbs)).ok(),
            )
        };

        Self {
            policy,
            stacked,
            union,
        }
    }

    /// Validator for the read-only preset.
    pub fn safe() -> Self {
        Self::new(SecurityPolicy::safe())
    }

    /// Validator that lets everything through.
    pub fn unrestricted() -> Self {
        Self::new(SecurityPolicy::unrestricted())
    }

    /// The policy this validator enforces.
    pub fn policy(&self) -> &SecurityPolicy {
        &self.policy
    }

    /// Validate a statement.
    ///
    /// Verb and escalation checks inspect a stripped, upper-cased working
    /// copy; the fixed battery also sees the unstripped text. Callers keep
    /// executing the original text.
    pub fn validate(&self, query: &str) -> Result<(), ValidationError> {
        if self.policy.allows_unsafe_mode() {
            return Ok(());
        }

        if query.trim().is_empty() {
            return Err(ValidationError::EmptyQuery);
        }

        let working = strip_comments(query).to_uppercase();
        let operation = leading_verb(&working);

        if self.policy.blocked().iter().any(|v| *v == operation) {
            return Err(ValidationError::BlockedOperation {
                operation,
                allowed: self.policy.allowed().join(", "),
            });
        }

        let allowed = self.policy.allowed();
        if !allowed.is_empty() && !allowed.iter().any(|v| *v == operation) {
            return Err(ValidationError::NotAllowed {
                operation,
                allowed: allowed.join(", "),
            });
        }

        if let Some(rule) = self.dangerous_pattern(&working, &query.to_uppercase()) {
            return Err(ValidationError::DangerousPattern { rule });
        }

        Ok(())
    }

    /// Check a single verb against the policy lists.
    pub fn is_operation_allowed(&self, operation: &str) -> bool {
        self.policy.is_operation_allowed(operation)
    }

    fn dangerous_pattern(&self, working: &str, raw: &str) -> Option<DangerousRule> {
        if self.stacked.as_ref().is_some_and(|re| re.is_match(working)) {
            return Some(DangerousRule::StackedStatement);
        }

        if self.union.as_ref().is_some_and(|re| re.is_match(working)) {
            return Some(DangerousRule::UnionEscalation);
        }

        FIXED_PATTERNS
            .iter()
            .find(|(pattern, _)| pattern.is_match(working) || pattern.is_match(raw))
            .map(|(_, rule)| *rule)
    }
}

impl Default for SqlValidator {
    fn default() -> Self {
        Self::safe()
    }
}

/// First whitespace-delimited token of the working copy.
fn leading_verb(working: &str) -> String {
    working
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Remove `-- ...` line comments and `/* ... */` block comments.
///
/// Whichever comment opener appears first wins, so `/* -- */` is one block.
/// Block comments become a single space; an unclosed block comment swallows
/// the rest of the text.
fn strip_comments(query: &str) -> String {
    let mut out = String::with_capacity(query.len());
    let mut rest = query;

    loop {
        let (start, is_block) = match (rest.find("--"), rest.find("/*")) {
            (None, None) => {
                out.push_str(rest);
                break;
            }
            (Some(line), Some(block)) if block < line => (block, true),
            (Some(line), _) => (line, false),
            (None, Some(block)) => (block, true),
        };

        out.push_str(&rest[..start]);

        if is_block {
            match rest[start + 2..].find("*/") {
                Some(end) => {
                    out.push(' ');
                    rest = &rest[start + 2 + end + 2..];
                }
                None => break,
            }
        } else {
            match rest[start..].find('\n') {
                Some(newline) => rest = &rest[start + newline..],
                None => break,
            }
        }
    }

    out
}
