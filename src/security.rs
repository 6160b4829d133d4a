//! Security module: policies, lexical query validation, identifier checks.

mod identifiers;
mod policy;
mod validation;

pub use identifiers::{parse_qualified_name, validate_identifier, MAX_IDENTIFIER_LENGTH};
pub use policy::SecurityPolicy;
pub use validation::{DangerousRule, SqlValidator, ValidationError};
