//! MySQL identifier checks for names that are bound into metadata queries.

use crate::error::ServerError;

/// Maximum length for MySQL identifiers.
pub const MAX_IDENTIFIER_LENGTH: usize = 64;

/// Validate that an identifier contains only allowed characters.
///
/// Names are always passed as bound parameters, but rejecting comment and
/// statement syntax early keeps error messages clear.
pub fn validate_identifier(identifier: &str) -> Result<(), ServerError> {
    if identifier.trim().is_empty() {
        return Err(ServerError::invalid_input("Identifier cannot be empty"));
    }

    if identifier.chars().count() > MAX_IDENTIFIER_LENGTH {
        return Err(ServerError::invalid_input(format!(
            "Identifier exceeds maximum length of {} characters",
            MAX_IDENTIFIER_LENGTH
        )));
    }

    let dangerous_patterns = [
        "--",   // SQL comment
        "/*",   // Multi-line comment start
        "*/",   // Multi-line comment end
        ";",    // Statement separator
        "'",    // String delimiter
        "\"",   // ANSI quoted identifier
        "`",    // MySQL quoted identifier
        "\\",   // Escape character
        "\x00", // Null byte
    ];

    for pattern in &dangerous_patterns {
        if identifier.contains(pattern) {
            return Err(ServerError::invalid_input(format!(
                "Identifier contains forbidden character sequence: {}",
                pattern.escape_default()
            )));
        }
    }

    Ok(())
}

/// Parse a potentially database-qualified table name.
///
/// Returns (database, table). Database is None if not specified.
pub fn parse_qualified_name(identifier: &str) -> Result<(Option<String>, String), ServerError> {
    validate_identifier(identifier)?;

    if let Some((schema, name)) = identifier.split_once('.') {
        if !schema.is_empty() && !name.is_empty() {
            validate_identifier(name)?;
            return Ok((Some(schema.to_string()), name.to_string()));
        }
        return Err(ServerError::invalid_input(format!(
            "Malformed qualified name: {}",
            identifier
        )));
    }

    Ok((None, identifier.to_string()))
}
