//! Diagnostic codes for categorizing interpreter errors and warnings.
//!
//! This module provides the [`DiagnosticCode`] type for uniquely identifying
//! diagnostic messages, matching the error kinds named in the error handling
//! design: file load, lexical, syntactic, internal-compiler, and runtime.
//!
//! # Examples
//!
//! ```
//! use nua_util::diagnostic::DiagnosticCode;
//!
//! let code = DiagnosticCode::E_LEXER_UNEXPECTED_CHAR;
//! assert_eq!(code.prefix(), "E");
//! assert_eq!(code.number(), 201);
//! assert_eq!(code.as_str(), "E0201");
//! ```

/// A unique code identifying a diagnostic message
///
/// Diagnostic codes follow the format `{prefix}{number}` where:
/// - `prefix` is typically "E" for errors or "W" for warnings
/// - `number` is a 4-digit number (padded with zeros)
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagnosticCode {
    /// The prefix (e.g., "E" for error, "W" for warning)
    pub prefix: &'static str,
    /// The numeric identifier
    pub number: u32,
}

impl DiagnosticCode {
    /// Create a new diagnostic code
    #[inline]
    pub const fn new(prefix: &'static str, number: u32) -> Self {
        Self { prefix, number }
    }

    /// Get the prefix (e.g., "E" for error, "W" for warning)
    #[inline]
    pub const fn prefix(&self) -> &'static str {
        self.prefix
    }

    /// Get the numeric identifier
    #[inline]
    pub const fn number(&self) -> u32 {
        self.number
    }

    /// Get the full code string (e.g., "E0001", "W0001")
    pub fn as_str(&self) -> String {
        format!("{}{:04}", self.prefix, self.number)
    }

    // =========================================================================
    // FILE LOAD (E01xx)
    // =========================================================================

    /// E0101: Source file could not be read
    pub const E_FILE_NOT_FOUND: Self = Self::new("E", 101);

    // =========================================================================
    // LEXICAL (E02xx)
    // =========================================================================

    /// E0201: Unexpected character in source
    pub const E_LEXER_UNEXPECTED_CHAR: Self = Self::new("E", 201);
    /// E0202: Unterminated string literal
    pub const E_LEXER_UNTERMINATED_STRING: Self = Self::new("E", 202);
    /// E0203: Bare newline inside a string literal
    pub const E_LEXER_NEWLINE_IN_STRING: Self = Self::new("E", 203);

    // =========================================================================
    // SYNTACTIC (E03xx)
    // =========================================================================

    /// E0301: Unexpected token
    pub const E_PARSER_UNEXPECTED_TOKEN: Self = Self::new("E", 301);
    /// E0302: Expected a specific token or keyword that was missing
    pub const E_PARSER_EXPECTED_TOKEN: Self = Self::new("E", 302);
    /// E0303: Unexpected end of input
    pub const E_PARSER_UNEXPECTED_EOF: Self = Self::new("E", 303);
    /// E0304: Statement used outside a loop (`break`/`continue`)
    pub const E_PARSER_NOT_IN_LOOP: Self = Self::new("E", 304);

    // =========================================================================
    // INTERNAL COMPILER INVARIANT (E04xx)
    // =========================================================================

    /// E0401: Temporary-register balance assertion failed
    pub const E_COMPILER_TEMP_IMBALANCE: Self = Self::new("E", 401);
    /// E0402: Attempted to retarget an instruction outside `op_retarget`
    pub const E_COMPILER_BAD_RETARGET: Self = Self::new("E", 402);

    // =========================================================================
    // RUNTIME (E05xx)
    // =========================================================================

    /// E0501: Called a value that is not a function
    pub const E_RUNTIME_NOT_CALLABLE: Self = Self::new("E", 501);
    /// E0502: Arithmetic on a non-number operand
    pub const E_RUNTIME_NOT_A_NUMBER: Self = Self::new("E", 502);
    /// E0503: Table operation on a non-table operand
    pub const E_RUNTIME_NOT_A_TABLE: Self = Self::new("E", 503);

    // =========================================================================
    // WARNINGS (W0xxx)
    // =========================================================================

    /// W0001: Unused local variable
    pub const W_UNUSED_VARIABLE: Self = Self::new("W", 1);
}

impl std::fmt::Debug for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DiagnosticCode({})", self.as_str())
    }
}

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_code_roundtrips() {
        let code = DiagnosticCode::new("E", 201);
        assert_eq!(code.prefix(), "E");
        assert_eq!(code.number(), 201);
        assert_eq!(code.as_str(), "E0201");
    }

    #[test]
    fn display_matches_as_str() {
        let code = DiagnosticCode::E_RUNTIME_NOT_CALLABLE;
        assert_eq!(format!("{code}"), code.as_str());
    }

    #[test]
    fn codes_compare_by_value() {
        assert_eq!(DiagnosticCode::E_LEXER_UNEXPECTED_CHAR, DiagnosticCode::new("E", 201));
        assert_ne!(DiagnosticCode::E_LEXER_UNEXPECTED_CHAR, DiagnosticCode::E_LEXER_UNTERMINATED_STRING);
    }
}
