//! Exit code table for the docvault CLI.
//!
//! | Code | Constant | Meaning |
//! |------|----------|---------|
//! | 0 | `SUCCESS` | Operation completed |
//! | 1 | `INPUT` | Input/parse error |
//! | 2 | `WORKFLOW` | Workflow execution error |
//! | 3 | `INTERNAL` | Unexpected failure |
//! | 4 | `CONFIG` | Configuration error |
//! | 5 | `NOT_FOUND` | Workflow or resource not found |
//!
//! The numeric values are part of the CLI contract and stay stable.

/// Type-safe CLI exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(i32);

impl ExitCode {
    /// Operation completed successfully.
    pub const SUCCESS: ExitCode = ExitCode(0);

    /// Input could not be parsed or violated a schema.
    pub const INPUT: ExitCode = ExitCode(1);

    /// A workflow execution step failed.
    pub const WORKFLOW: ExitCode = ExitCode(2);

    /// Unexpected internal failure.
    pub const INTERNAL: ExitCode = ExitCode(3);

    /// Configuration missing or invalid.
    pub const CONFIG: ExitCode = ExitCode(4);

    /// A named workflow or resource does not exist.
    pub const NOT_FOUND: ExitCode = ExitCode(5);

    /// Numeric value for `std::process::exit`.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    /// Wrap a raw code; prefer the named constants.
    #[must_use]
    pub const fn from_i32(code: i32) -> Self {
        ExitCode(code)
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.as_i32()
    }
}
