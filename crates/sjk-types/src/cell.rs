//! Cell identity and source-location bookkeeping.

use crate::MagicDirective;

/// One submission from the notebook client, identified by its execution
/// counter.
///
/// A cell is created on each `execute_request`, consumed by the
/// supervisor or the installer, and retained in session history. The
/// synthetic file name is what the Swift compiler sees in diagnostics,
/// so errors point at the cell coordinate the user is looking at.
#[derive(Debug, Clone)]
pub struct Cell {
    /// Execution counter value assigned to this cell (1-based).
    pub number: u32,
    /// The raw text as submitted.
    pub raw: String,
    /// Magic directives extracted by the preprocessor.
    pub magics: Vec<MagicDirective>,
    /// Residual Swift source after magic removal.
    pub swift_source: String,
}

impl Cell {
    /// Creates a cell for the given execution counter.
    #[must_use]
    pub fn new(number: u32, raw: impl Into<String>) -> Self {
        Self {
            number,
            raw: raw.into(),
            magics: Vec::new(),
            swift_source: String::new(),
        }
    }

    /// Synthetic file name used in source-location directives.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("<Cell {}>", self.number)
    }

    /// The `#sourceLocation` directive naming this cell, starting at
    /// line 1.
    #[must_use]
    pub fn location_directive(&self) -> String {
        format!("#sourceLocation(file: \"{}\", line: 1)", self.file_name())
    }

    /// Returns `source` with this cell's location directive prepended.
    ///
    /// The directive is emitted exactly once per cell; callers must not
    /// stack another one on top.
    #[must_use]
    pub fn source_with_location(&self, source: &str) -> String {
        format!("{}\n{}", self.location_directive(), source)
    }
}
