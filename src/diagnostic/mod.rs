/*!
Source-located diagnostics shared by every stage.

The lexer, parser, resolver and SPIR-V decoder all append to a [`List`] rather
than returning early, so a caller always receives every problem found in a
pass. Whether the pass succeeded is decided by [`List::contains_errors`]: a
list holding only warnings and notes is a valid compile.

Rule-based severities (`diagnostic(off, derivative_uniformity)`) live in
[`filter`]. Rendering lives in [`Formatter`].
*/

pub mod filter;
mod formatter;
pub mod suggest;

pub use formatter::{Formatter, Style};

use crate::Span;

use std::fmt;

/// How serious a [`Diagnostic`] is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub enum Severity {
    Note,
    Warning,
    Error,
    InternalCompilerError,
    Fatal,
}

impl Severity {
    pub const fn is_error(self) -> bool {
        match self {
            Self::Note | Self::Warning => false,
            Self::Error | Self::InternalCompilerError | Self::Fatal => true,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Note => "note",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::InternalCompilerError => "internal compiler error",
            Self::Fatal => "fatal",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message about the program, pointing at the source it concerns.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    /// [`Span::UNDEFINED`] when the message is not tied to a location.
    pub span: Span,
    /// The triggering rule, for diagnostics governed by `diagnostic(...)`.
    pub rule: Option<filter::Rule>,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>, span: Span) -> Self {
        Diagnostic {
            severity,
            message: message.into(),
            span,
            rule: None,
        }
    }

    pub fn error(message: impl Into<String>, span: Span) -> Self {
        Self::new(Severity::Error, message, span)
    }

    pub fn warning(message: impl Into<String>, span: Span) -> Self {
        Self::new(Severity::Warning, message, span)
    }

    pub fn note(message: impl Into<String>, span: Span) -> Self {
        Self::new(Severity::Note, message, span)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)
    }
}

/// An append-only list of [`Diagnostic`]s.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct List {
    entries: Vec<Diagnostic>,
    error_count: usize,
}

impl List {
    pub const fn new() -> Self {
        List {
            entries: Vec::new(),
            error_count: 0,
        }
    }

    pub fn add(&mut self, diagnostic: Diagnostic) {
        if diagnostic.severity.is_error() {
            self.error_count += 1;
        }
        self.entries.push(diagnostic);
    }

    pub fn add_error(&mut self, message: impl Into<String>, span: Span) {
        self.add(Diagnostic::error(message, span));
    }

    pub fn add_warning(&mut self, message: impl Into<String>, span: Span) {
        self.add(Diagnostic::warning(message, span));
    }

    pub fn add_note(&mut self, message: impl Into<String>, span: Span) {
        self.add(Diagnostic::note(message, span));
    }

    /// Appends every entry of `other`, preserving order.
    pub fn extend(&mut self, other: List) {
        for diagnostic in other.entries {
            self.add(diagnostic);
        }
    }

    pub const fn contains_errors(&self) -> bool {
        self.error_count != 0
    }

    pub const fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.entries.iter()
    }

    pub fn last(&self) -> Option<&Diagnostic> {
        self.entries.last()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.entries
    }

    /// Renders the list without source lines, one diagnostic per line.
    ///
    /// Handy for assertions that don't care about file names.
    pub fn to_plain_string(&self, source: &str) -> String {
        let file = crate::SourceFile::new("", source);
        Formatter::new(Style {
            print_file: false,
            print_severity: true,
            print_line: false,
            print_newline_at_end: false,
            tab_width: 2,
        })
        .format(self, &file)
    }
}

impl<'a> IntoIterator for &'a List {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl From<Diagnostic> for List {
    fn from(diagnostic: Diagnostic) -> Self {
        let mut list = List::new();
        list.add(diagnostic);
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_errors_only() {
        let mut list = List::new();
        list.add_warning("w", Span::UNDEFINED);
        list.add_note("n", Span::UNDEFINED);
        assert!(!list.contains_errors());
        list.add(Diagnostic::new(
            Severity::InternalCompilerError,
            "ice",
            Span::UNDEFINED,
        ));
        list.add_error("e", Span::new(1, 2));
        assert_eq!(list.error_count(), 2);
        assert_eq!(list.len(), 4);
    }

    #[test]
    fn extend_keeps_order_and_counts() {
        let mut a = List::from(Diagnostic::error("first", Span::UNDEFINED));
        let mut b = List::new();
        b.add_error("second", Span::UNDEFINED);
        b.add_note("third", Span::UNDEFINED);
        a.extend(b);
        let messages: Vec<_> = a.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(messages, ["first", "second", "third"]);
        assert_eq!(a.error_count(), 2);
    }
}
