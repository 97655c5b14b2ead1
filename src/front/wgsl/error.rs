use crate::diagnostic::{self, Formatter, List, Severity, Style};
use crate::{SourceFile, SourceLocation};

use codespan_reporting::{
    diagnostic::{Diagnostic, Label},
    files::SimpleFile,
    term::{
        self,
        termcolor::{ColorChoice, NoColor, StandardStream},
    },
};

/// WGSL source that failed to parse.
///
/// Holds every diagnostic the parser produced, warnings included, along
/// with the source they point into.
#[derive(Clone, Debug)]
pub struct ParseError {
    diagnostics: List,
    file: SourceFile,
}

impl ParseError {
    pub(super) fn new(diagnostics: List, file: SourceFile) -> Self {
        ParseError { diagnostics, file }
    }

    pub const fn diagnostics(&self) -> &List {
        &self.diagnostics
    }

    pub const fn file(&self) -> &SourceFile {
        &self.file
    }

    /// The first error message.
    pub fn message(&self) -> &str {
        self.first_error().map_or("", |d| d.message.as_str())
    }

    /// Returns a [`SourceLocation`] for the first error.
    pub fn location(&self) -> Option<SourceLocation> {
        self.first_error()
            .filter(|d| d.span.is_defined())
            .map(|d| d.span.location(&self.file.content))
    }

    fn first_error(&self) -> Option<&diagnostic::Diagnostic> {
        self.diagnostics.iter().find(|d| d.severity.is_error())
    }

    /// Render in the compact `file:line:col error: message` form, with the
    /// offending source line under each diagnostic.
    pub fn format(&self, style: Style) -> String {
        Formatter::new(style).format(&self.diagnostics, &self.file)
    }

    fn codespan_diagnostics(&self) -> impl Iterator<Item = Diagnostic<()>> + '_ {
        self.diagnostics.iter().map(|d| {
            let diagnostic = match d.severity {
                Severity::Note => Diagnostic::note(),
                Severity::Warning => Diagnostic::warning(),
                Severity::Error => Diagnostic::error(),
                Severity::InternalCompilerError | Severity::Fatal => Diagnostic::bug(),
            };
            let labels = match d.span.to_range() {
                Some(range) if d.span.is_defined() => vec![Label::primary((), range)],
                _ => Vec::new(),
            };
            diagnostic.with_message(d.message.clone()).with_labels(labels)
        })
    }

    /// Emits a summary of the error to standard error stream.
    pub fn emit_to_stderr(&self) {
        let files = SimpleFile::new(&self.file.path, &self.file.content);
        let config = term::Config::default();
        let writer = StandardStream::stderr(ColorChoice::Auto);
        let mut lock = writer.lock();
        for diagnostic in self.codespan_diagnostics() {
            if let Err(e) = term::emit(&mut lock, &config, &files, &diagnostic) {
                log::error!("cannot write error: {e}");
                return;
            }
        }
    }

    /// Emits a summary of the error to a string.
    pub fn emit_to_string(&self) -> String {
        let files = SimpleFile::new(&self.file.path, &self.file.content);
        let config = term::Config::default();
        let mut writer = NoColor::new(Vec::new());
        for diagnostic in self.codespan_diagnostics() {
            if let Err(e) = term::emit(&mut writer, &config, &files, &diagnostic) {
                log::error!("cannot write error: {e}");
                break;
            }
        }
        String::from_utf8_lossy(&writer.into_inner()).into_owned()
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ParseError {}
