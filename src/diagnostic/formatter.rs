use super::{Diagnostic, List};
use crate::{SourceFile, SourceLocation, Span};

use std::fmt::Write as _;

/// Controls what [`Formatter`] prints for each diagnostic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Style {
    /// Prefix each diagnostic with the file path.
    pub print_file: bool,
    /// Print the severity after the location.
    pub print_severity: bool,
    /// Print the offending source line(s) with a caret marker.
    pub print_line: bool,
    /// End the output with a line break.
    pub print_newline_at_end: bool,
    /// Number of columns a tab expands to in printed lines.
    pub tab_width: u32,
}

impl Default for Style {
    fn default() -> Self {
        Style {
            print_file: true,
            print_severity: true,
            print_line: true,
            print_newline_at_end: true,
            tab_width: 2,
        }
    }
}

/// Renders a [`List`] as `file:line:col severity: message` text.
///
/// With [`Style::print_line`] set, each located diagnostic is followed by
/// the source line it points at and a row of `^` under the span. Lines that
/// are not pure ASCII are printed without markers. Diagnostics are separated
/// by a line break, so a diagnostic that printed source lines is followed by
/// an empty line.
#[derive(Clone, Debug, Default)]
pub struct Formatter {
    style: Style,
}

impl Formatter {
    pub const fn new(style: Style) -> Self {
        Formatter { style }
    }

    pub fn format(&self, list: &List, file: &SourceFile) -> String {
        let mut out = String::new();
        for (i, diagnostic) in list.iter().enumerate() {
            if i != 0 {
                out.push('\n');
            }
            self.format_diagnostic(&mut out, diagnostic, file);
        }
        if self.style.print_newline_at_end {
            out.push('\n');
        }
        out
    }

    fn format_diagnostic(&self, out: &mut String, diagnostic: &Diagnostic, file: &SourceFile) {
        let begin = diagnostic
            .span
            .is_defined()
            .then(|| diagnostic.span.location(&file.content));

        let mut prefix = String::new();
        if self.style.print_file && !file.path.is_empty() {
            prefix.push_str(&file.path);
        }
        if let Some(ref loc) = begin {
            if !prefix.is_empty() {
                prefix.push(':');
            }
            let _ = write!(prefix, "{}:{}", loc.line_number, loc.line_position);
        }
        if self.style.print_severity {
            if !prefix.is_empty() {
                prefix.push(' ');
            }
            prefix.push_str(diagnostic.severity.as_str());
        }
        if !prefix.is_empty() {
            out.push_str(&prefix);
            out.push_str(": ");
        }
        out.push_str(&diagnostic.message);

        if let (true, Some(begin)) = (self.style.print_line, begin) {
            out.push('\n');
            let end = Span::point(diagnostic.span.end()).location(&file.content);
            self.write_lines(out, file, begin, end);
        }
    }

    fn write_lines(
        &self,
        out: &mut String,
        file: &SourceFile,
        begin: SourceLocation,
        end: SourceLocation,
    ) {
        let tab = self.style.tab_width as usize;
        for line_number in begin.line_number..=end.line_number.max(begin.line_number) {
            let text = match file.line(line_number) {
                Some(text) => text,
                None => break,
            };
            let line_len = text.chars().count() as u32;
            let first_col = if line_number == begin.line_number {
                begin.line_position
            } else {
                1
            };
            let last_col = if line_number == end.line_number {
                end.line_position
            } else {
                line_len + 1
            };
            if line_number != begin.line_number && last_col <= 1 {
                break;
            }

            for ch in text.chars() {
                match ch {
                    '\t' => out.extend(std::iter::repeat(' ').take(tab)),
                    _ => out.push(ch),
                }
            }
            out.push('\n');
            if !text.is_ascii() {
                continue;
            }

            let mut markers = 0;
            for (i, ch) in text.chars().enumerate() {
                let col = i as u32 + 1;
                if col >= last_col {
                    break;
                }
                let width = if ch == '\t' { tab } else { 1 };
                let marker = if col < first_col {
                    ' '
                } else {
                    markers += width;
                    '^'
                };
                out.extend(std::iter::repeat(marker).take(width));
            }
            if markers == 0 {
                let pad = first_col.saturating_sub(line_len + 1) as usize;
                out.extend(std::iter::repeat(' ').take(pad));
                out.push('^');
            }
            out.push('\n');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::{Diagnostic, List, Severity};

    const CONTENT: &str = "the\tcat\tsays\tmeow\nthe\tdog\tsays\twoof\nthe\tsnake\tsays\tquack\nthe\tsnail\tsays\t???\n";

    /// Byte span for a 1-based line/column range over `CONTENT`.
    fn span(begin: (usize, usize), end: (usize, usize)) -> Span {
        let offset = |(line, col): (usize, usize)| {
            CONTENT
                .split_inclusive('\n')
                .take(line - 1)
                .map(str::len)
                .sum::<usize>()
                + col
                - 1
        };
        Span::from(offset(begin)..offset(end))
    }

    fn samples() -> List {
        let mut list = List::new();
        list.add(Diagnostic::new(
            Severity::Note,
            "purr",
            span((1, 14), (1, 14)),
        ));
        list.add(Diagnostic::new(
            Severity::Warning,
            "grrr",
            span((2, 14), (2, 18)),
        ));
        list.add(Diagnostic::new(
            Severity::Error,
            "hiss",
            span((3, 16), (3, 21)),
        ));
        list
    }

    fn file() -> SourceFile {
        SourceFile::new("file.name", CONTENT)
    }

    #[test]
    fn simple() {
        let style = Style {
            print_file: false,
            print_severity: false,
            print_line: false,
            print_newline_at_end: false,
            tab_width: 2,
        };
        let got = Formatter::new(style).format(&samples(), &file());
        assert_eq!(got, "1:14: purr\n2:14: grrr\n3:16: hiss");
    }

    #[test]
    fn no_source() {
        let style = Style {
            print_line: false,
            print_newline_at_end: false,
            ..Style::default()
        };
        let list = List::from(Diagnostic::note("no source!", Span::UNDEFINED));
        let got = Formatter::new(style).format(&list, &SourceFile::new("", CONTENT));
        assert_eq!(got, "note: no source!");
    }

    #[test]
    fn with_file_severity_line() {
        let style = Style {
            print_newline_at_end: false,
            ..Style::default()
        };
        let got = Formatter::new(style).format(&samples(), &file());
        let expect = "\
file.name:1:14 note: purr
the  cat  says  meow
                ^

file.name:2:14 warning: grrr
the  dog  says  woof
                ^^^^

file.name:3:16 error: hiss
the  snake  says  quack
                  ^^^^^
";
        assert_eq!(got, expect);
    }

    #[test]
    fn multi_line() {
        let style = Style {
            print_file: false,
            print_severity: false,
            print_newline_at_end: false,
            ..Style::default()
        };
        let list = List::from(Diagnostic::warning("multiline", span((2, 9), (4, 15))));
        let got = Formatter::new(style).format(&list, &file());
        let expect = "\
2:9: multiline
the  dog  says  woof
          ^^^^^^^^^^
the  snake  says  quack
^^^^^^^^^^^^^^^^^^^^^^^
the  snail  says  ???
^^^^^^^^^^^^^^^^
";
        assert_eq!(got, expect);
    }

    #[test]
    fn tab_width_four() {
        let style = Style {
            print_newline_at_end: false,
            tab_width: 4,
            ..Style::default()
        };
        let list = List::from(Diagnostic::warning("grrr", span((2, 14), (2, 18))));
        let got = Formatter::new(style).format(&list, &file());
        let expect = "\
file.name:2:14 warning: grrr
the    dog    says    woof
                      ^^^^
";
        assert_eq!(got, expect);
    }

    #[test]
    fn ice_with_newline_at_end() {
        let list = List::from(Diagnostic::new(
            Severity::InternalCompilerError,
            "unreachable",
            span((4, 16), (4, 19)),
        ));
        let got = Formatter::default().format(&list, &file());
        let expect = "\
file.name:4:16 internal compiler error: unreachable
the  snail  says  ???
                  ^^^

";
        assert_eq!(got, expect);
    }

    #[test]
    fn non_ascii_lines_have_no_markers() {
        let file = SourceFile::new("test.wgsl", "fn f\u{e9}() {}");
        let list = List::from(Diagnostic::error("oops", Span::new(3, 4)));
        let style = Style {
            print_newline_at_end: false,
            ..Style::default()
        };
        let got = Formatter::new(style).format(&list, &file);
        assert_eq!(got, "test.wgsl:1:4 error: oops\nfn f\u{e9}() {}\n");
    }

    #[test]
    fn caret_past_end_of_line() {
        let file = SourceFile::new("test.wgsl", "fn f() { loop {");
        let list = List::from(Diagnostic::error(
            "expected '}' for loop",
            Span::point(15),
        ));
        let style = Style {
            print_newline_at_end: false,
            ..Style::default()
        };
        let got = Formatter::new(style).format(&list, &file);
        let expect = "\
test.wgsl:1:16 error: expected '}' for loop
fn f() { loop {
               ^
";
        assert_eq!(got, expect);
    }
}
