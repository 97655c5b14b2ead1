use std::ops::Range;

/// A source code span, used for error reporting.
///
/// Offsets are byte indices into the source text. `end` is exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct Span {
    start: u32,
    end: u32,
}

impl Span {
    pub const UNDEFINED: Self = Self { start: 0, end: 0 };

    /// Creates a new `Span` from a range of byte indices
    ///
    /// Note: end is exclusive, it doesn't belong to the `Span`
    pub const fn new(start: u32, end: u32) -> Self {
        Span { start, end }
    }

    /// A zero-width span at `offset`.
    pub const fn point(offset: u32) -> Self {
        Span {
            start: offset,
            end: offset,
        }
    }

    pub const fn start(&self) -> u32 {
        self.start
    }

    pub const fn end(&self) -> u32 {
        self.end
    }

    pub const fn len(&self) -> u32 {
        self.end - self.start
    }

    /// Returns a new `Span` starting at `self` and ending at `other`
    pub const fn until(&self, other: &Self) -> Self {
        Span {
            start: self.start,
            end: other.end,
        }
    }

    /// Modifies `self` to contain the smallest `Span` possible that
    /// contains both `self` and `other`
    pub fn subsume(&mut self, other: Self) {
        *self = if !self.is_defined() {
            // self isn't defined so use other
            other
        } else if !other.is_defined() {
            // other isn't defined so don't try to subsume
            *self
        } else {
            Span {
                start: self.start.min(other.start),
                end: self.end.max(other.end),
            }
        }
    }

    /// Returns the smallest `Span` possible that contains all the `Span`s
    /// defined in the `from` iterator
    pub fn total_span<T: Iterator<Item = Self>>(from: T) -> Self {
        let mut span: Self = Default::default();
        for other in from {
            span.subsume(other);
        }
        span
    }

    /// Converts `self` to a range if the span is not unknown
    pub fn to_range(self) -> Option<Range<usize>> {
        if self.is_defined() {
            Some(self.start as usize..self.end as usize)
        } else {
            None
        }
    }

    /// Check whether `self` was defined or is a default/unknown span
    pub fn is_defined(&self) -> bool {
        *self != Self::default()
    }

    /// Return a [`SourceLocation`] for this span in the provided source.
    ///
    /// Lines and columns are 1-based. Columns count characters, not bytes.
    pub fn location(&self, source: &str) -> SourceLocation {
        let start = (self.start as usize).min(source.len());
        let prefix = source.get(..start).unwrap_or(source);
        let line_number = prefix.matches('\n').count() as u32 + 1;
        let line_start = prefix.rfind('\n').map(|pos| pos + 1).unwrap_or(0);
        let line_position = prefix[line_start..].chars().count() as u32 + 1;

        SourceLocation {
            line_number,
            line_position,
            offset: self.start,
            length: self.end - self.start,
        }
    }
}

impl From<Range<usize>> for Span {
    fn from(range: Range<usize>) -> Self {
        Span {
            start: range.start as u32,
            end: range.end as u32,
        }
    }
}

impl std::ops::Index<Span> for str {
    type Output = str;

    #[inline]
    fn index(&self, span: Span) -> &str {
        &self[span.start as usize..span.end as usize]
    }
}

/// A human-readable representation for a span, tailored for text source.
///
/// Roughly corresponds to the positional members of [`GPUCompilationMessage`][gcm] from
/// the WebGPU specification, except
/// - `offset` and `length` are in bytes (UTF-8 code units), instead of UTF-16 code units.
/// - `line_position` is in characters (Unicode scalar values), instead of UTF-16 code units.
///
/// All positions are 1-based.
///
/// [gcm]: https://www.w3.org/TR/webgpu/#gpucompilationmessage
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SourceLocation {
    /// 1-based line number.
    pub line_number: u32,
    /// 1-based column in characters of the start of the span.
    pub line_position: u32,
    /// 0-based Offset in code units (in bytes) of the start of the span.
    pub offset: u32,
    /// Length in code units (in bytes) of the span.
    pub length: u32,
}

/// A named piece of source text that spans point into.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceFile {
    pub path: String,
    pub content: String,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        SourceFile {
            path: path.into(),
            content: content.into(),
        }
    }

    /// Returns the text of the 1-based `line`, without its line break.
    pub fn line(&self, line: u32) -> Option<&str> {
        self.content.split('\n').nth(line.checked_sub(1)? as usize).map(|text| {
            text.strip_suffix('\r').unwrap_or(text)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_counts_characters() {
        let source = "fn f() {\n  let ä = 1;\n}";
        let offset = source.find('=').unwrap();
        let span = Span::from(offset..offset + 1);
        let loc = span.location(source);
        assert_eq!(loc.line_number, 2);
        assert_eq!(loc.line_position, 9);
        assert_eq!(loc.length, 1);
    }

    #[test]
    fn subsume_ignores_undefined() {
        let mut span = Span::UNDEFINED;
        span.subsume(Span::new(4, 8));
        assert_eq!(span, Span::new(4, 8));
        span.subsume(Span::new(1, 5));
        assert_eq!(span, Span::new(1, 8));
        span.subsume(Span::UNDEFINED);
        assert_eq!(span, Span::new(1, 8));
    }

    #[test]
    fn source_file_lines() {
        let file = SourceFile::new("test.wgsl", "a\r\nb\nc");
        assert_eq!(file.line(1), Some("a"));
        assert_eq!(file.line(3), Some("c"));
        assert_eq!(file.line(0), None);
        assert_eq!(file.line(4), None);
    }
}
