/*!
Front end for consuming [WebGPU Shading Language][wgsl].

[wgsl]: https://gpuweb.github.io/gpuweb/wgsl.html
*/

mod error;
pub mod parse;

pub use error::ParseError;

use crate::{ast, diagnostic::List, SourceFile};

#[derive(Clone, Debug)]
pub struct Options {
    /// Stop after this many errors. `None` keeps going to the end of the
    /// source.
    pub max_errors: Option<usize>,
    /// Name printed in diagnostics.
    pub file_path: String,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            max_errors: None,
            file_path: "wgsl".to_string(),
        }
    }
}

/// Parse `source`, failing if anything was reported as an error.
pub fn parse_str(source: &str) -> Result<ast::Module, ParseError> {
    parse_with_options(source, &Options::default())
}

pub fn parse_with_options(source: &str, options: &Options) -> Result<ast::Module, ParseError> {
    let (module, diagnostics) = parse_with_diagnostics(source, options);
    if diagnostics.contains_errors() {
        return Err(ParseError::new(
            diagnostics,
            SourceFile::new(options.file_path.clone(), source),
        ));
    }
    Ok(module)
}

/// Parse `source`, returning the partial module together with everything
/// reported, errors or not.
pub fn parse_with_diagnostics(source: &str, options: &Options) -> (ast::Module, List) {
    parse::parse(source, options.max_errors)
}

/// Parse source given as raw bytes, which may not be valid UTF-8.
pub fn parse_bytes(bytes: &[u8], options: &Options) -> Result<ast::Module, ParseError> {
    let (module, diagnostics) = parse::parse_bytes(bytes, options.max_errors);
    if diagnostics.contains_errors() {
        let content = String::from_utf8_lossy(bytes).into_owned();
        return Err(ParseError::new(
            diagnostics,
            SourceFile::new(options.file_path.clone(), content),
        ));
    }
    Ok(module)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_reports_first_error() {
        let source = "fn main() {\n  let x = ;\n}\n";
        let error = parse_str(source).unwrap_err();
        assert_eq!(error.message(), "missing initializer for 'let' declaration");
        let location = error.location().unwrap();
        assert_eq!(location.line_number, 2);
        assert_eq!(location.line_position, 11);
        assert_eq!(error.to_string(), error.message());
    }

    #[test]
    fn emit_to_string_names_the_file() {
        let options = Options {
            file_path: "shader.wgsl".to_string(),
            ..Options::default()
        };
        let error = parse_with_options("const a = ;", &options).unwrap_err();
        let text = error.emit_to_string();
        assert!(text.contains("shader.wgsl"), "{text}");
        assert!(text.contains("missing initializer for 'const' declaration"), "{text}");
    }

    #[test]
    fn partial_module_is_kept() {
        let (module, diagnostics) =
            parse_with_diagnostics("const a = 1;\nconst b = ;", &Options::default());
        assert_eq!(diagnostics.error_count(), 1);
        assert_eq!(module.global_variables().count(), 1);
    }
}
