/*!
Error snapshots for the WGSL front end and resolver.
*/

use strata::{
    diagnostic::{Formatter, Style},
    front::wgsl,
    SourceFile,
};

const MAX_ERRORS: usize = 5;

fn style() -> Style {
    Style {
        print_newline_at_end: false,
        ..Style::default()
    }
}

fn render(input: &str) -> String {
    let options = wgsl::Options {
        max_errors: Some(MAX_ERRORS),
        file_path: "test.wgsl".to_string(),
    };
    let (_, diagnostics) = wgsl::parse_with_diagnostics(input, &options);
    Formatter::new(style()).format(&diagnostics, &SourceFile::new("test.wgsl", input))
}

fn check(input: &str, snapshot: &str) {
    let output = render(input);
    if output != snapshot {
        for diff in diff::lines(&output, snapshot) {
            match diff {
                diff::Result::Left(l) => println!("-{}", l),
                diff::Result::Both(l, _) => println!(" {}", l),
                diff::Result::Right(r) => println!("+{}", r),
            }
        }
        panic!("Error snapshot failed");
    }
}

#[test]
fn double_underscore_identifier() {
    check(
        "var __bad;",
        "\
test.wgsl:1:5 error: identifiers must not start with two or more underscores
var __bad;
    ^^^^^
",
    );
}

#[test]
fn mixed_precedence() {
    check(
        "fn f() { x = 1 + 2 << 3; }",
        "\
test.wgsl:1:14 error: mixing '+' and '<<' requires parenthesis
fn f() { x = 1 + 2 << 3; }
             ^^^^^^^^
",
    );
}

#[test]
fn prefix_increment() {
    check(
        "fn f() { return ++a; }",
        "\
test.wgsl:1:17 error: prefix increment and decrement operators are reserved for a future WGSL version
fn f() { return ++a; }
                ^^
",
    );
}

#[test]
fn keyword_as_let_name() {
    check(
        "fn f() { let loop = 1; }",
        "\
test.wgsl:1:14 error: expected identifier for 'let' declaration
fn f() { let loop = 1; }
             ^^^^
",
    );
}

#[test]
fn reserved_word() {
    check(
        "const precision = 1;",
        "\
test.wgsl:1:7 error: 'precision' is a reserved keyword
const precision = 1;
      ^^^^^^^^^
",
    );
}

#[test]
fn unknown_extension() {
    check(
        "enable f15;",
        "\
test.wgsl:1:8 error: expected extension
Did you mean 'f16'?
Possible values: 'chromium_disable_uniformity_analysis', 'chromium_experimental_dp4a', 'chromium_experimental_full_ptr_parameters', 'chromium_experimental_push_constant', 'chromium_internal_relaxed_uniform_layout', 'f16'
enable f15;
       ^^^
",
    );
}

#[test]
fn unknown_language_feature() {
    check(
        "requires foo;",
        "\
test.wgsl:1:10 error: feature 'foo' is not supported
requires foo;
         ^^^
",
    );
}

#[test]
fn directive_after_declaration() {
    check(
        "var<private> t: f32 = 0f;\ndiagnostic(off, foo);\n",
        "\
test.wgsl:2:1 error: directives must come before all global declarations
diagnostic(off, foo);
^^^^^^^^^^
",
    );
}

#[test]
fn one_error_per_broken_function() {
    check(
        "fn f() { a = ; }\nfn g() { b = ; }\n",
        "\
test.wgsl:1:14 error: unable to parse right side of assignment
fn f() { a = ; }
             ^

test.wgsl:2:14 error: unable to parse right side of assignment
fn g() { b = ; }
             ^
",
    );
}

#[test]
fn stops_after_max_errors() {
    let source = (0..8)
        .map(|i| format!("fn f{i}() {{ a = ; }}\n"))
        .collect::<String>();
    let options = wgsl::Options {
        max_errors: Some(MAX_ERRORS),
        file_path: "test.wgsl".to_string(),
    };
    let (_, diagnostics) = wgsl::parse_with_diagnostics(&source, &options);
    assert_eq!(diagnostics.error_count(), MAX_ERRORS + 1);
    let last = diagnostics.last().unwrap();
    assert_eq!(last.message, "stopping after 5 errors");
    assert!(!last.span.is_defined());
}

#[test]
fn unlimited_errors_by_default() {
    let source = (0..8)
        .map(|i| format!("fn f{i}() {{ a = ; }}\n"))
        .collect::<String>();
    let (_, diagnostics) = wgsl::parse_with_diagnostics(&source, &wgsl::Options::default());
    assert_eq!(diagnostics.error_count(), 8);
}

#[test]
fn parse_error_reports_first_location() {
    let error = wgsl::parse_str("const a = 1;\nconst b = ;").unwrap_err();
    let location = error.location().unwrap();
    assert_eq!((location.line_number, location.line_position), (2, 11));
    assert!(error.emit_to_string().contains("wgsl:2:11"));
}

mod resolver {
    use strata::{front::wgsl, resolve};

    fn resolve_errors(source: &str) -> Vec<String> {
        let module = wgsl::parse_str(source).unwrap();
        let info = resolve::resolve_with_diagnostics(&module, &resolve::Options::default());
        info.diagnostics
            .iter()
            .filter(|d| d.severity.is_error())
            .map(|d| d.message.clone())
            .collect()
    }

    #[test]
    fn unresolved_identifier() {
        assert_eq!(
            resolve_errors("fn f() { let x = y; }"),
            ["unresolved identifier 'y'"]
        );
    }

    #[test]
    fn cyclic_dependency() {
        assert_eq!(
            resolve_errors("const a = b;\nconst b = a;"),
            ["cyclic dependency found: 'a' -> 'b' -> 'a'"]
        );
    }

    #[test]
    fn bad_builtin_call() {
        let errors = resolve_errors("fn f() { let x = sqrt(true); }");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("no matching call to sqrt(bool)"));
    }

    #[test]
    fn unreachable_code_is_a_warning() {
        let module = wgsl::parse_str("fn f() { return; let x = 1; }").unwrap();
        let info = resolve::resolve(&module, &resolve::Options::default()).unwrap();
        let warning = info.diagnostics.iter().next().unwrap();
        assert!(!warning.severity.is_error());
        assert_eq!(warning.message, "code is unreachable");
    }
}
