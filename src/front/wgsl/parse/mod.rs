/*!
Recursive descent parser for WGSL.

The whole source is tokenized before parsing starts (see [`lexer`]) and
template argument lists are classified up front (see [`template`]), so the
grammar only ever needs a fixed amount of lookahead.

The parser does not stop at the first problem. Productions return
[`Errored`] after reporting, and the caller resynchronizes by skipping to the
token that closes the construct it was parsing: the `;` of a statement, the
`}` of a block, the `)` of an argument list. Resynchronization only looks a
bounded distance ahead; when it fails the parser stops, since it is no longer
making progress.
*/

pub mod lexer;
pub mod number;
pub mod template;

use self::{
    lexer::{Token, TokenSpan},
    number::Number,
};
use crate::{
    ast::{self, ExpressionKind, Ident, StatementKind},
    diagnostic::{filter, suggest, Diagnostic, List},
    keywords, Handle, Span,
};

/// Marks a production that reported an error and could not finish.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Errored;

/// A production that must match.
type Expect<T> = Result<T, Errored>;

/// A production that may not apply at all: `Ok(None)` means the tokens at
/// the current position don't start it, and nothing was consumed.
type Maybe<T> = Result<Option<T>, Errored>;

type Expr = Handle<ast::Expression>;

/// Recursion limit for nested blocks and unary operators.
const MAX_PARSE_DEPTH: usize = 128;

/// How far [`Parser::sync_to`] looks for a resynchronization point.
const MAX_RESYNC_LOOKAHEAD: usize = 32;

/// Attribute names, sorted.
const ATTRIBUTE_NAMES: &[&str] = &[
    "align",
    "binding",
    "builtin",
    "compute",
    "diagnostic",
    "fragment",
    "group",
    "id",
    "interpolate",
    "invariant",
    "location",
    "must_use",
    "size",
    "vertex",
    "workgroup_size",
];

/// Parse `source`, returning the module and everything reported.
///
/// The module is returned even when the list holds errors; it contains
/// whatever parsed successfully.
pub fn parse(source: &str, max_errors: Option<usize>) -> (ast::Module, List) {
    let mut tokens = lexer::tokenize(source);
    template::classify_template_args(&mut tokens);
    Parser::new(source, tokens, max_errors).parse()
}

/// Parse raw bytes. Bytes past the first malformed UTF-8 sequence are
/// reported as a lexer error.
pub fn parse_bytes(bytes: &[u8], max_errors: Option<usize>) -> (ast::Module, List) {
    let valid = match std::str::from_utf8(bytes) {
        Ok(source) => source,
        Err(e) => std::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or_default(),
    };
    let mut tokens = lexer::tokenize_bytes(bytes);
    template::classify_template_args(&mut tokens);
    Parser::new(valid, tokens, max_errors).parse()
}

/// Counts the nesting of brackets skipped while resynchronizing.
#[derive(Default)]
struct BlockCounters {
    brace: i32,
    bracket: i32,
    paren: i32,
}

impl BlockCounters {
    /// Account for `token`, returning the nesting depth before it.
    fn consume(&mut self, token: Token) -> i32 {
        fn step(counter: &mut i32, delta: i32) -> i32 {
            let before = *counter;
            *counter += delta;
            before
        }
        match token {
            Token::BraceLeft => step(&mut self.brace, 1),
            Token::BraceRight => step(&mut self.brace, -1),
            Token::BracketLeft => step(&mut self.bracket, 1),
            Token::BracketRight => step(&mut self.bracket, -1),
            Token::ParenLeft => step(&mut self.paren, 1),
            Token::ParenRight => step(&mut self.paren, -1),
            _ => 0,
        }
    }
}

/// The `var` template arguments and name of a variable declaration.
struct VarDecl {
    name: Ident,
    ty: Option<Expr>,
    address_space: Option<Expr>,
    access: Option<Expr>,
}

struct FunctionHeader {
    name: Ident,
    params: Vec<ast::Parameter>,
    return_type: Option<Expr>,
    return_attributes: Vec<ast::Attribute>,
}

/// One `if` clause of an `if`/`else if` chain.
struct IfClause {
    start: u32,
    condition: Expr,
    accept: ast::Block,
    attributes: Vec<ast::Attribute>,
}

pub struct Parser<'a> {
    source: &'a str,
    tokens: Vec<TokenSpan>,
    next_index: usize,
    last_index: usize,
    /// Cleared when a production fails; set again once the parser finds its
    /// place. While clear, loops stop consuming input.
    synchronized: bool,
    /// Closing tokens of the constructs currently being parsed, innermost
    /// last.
    sync_tokens: Vec<Token>,
    parse_depth: usize,
    /// While nonzero, errors are dropped.
    silence: usize,
    max_errors: Option<usize>,
    diagnostics: List,
    module: ast::Module,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str, tokens: Vec<TokenSpan>, max_errors: Option<usize>) -> Self {
        Parser {
            source,
            tokens,
            next_index: 0,
            last_index: 0,
            synchronized: true,
            sync_tokens: Vec::new(),
            parse_depth: 0,
            silence: 0,
            max_errors,
            diagnostics: List::new(),
            module: ast::Module::new(),
        }
    }

    pub fn parse(mut self) -> (ast::Module, List) {
        log::debug!("parsing {} tokens", self.tokens.len());
        self.translation_unit();
        log::debug!(
            "parsed {} declarations, {} errors",
            self.module.declarations().len(),
            self.diagnostics.error_count()
        );
        (self.module, self.diagnostics)
    }

    // Token stream

    fn last_token(&self) -> TokenSpan {
        self.tokens
            .last()
            .copied()
            .unwrap_or((Token::Eof, Span::UNDEFINED))
    }

    /// The `n`th token after the current one, not counting placeholders.
    fn peek_at(&self, n: usize) -> TokenSpan {
        let mut remaining = n;
        for &token in &self.tokens[self.next_index.min(self.tokens.len())..] {
            if token.0.is_placeholder() {
                continue;
            }
            if remaining == 0 {
                return token;
            }
            remaining -= 1;
        }
        self.last_token()
    }

    fn peek(&self) -> TokenSpan {
        self.peek_at(0)
    }

    fn peek_is(&self, token: Token) -> bool {
        self.peek().0 == token
    }

    /// Consume the next token. The end of input and lexer errors are never
    /// consumed.
    fn next(&mut self) -> TokenSpan {
        while self.next_index < self.tokens.len() && self.tokens[self.next_index].0.is_placeholder()
        {
            self.next_index += 1;
        }
        let Some(&token) = self.tokens.get(self.next_index) else {
            return self.last_token();
        };
        if token.0.is_terminal() {
            return token;
        }
        self.last_index = self.next_index;
        self.next_index += 1;
        token
    }

    /// Consume the next token if it is `token`.
    fn skip(&mut self, token: Token) -> bool {
        if self.peek_is(token) {
            self.next();
            true
        } else {
            false
        }
    }

    /// Replace the token just consumed by `lhs`, one byte long, and the
    /// placeholder that follows it by `rhs`.
    fn split_token(&mut self, lhs: Token, rhs: Token) {
        let index = self.next_index;
        if index == 0 || index >= self.tokens.len() || !self.tokens[index].0.is_placeholder() {
            return;
        }
        let start = self.tokens[index - 1].1.start();
        self.tokens[index - 1] = (lhs, Span::new(start, start + 1));
        self.tokens[index].0 = rhs;
    }

    fn last_span(&self) -> Span {
        self.tokens
            .get(self.last_index)
            .map_or(Span::UNDEFINED, |&(_, span)| span)
    }

    /// From `start` to the end of the last consumed token.
    fn span_from(&self, start: u32) -> Span {
        Span::new(start, self.last_span().end().max(start))
    }

    fn text(&self, span: Span) -> &'a str {
        span.to_range()
            .and_then(|range| self.source.get(range))
            .unwrap_or_default()
    }

    // Error reporting

    fn error(&mut self, span: Span, message: impl Into<String>) -> Errored {
        if self.silence == 0 {
            self.diagnostics.add(Diagnostic::error(message, span));
        }
        Errored
    }

    /// Report `message`, followed by ` for {what}` when `what` is not empty.
    fn error_for(&mut self, span: Span, message: &str, what: &str) -> Errored {
        if what.is_empty() {
            self.error(span, message)
        } else {
            self.error(span, format!("{message} for {what}"))
        }
    }

    /// Report the lexer error carried by `token`, if any.
    fn handle_error(&mut self, token: TokenSpan) -> bool {
        match token.0 {
            Token::Error(e) => {
                self.synchronized = false;
                self.error(token.1, e.to_string());
                true
            }
            _ => false,
        }
    }

    /// Run `body` with error reporting turned off.
    fn without_diagnostics<T>(&mut self, body: impl FnOnce(&mut Self) -> T) -> T {
        self.silence += 1;
        let result = body(self);
        self.silence -= 1;
        result
    }

    fn continue_parsing(&self) -> bool {
        self.synchronized
            && self
                .max_errors
                .map_or(true, |max| self.diagnostics.error_count() < max)
    }

    // Expectations

    fn expect(&mut self, what: &str, token: Token) -> Expect<()> {
        let t = self.peek();
        if t.0 == token {
            self.next();
            self.synchronized = true;
            return Ok(());
        }
        self.synchronized = false;
        if self.handle_error(t) {
            return Err(Errored);
        }
        let message = if token == Token::TemplateArgsLeft && t.0 == Token::LessThan {
            "missing closing '>'".to_string()
        } else {
            format!("expected '{}'", token.name())
        };
        Err(self.error_for(t.1, &message, what))
    }

    fn expect_ident(&mut self, what: &str) -> Expect<Ident> {
        self.expect_ident_kind(what, "identifier")
    }

    fn expect_ident_kind(&mut self, what: &str, kind: &str) -> Expect<Ident> {
        let t = self.peek();
        if t.0 == Token::Identifier {
            self.synchronized = true;
            self.next();
            let name = self.text(t.1);
            if keywords::wgsl::is_reserved(name) {
                return Err(self.error(t.1, format!("'{name}' is a reserved keyword")));
            }
            return Ok(Ident::new(name, t.1));
        }
        if self.handle_error(t) {
            return Err(Errored);
        }
        self.synchronized = false;
        Err(self.error_for(t.1, &format!("expected {kind}"), what))
    }

    /// Expect an identifier naming one of `names`.
    ///
    /// On failure the error lists every accepted value, and suggests the
    /// closest one when the identifier is nearly right.
    fn expect_enum<T>(
        &mut self,
        name: &str,
        parse: impl Fn(&str) -> Option<T>,
        names: &[&str],
        what: &str,
    ) -> Expect<(T, Span)> {
        let t = self.peek();
        let got = match t.0 {
            Token::Identifier => self.text(t.1),
            _ => "",
        };
        if t.0 == Token::Identifier {
            if let Some(value) = parse(got) {
                self.synchronized = true;
                self.next();
                return Ok((value, t.1));
            }
        }
        if self.handle_error(t) {
            return Err(Errored);
        }
        let mut message = format!("expected {name}");
        if !what.is_empty() {
            message.push_str(" for ");
            message.push_str(what);
        }
        message.push('\n');
        suggest::write_alternatives(&mut message, got, names);
        self.synchronized = false;
        Err(self.error(t.1, message))
    }

    fn expect_block<T>(
        &mut self,
        start: Token,
        end: Token,
        what: &str,
        body: impl FnOnce(&mut Self) -> Expect<T>,
    ) -> Expect<T> {
        self.expect(what, start)?;
        self.sync(end, |p| {
            let result = body(p)?;
            p.expect(what, end)?;
            Ok(result)
        })
    }

    fn expect_paren_block<T>(
        &mut self,
        what: &str,
        body: impl FnOnce(&mut Self) -> Expect<T>,
    ) -> Expect<T> {
        self.expect_block(Token::ParenLeft, Token::ParenRight, what, body)
    }

    fn expect_brace_block<T>(
        &mut self,
        what: &str,
        body: impl FnOnce(&mut Self) -> Expect<T>,
    ) -> Expect<T> {
        self.expect_block(Token::BraceLeft, Token::BraceRight, what, body)
    }

    fn expect_template_arg_block<T>(
        &mut self,
        what: &str,
        body: impl FnOnce(&mut Self) -> Expect<T>,
    ) -> Expect<T> {
        self.expect_block(Token::TemplateArgsLeft, Token::TemplateArgsRight, what, body)
    }

    // Resynchronization

    /// Parse `body` as a construct closed by `token`. If it fails, skip to
    /// just past the closing token.
    fn sync<T>(&mut self, token: Token, body: impl FnOnce(&mut Self) -> Result<T, Errored>) -> Result<T, Errored> {
        if self.parse_depth >= MAX_PARSE_DEPTH {
            let t = self.peek();
            self.error(t.1, "maximum parser recursive depth reached");
            self.sync_to(token, true);
            return Err(Errored);
        }

        self.sync_tokens.push(token);
        self.parse_depth += 1;
        let result = body(self);
        self.parse_depth -= 1;
        self.sync_tokens.pop();

        if result.is_err() {
            self.sync_to(token, true);
        }
        result
    }

    /// Skip ahead to the next `token` outside of nested brackets.
    ///
    /// Gives up at the closing token of an enclosing construct, or after
    /// [`MAX_RESYNC_LOOKAHEAD`] tokens. Returns whether `token` was found.
    fn sync_to(&mut self, token: Token, consume: bool) -> bool {
        self.synchronized = false;
        let mut counters = BlockCounters::default();

        for i in 0..MAX_RESYNC_LOOKAHEAD {
            let t = self.peek_at(i);
            if counters.consume(t.0) > 0 {
                continue;
            }
            if t.0 != token && !self.sync_tokens.contains(&t.0) {
                continue;
            }

            for _ in 0..i {
                self.next();
            }
            if t.0 == token {
                if consume {
                    self.next();
                }
                self.synchronized = true;
                return true;
            }
            break;
        }
        false
    }

    // Module scope

    fn translation_unit(&mut self) {
        let mut after_global_decl = false;
        while self.continue_parsing() {
            let p = self.peek();
            if p.0 == Token::Eof {
                break;
            }

            match self.global_directive(after_global_decl) {
                Ok(Some(())) | Err(Errored) => {}
                Ok(None) => match self.global_decl() {
                    Ok(Some(())) => after_global_decl = true,
                    Ok(None) => {
                        self.error(p.1, "unexpected token");
                    }
                    Err(Errored) => {}
                },
            }

            if let Some(max) = self.max_errors {
                if self.diagnostics.error_count() >= max {
                    self.error(Span::UNDEFINED, format!("stopping after {max} errors"));
                    break;
                }
            }
        }
    }

    fn global_directive(&mut self, after_global_decl: bool) -> Maybe<()> {
        let p = self.peek();
        let mut result = self.diagnostic_directive();
        if let Ok(None) = result {
            result = self.enable_directive();
        }
        if let Ok(None) = result {
            result = self.requires_directive();
        }
        if let (Ok(Some(())), true) = (result, after_global_decl) {
            return Err(self.error(p.1, "directives must come before all global declarations"));
        }
        result
    }

    fn diagnostic_directive(&mut self) -> Maybe<()> {
        self.sync(Token::Semicolon, |p| {
            let start = p.peek().1.start();
            if !p.skip(Token::Diagnostic) {
                return Ok(None);
            }
            let control = p.expect_diagnostic_control()?;
            p.expect("diagnostic directive", Token::Semicolon)?;
            let span = p.span_from(start);
            p.module
                .add_global_declaration(ast::GlobalDeclKind::DiagnosticDirective(control), span);
            Ok(Some(()))
        })
    }

    fn enable_directive(&mut self) -> Maybe<()> {
        self.sync(Token::Semicolon, |p| {
            let start = p.peek().1.start();
            if !p.skip(Token::Enable) {
                return Ok(None);
            }
            let t = p.peek();
            if t.0 == Token::ParenLeft {
                p.synchronized = false;
                return Err(p.error(t.1, "enable directives don't take parenthesis"));
            }

            let mut extensions = Vec::new();
            while p.continue_parsing() {
                let (kind, span) = p.expect_enum(
                    "extension",
                    ast::ExtensionKind::from_ident,
                    ast::ExtensionKind::NAMES,
                    "",
                )?;
                extensions.push(ast::Extension {
                    id: p.module.next_id(),
                    span,
                    kind,
                });
                if !p.skip(Token::Comma) {
                    break;
                }
                if p.peek_is(Token::Semicolon) {
                    break;
                }
            }

            p.expect("enable directive", Token::Semicolon)?;
            let span = p.span_from(start);
            p.module
                .add_global_declaration(ast::GlobalDeclKind::Enable { extensions }, span);
            Ok(Some(()))
        })
    }

    fn requires_directive(&mut self) -> Maybe<()> {
        self.sync(Token::Semicolon, |p| {
            let start = p.peek().1.start();
            if !p.skip(Token::Requires) {
                return Ok(None);
            }
            let t = p.peek();
            if t.0 == Token::ParenLeft {
                p.synchronized = false;
                return Err(p.error(t.1, "requires directives don't take parenthesis"));
            }

            let mut features = Vec::new();
            while p.continue_parsing() {
                let t2 = p.peek();
                if p.handle_error(t2) {
                    return Err(Errored);
                }
                match t2.0 {
                    Token::Identifier => {
                        let name = p.text(t2.1);
                        match ast::LanguageFeature::from_ident(name) {
                            Some(feature) => features.push((feature, t2.1)),
                            None => {
                                return Err(
                                    p.error(t2.1, format!("feature '{name}' is not supported"))
                                )
                            }
                        }
                        p.next();
                        if !p.skip(Token::Comma) {
                            break;
                        }
                    }
                    Token::Semicolon => break,
                    _ => return Err(p.error(t2.1, "invalid feature name for requires")),
                }
            }

            if features.is_empty() {
                return Err(p.error(t.1, "missing feature names in requires directive"));
            }
            p.expect("requires directive", Token::Semicolon)?;
            let span = p.span_from(start);
            p.module
                .add_global_declaration(ast::GlobalDeclKind::Requires { features }, span);
            Ok(Some(()))
        })
    }

    fn global_decl(&mut self) -> Maybe<()> {
        if self.skip(Token::Semicolon) || self.skip(Token::Eof) {
            return Ok(Some(()));
        }

        let mut errored = false;
        let mut attrs = match self.attribute_list() {
            Ok(attrs) => attrs,
            Err(Errored) => {
                errored = true;
                Vec::new()
            }
        };
        if !self.continue_parsing() {
            return Err(Errored);
        }

        let decl = self.sync(Token::Semicolon, |p| {
            let start = p.peek().1.start();

            if let Some(var) = p.global_variable_decl(&mut attrs)? {
                p.expect("variable declaration", Token::Semicolon)?;
                let span = p.span_from(start);
                p.module
                    .add_global_declaration(ast::GlobalDeclKind::Variable(var), span);
                return Ok(Some(()));
            }

            if let Some(var) = p.global_constant_decl(&mut attrs)? {
                let what = format!("'{}' declaration", var.kind.keyword());
                let span = p.span_from(start);
                p.module
                    .add_global_declaration(ast::GlobalDeclKind::Variable(var), span);
                if !p.peek_is(Token::Semicolon) {
                    p.expect(&what, Token::Semicolon)?;
                }
                return Ok(Some(()));
            }

            if let Some(alias) = p.type_alias_decl()? {
                p.expect("type alias", Token::Semicolon)?;
                let span = p.span_from(start);
                p.module.add_global_declaration(
                    ast::GlobalDeclKind::TypeDecl(ast::TypeDecl::Alias(alias)),
                    span,
                );
                return Ok(Some(()));
            }

            if let Some(condition) = p.const_assert()? {
                let span = p.span_from(start);
                p.module
                    .add_global_declaration(ast::GlobalDeclKind::ConstAssert(condition), span);
                p.expect("const assertion declaration", Token::Semicolon)?;
                return Ok(Some(()));
            }

            Ok(None)
        });

        match decl {
            Ok(Some(())) => {
                self.expect_attributes_consumed(&attrs)?;
                return Ok(Some(()));
            }
            Ok(None) => {}
            Err(Errored) => errored = true,
        }

        let start = self.peek().1.start();
        match self.struct_decl() {
            Ok(Some(decl)) => {
                let span = self.span_from(start);
                self.module.add_global_declaration(
                    ast::GlobalDeclKind::TypeDecl(ast::TypeDecl::Struct(decl)),
                    span,
                );
                self.expect_attributes_consumed(&attrs)?;
                return Ok(Some(()));
            }
            Ok(None) => {}
            Err(Errored) => errored = true,
        }

        match self.function_decl(&mut attrs) {
            Ok(Some(())) => return Ok(Some(())),
            Ok(None) => {}
            Err(Errored) => errored = true,
        }

        if errored {
            return Err(Errored);
        }

        if !attrs.is_empty() {
            let t = self.next();
            return Err(self.error(t.1, "expected declaration after attributes"));
        }

        // A statement at module scope gets a better message than "unexpected
        // token", but only if it really parses as one.
        let t = self.peek();
        match self.without_diagnostics(|p| p.statement()) {
            Ok(Some(_)) => {
                self.sync_to(Token::BraceRight, true);
                return Err(self.error(t.1, "statement found outside of function body"));
            }
            Ok(None) => {
                self.next();
            }
            Err(Errored) => {}
        }

        if self.handle_error(t) {
            return Err(Errored);
        }
        Ok(None)
    }

    fn global_variable_decl(&mut self, attrs: &mut Vec<ast::Attribute>) -> Maybe<ast::Variable> {
        let decl = match self.variable_decl()? {
            Some(decl) => decl,
            None => return Ok(None),
        };

        let mut initializer = None;
        if self.skip(Token::Equal) {
            match self.expression()? {
                Some(expr) => initializer = Some(expr),
                None => {
                    let t = self.peek();
                    return Err(self.error(t.1, "missing initializer for 'var' declaration"));
                }
            }
        }

        Ok(Some(ast::Variable {
            name: decl.name,
            kind: ast::VariableKind::Var {
                address_space: decl.address_space,
                access: decl.access,
            },
            ty: decl.ty,
            initializer,
            attributes: std::mem::take(attrs),
        }))
    }

    fn global_constant_decl(&mut self, attrs: &mut Vec<ast::Attribute>) -> Maybe<ast::Variable> {
        let t = self.peek();
        let kind = if self.skip(Token::Const) {
            ast::VariableKind::Const
        } else if self.skip(Token::Override) {
            ast::VariableKind::Override
        } else if t.0 == Token::Let {
            return Err(self.error(t.1, "module-scope 'let' is invalid, use 'const'"));
        } else {
            return Ok(None);
        };
        let what = format!("'{}' declaration", kind.keyword());

        let (name, ty) = self.expect_optionally_typed_ident(&what)?;

        let has_initializer = match kind {
            ast::VariableKind::Override => self.skip(Token::Equal),
            _ => {
                self.expect(&what, Token::Equal)?;
                true
            }
        };

        let mut initializer = None;
        if has_initializer {
            match self.expression()? {
                Some(expr) => initializer = Some(expr),
                None => {
                    let t = self.peek();
                    return Err(self.error(t.1, format!("missing initializer for {what}")));
                }
            }
        }

        Ok(Some(ast::Variable {
            name,
            kind,
            ty,
            initializer,
            attributes: std::mem::take(attrs),
        }))
    }

    fn variable_decl(&mut self) -> Maybe<VarDecl> {
        if !self.skip(Token::Var) {
            return Ok(None);
        }

        let (address_space, access) = match self.variable_qualifier()? {
            Some(qualifier) => qualifier,
            None => (None, None),
        };

        let (name, ty) = self.expect_optionally_typed_ident("variable declaration")?;
        Ok(Some(VarDecl {
            name,
            ty,
            address_space,
            access,
        }))
    }

    /// `<address_space [, access]>` after `var`.
    fn variable_qualifier(&mut self) -> Maybe<(Option<Expr>, Option<Expr>)> {
        if !self.peek_is(Token::TemplateArgsLeft) && !self.peek_is(Token::LessThan) {
            return Ok(None);
        }
        self.expect_template_arg_block("variable declaration", |p| {
            let address_space = p.expect_expression("'var' address space")?;
            let mut access = None;
            if p.skip(Token::Comma) {
                access = Some(p.expect_expression("'var' access mode")?);
                p.skip(Token::Comma);
            }
            Ok(Some((Some(address_space), access)))
        })
    }

    fn expect_optionally_typed_ident(&mut self, what: &str) -> Expect<(Ident, Option<Expr>)> {
        let name = self.expect_ident(what)?;
        if !self.peek_is(Token::Colon) {
            return Ok((name, None));
        }
        self.expect(what, Token::Colon)?;
        let ty = self.expect_type(what)?;
        Ok((name, Some(ty)))
    }

    fn expect_ident_with_type_specifier(&mut self, what: &str) -> Expect<(Ident, Expr)> {
        let name = self.expect_ident(what)?;
        self.expect(what, Token::Colon)?;
        let ty = self.expect_type(what)?;
        Ok((name, ty))
    }

    fn type_alias_decl(&mut self) -> Maybe<ast::Alias> {
        if !self.skip(Token::Alias) {
            return Ok(None);
        }
        let what = "type alias";
        let name = self.expect_ident(what)?;
        self.expect(what, Token::Equal)?;
        match self.type_specifier()? {
            Some(ty) => Ok(Some(ast::Alias { name, ty })),
            None => {
                let t = self.peek();
                Err(self.error(t.1, "invalid type alias"))
            }
        }
    }

    /// An identifier with optional template arguments, in a position where
    /// a type is expected.
    fn type_specifier(&mut self) -> Maybe<Expr> {
        let t = self.peek();
        if t.0 != Token::Identifier {
            return Ok(None);
        }
        self.next();
        let name = self.text(t.1);
        if !self.peek_is(Token::TemplateArgsLeft) {
            return Ok(Some(self.module.ident_expr(name, t.1)));
        }

        let template_args = self.expect_template_arg_block("type template arguments", |p| {
            p.expect_expression_list("type template argument list", Token::TemplateArgsRight)
        })?;
        let span = self.span_from(t.1.start());
        Ok(Some(self.module.add_expression(
            ExpressionKind::Ident {
                ident: Ident::new(name, t.1),
                template_args,
            },
            span,
        )))
    }

    fn expect_type(&mut self, what: &str) -> Expect<Expr> {
        match self.type_specifier()? {
            Some(ty) => Ok(ty),
            None => {
                let t = self.peek();
                Err(self.error_for(t.1, "invalid type", what))
            }
        }
    }

    fn struct_decl(&mut self) -> Maybe<ast::Struct> {
        if !self.skip(Token::Struct) {
            return Ok(None);
        }
        let name = self.expect_ident("struct declaration")?;
        let members = self.expect_struct_body_decl()?;
        Ok(Some(ast::Struct {
            name,
            members,
            attributes: Vec::new(),
        }))
    }

    fn expect_struct_body_decl(&mut self) -> Expect<Vec<ast::StructMember>> {
        self.expect_brace_block("struct declaration", |p| {
            let mut members = Vec::new();
            let mut errored = false;
            while p.continue_parsing() {
                let t = p.peek();
                if t.0 != Token::Identifier && t.0 != Token::Attr {
                    break;
                }
                match p.expect_struct_member() {
                    Ok(member) => members.push(member),
                    Err(Errored) => {
                        errored = true;
                        if !p.sync_to(Token::Comma, false) {
                            return Err(Errored);
                        }
                    }
                }
                if !p.skip(Token::Comma) {
                    break;
                }
            }
            if errored {
                Err(Errored)
            } else {
                Ok(members)
            }
        })
    }

    fn expect_struct_member(&mut self) -> Expect<ast::StructMember> {
        let start = self.peek().1.start();
        let attributes = self.attribute_list()?;
        let (name, ty) = self.expect_ident_with_type_specifier("struct member")?;
        Ok(ast::StructMember {
            id: self.module.next_id(),
            span: self.span_from(start),
            name,
            ty,
            attributes,
        })
    }

    fn const_assert(&mut self) -> Maybe<Expr> {
        if !self.skip(Token::ConstAssert) {
            return Ok(None);
        }
        match self.expression()? {
            Some(condition) => Ok(Some(condition)),
            None => {
                let t = self.peek();
                Err(self.error(t.1, "unable to parse condition expression"))
            }
        }
    }

    fn function_decl(&mut self, attrs: &mut Vec<ast::Attribute>) -> Maybe<()> {
        let start = self.peek().1.start();
        let header = match self.function_header() {
            Ok(Some(header)) => header,
            Ok(None) => return Ok(None),
            Err(Errored) => {
                // Parse the body anyway, to report problems inside it.
                if self.sync_to(Token::BraceLeft, false) {
                    let _ = self.expect_compound_statement("function body");
                }
                return Err(Errored);
            }
        };

        let body = self.expect_compound_statement("function body")?;
        let span = self.span_from(start);
        let function = ast::Function {
            name: header.name,
            params: header.params,
            return_type: header.return_type,
            return_attributes: header.return_attributes,
            attributes: std::mem::take(attrs),
            body,
        };
        self.module
            .add_global_declaration(ast::GlobalDeclKind::Function(function), span);
        Ok(Some(()))
    }

    fn function_header(&mut self) -> Maybe<FunctionHeader> {
        if !self.skip(Token::Fn) {
            return Ok(None);
        }
        let what = "function declaration";
        let mut errored = false;

        let name = match self.expect_ident(what) {
            Ok(name) => Some(name),
            Err(Errored) => {
                errored = true;
                if !self.sync_to(Token::ParenLeft, false) {
                    return Err(Errored);
                }
                None
            }
        };

        let params = match self.expect_paren_block(what, |p| p.expect_param_list()) {
            Ok(params) => params,
            Err(Errored) => {
                errored = true;
                if !self.synchronized {
                    return Err(Errored);
                }
                Vec::new()
            }
        };

        let mut return_type = None;
        let mut return_attributes = Vec::new();
        if self.skip(Token::Arrow) {
            return_attributes = self.attribute_list()?;
            match self.type_specifier() {
                Ok(Some(ty)) => return_type = Some(ty),
                Ok(None) => {
                    let t = self.peek();
                    return Err(self.error(t.1, "unable to determine function return type"));
                }
                Err(Errored) => errored = true,
            }
        }

        match name {
            Some(name) if !errored => Ok(Some(FunctionHeader {
                name,
                params,
                return_type,
                return_attributes,
            })),
            _ => Err(Errored),
        }
    }

    fn expect_param_list(&mut self) -> Expect<Vec<ast::Parameter>> {
        let mut params = Vec::new();
        while self.continue_parsing() {
            let t = self.peek();
            if t.0 != Token::Identifier && t.0 != Token::Attr {
                break;
            }
            params.push(self.expect_param()?);
            if !self.skip(Token::Comma) {
                break;
            }
        }
        Ok(params)
    }

    fn expect_param(&mut self) -> Expect<ast::Parameter> {
        let start = self.peek().1.start();
        // A bad attribute has already been reported; keep the parameter.
        let attributes = self.attribute_list().unwrap_or_default();
        let (name, ty) = self.expect_ident_with_type_specifier("parameter")?;
        Ok(ast::Parameter {
            id: self.module.next_id(),
            span: self.span_from(start),
            name,
            ty,
            attributes,
        })
    }

    // Statements

    fn expect_compound_statement(&mut self, what: &str) -> Expect<ast::Block> {
        let mut attrs = self.attribute_list()?;
        self.expect_compound_statement_with(&mut attrs, what)
    }

    fn expect_compound_statement_with(
        &mut self,
        attrs: &mut Vec<ast::Attribute>,
        what: &str,
    ) -> Expect<ast::Block> {
        let start = self.peek().1.start();
        let statements = self.expect_brace_block(what, |p| p.expect_statements())?;
        let span = self.span_from(start);
        let mut block = self.module.block(statements, span);
        block.attributes = std::mem::take(attrs);
        Ok(block)
    }

    fn expect_paren_expression(&mut self) -> Expect<Expr> {
        self.expect_paren_block("", |p| match p.expression()? {
            Some(expr) => Ok(expr),
            None => {
                let t = p.peek();
                Err(p.error(t.1, "unable to parse expression"))
            }
        })
    }

    fn expect_statements(&mut self) -> Expect<Vec<ast::Statement>> {
        let mut errored = false;
        let mut statements = Vec::new();
        while self.continue_parsing() {
            match self.statement() {
                Ok(Some(statement)) => statements.push(statement),
                Ok(None) => break,
                Err(Errored) => errored = true,
            }
        }
        if errored {
            Err(Errored)
        } else {
            Ok(statements)
        }
    }

    fn statement(&mut self) -> Maybe<ast::Statement> {
        while self.skip(Token::Semicolon) {}

        let mut attrs = self.attribute_list()?;
        let result = self.statement_with_attributes(&mut attrs);
        // Reported whether or not the statement parsed.
        let _ = self.expect_attributes_consumed(&attrs);
        result
    }

    fn statement_with_attributes(&mut self, attrs: &mut Vec<ast::Attribute>) -> Maybe<ast::Statement> {
        if let Some(statement) = self.sync(Token::Semicolon, |p| p.non_block_statement())? {
            return Ok(Some(statement));
        }
        if let Some(statement) = self.if_statement(attrs)? {
            return Ok(Some(statement));
        }
        if let Some(statement) = self.switch_statement(attrs)? {
            return Ok(Some(statement));
        }
        if let Some(statement) = self.loop_statement(attrs)? {
            return Ok(Some(statement));
        }
        if let Some(statement) = self.for_statement(attrs)? {
            return Ok(Some(statement));
        }
        if let Some(statement) = self.while_statement(attrs)? {
            return Ok(Some(statement));
        }
        if self.peek_is(Token::BraceLeft) {
            let block = self.expect_compound_statement_with(attrs, "block statement")?;
            let span = block.span;
            return Ok(Some(self.module.statement(StatementKind::Block(block), span)));
        }
        Ok(None)
    }

    /// A statement that ends with `;`.
    fn non_block_statement(&mut self) -> Maybe<ast::Statement> {
        let start = self.peek().1.start();
        let kind = match self.non_block_statement_kind()? {
            Some(kind) => kind,
            None => return Ok(None),
        };
        let span = self.span_from(start);
        self.expect(statement_name(&kind), Token::Semicolon)?;
        Ok(Some(self.module.statement(kind, span)))
    }

    fn non_block_statement_kind(&mut self) -> Maybe<StatementKind> {
        if let Some(kind) = self.return_statement()? {
            return Ok(Some(kind));
        }
        if let Some(call) = self.func_call_statement()? {
            return Ok(Some(StatementKind::Call(call)));
        }
        if let Some(var) = self.variable_statement()? {
            return Ok(Some(StatementKind::Declaration(var)));
        }
        if self.skip(Token::Break) {
            return Ok(Some(StatementKind::Break));
        }
        if self.skip(Token::Continue) {
            return Ok(Some(StatementKind::Continue));
        }
        if self.skip(Token::Discard) {
            return Ok(Some(StatementKind::Discard));
        }
        if let Some(kind) = self.variable_updating_statement()? {
            return Ok(Some(kind));
        }
        if let Some(condition) = self.const_assert()? {
            return Ok(Some(StatementKind::ConstAssert(condition)));
        }
        Ok(None)
    }

    fn return_statement(&mut self) -> Maybe<StatementKind> {
        if !self.skip(Token::Return) {
            return Ok(None);
        }
        if self.peek_is(Token::Semicolon) {
            return Ok(Some(StatementKind::Return(None)));
        }
        let value = self.expression()?;
        Ok(Some(StatementKind::Return(value)))
    }

    fn variable_statement(&mut self) -> Maybe<ast::Variable> {
        let t = self.peek();
        let kind = match t.0 {
            Token::Const => ast::VariableKind::Const,
            Token::Let => ast::VariableKind::Let,
            Token::Var => {
                let decl = match self.variable_decl()? {
                    Some(decl) => decl,
                    None => return Ok(None),
                };
                let mut initializer = None;
                if self.skip(Token::Equal) {
                    match self.expression()? {
                        Some(expr) => initializer = Some(expr),
                        None => {
                            let t = self.peek();
                            return Err(
                                self.error(t.1, "missing initializer for 'var' declaration")
                            );
                        }
                    }
                }
                return Ok(Some(ast::Variable {
                    name: decl.name,
                    kind: ast::VariableKind::Var {
                        address_space: decl.address_space,
                        access: decl.access,
                    },
                    ty: decl.ty,
                    initializer,
                    attributes: Vec::new(),
                }));
            }
            _ => return Ok(None),
        };
        self.next();

        let what = format!("'{}' declaration", kind.keyword());
        let (name, ty) = self.expect_optionally_typed_ident(&what)?;
        self.expect(&what, Token::Equal)?;
        let initializer = match self.expression()? {
            Some(expr) => expr,
            None => {
                let t = self.peek();
                return Err(self.error(t.1, format!("missing initializer for {what}")));
            }
        };

        Ok(Some(ast::Variable {
            name,
            kind,
            ty,
            initializer: Some(initializer),
            attributes: Vec::new(),
        }))
    }

    fn if_statement(&mut self, attrs: &mut Vec<ast::Attribute>) -> Maybe<ast::Statement> {
        let first = match self.if_clause(attrs)? {
            Some(clause) => clause,
            None => return Ok(None),
        };

        let mut clauses = vec![first];
        let mut reject = None;
        while self.continue_parsing() {
            if !self.skip(Token::Else) {
                break;
            }
            if let Some(clause) = self.if_clause(&mut Vec::new())? {
                clauses.push(clause);
                continue;
            }
            let block = self.expect_compound_statement("else statement")?;
            let span = block.span;
            reject = Some(self.module.statement(StatementKind::Block(block), span));
            break;
        }

        // Fold `else if` chains from the innermost out.
        let end = self.last_span().end();
        for clause in clauses.into_iter().rev() {
            let kind = StatementKind::If(ast::If {
                condition: clause.condition,
                accept: clause.accept,
                reject: reject.map(Box::new),
                attributes: clause.attributes,
            });
            reject = Some(self.module.statement(kind, Span::new(clause.start, end)));
        }
        Ok(reject)
    }

    fn if_clause(&mut self, attrs: &mut Vec<ast::Attribute>) -> Maybe<IfClause> {
        let t = self.peek();
        if !self.skip(Token::If) {
            return Ok(None);
        }
        let condition = match self.expression()? {
            Some(condition) => condition,
            None => {
                let t = self.peek();
                return Err(self.error(t.1, "unable to parse condition expression"));
            }
        };
        let accept = self.expect_compound_statement("if statement")?;
        Ok(Some(IfClause {
            start: t.1.start(),
            condition,
            accept,
            attributes: std::mem::take(attrs),
        }))
    }

    fn switch_statement(&mut self, attrs: &mut Vec<ast::Attribute>) -> Maybe<ast::Statement> {
        let t = self.peek();
        if !self.skip(Token::Switch) {
            return Ok(None);
        }
        let selector = match self.expression()? {
            Some(selector) => selector,
            None => {
                let t = self.peek();
                return Err(self.error(t.1, "unable to parse selector expression"));
            }
        };

        let body_attributes = self.attribute_list()?;
        let cases = self.expect_brace_block("switch statement", |p| {
            let mut errored = false;
            let mut cases = Vec::new();
            while p.continue_parsing() {
                match p.switch_body() {
                    Ok(Some(case)) => cases.push(case),
                    Ok(None) => break,
                    Err(Errored) => errored = true,
                }
            }
            if errored {
                Err(Errored)
            } else {
                Ok(cases)
            }
        })?;

        let kind = StatementKind::Switch(ast::Switch {
            selector,
            cases,
            attributes: std::mem::take(attrs),
            body_attributes,
        });
        let span = self.span_from(t.1.start());
        Ok(Some(self.module.statement(kind, span)))
    }

    fn switch_body(&mut self) -> Maybe<ast::SwitchCase> {
        if !self.peek_is(Token::Case) && !self.peek_is(Token::Default) {
            return Ok(None);
        }
        let t = self.next();

        let selectors = match t.0 {
            Token::Case => self.expect_case_selectors()?,
            _ => vec![ast::CaseSelector::Default],
        };
        self.skip(Token::Colon);

        let body = self.expect_compound_statement("case statement")?;
        Ok(Some(ast::SwitchCase {
            id: self.module.next_id(),
            span: self.span_from(t.1.start()),
            selectors,
            body,
        }))
    }

    fn expect_case_selectors(&mut self) -> Expect<Vec<ast::CaseSelector>> {
        let mut selectors = Vec::new();
        while self.continue_parsing() {
            match self.case_selector()? {
                Some(selector) => selectors.push(selector),
                None => break,
            }
            if !self.skip(Token::Comma) {
                break;
            }
        }
        if selectors.is_empty() {
            let t = self.peek();
            return Err(self.error(t.1, "expected case selector expression or `default`"));
        }
        Ok(selectors)
    }

    fn case_selector(&mut self) -> Maybe<ast::CaseSelector> {
        if self.skip(Token::Default) {
            return Ok(Some(ast::CaseSelector::Default));
        }
        Ok(self.expression()?.map(ast::CaseSelector::Expr))
    }

    fn loop_statement(&mut self, attrs: &mut Vec<ast::Attribute>) -> Maybe<ast::Statement> {
        let t = self.peek();
        if !self.skip(Token::Loop) {
            return Ok(None);
        }

        let body_attributes = self.attribute_list()?;
        let body_start = self.peek().1.start();
        let (statements, continuing) = self.expect_brace_block("loop", |p| {
            let statements = p.expect_statements()?;
            let continuing = p.continuing_statement()?;
            Ok((statements, continuing))
        })?;

        let span = self.span_from(body_start);
        let mut body = self.module.block(statements, span);
        body.attributes = body_attributes;
        let kind = StatementKind::Loop(ast::Loop {
            body,
            continuing,
            attributes: std::mem::take(attrs),
        });
        let span = self.span_from(t.1.start());
        Ok(Some(self.module.statement(kind, span)))
    }

    fn continuing_statement(&mut self) -> Maybe<ast::Block> {
        if !self.skip(Token::Continuing) {
            return Ok(None);
        }
        self.continuing_compound_statement().map(Some)
    }

    fn continuing_compound_statement(&mut self) -> Expect<ast::Block> {
        let attributes = self.attribute_list()?;
        let start = self.peek().1.start();
        let statements = self.expect_brace_block("", |p| {
            let mut statements = Vec::new();
            while p.continue_parsing() {
                if let Some(statement) = p.break_if_statement()? {
                    statements.push(statement);
                    continue;
                }
                match p.statement()? {
                    Some(statement) => statements.push(statement),
                    None => break,
                }
            }
            Ok(statements)
        })?;
        let span = self.span_from(start);
        let mut block = self.module.block(statements, span);
        block.attributes = attributes;
        Ok(block)
    }

    fn break_if_statement(&mut self) -> Maybe<ast::Statement> {
        let t1 = self.peek();
        let t2 = self.peek_at(1);
        if t1.0 != Token::Break || t2.0 != Token::If {
            return Ok(None);
        }
        self.next();
        self.next();

        let condition = match self.expression()? {
            Some(condition) => condition,
            None => return Err(self.error(t1.1, "expected expression for `break-if`")),
        };
        let span = self.span_from(t1.1.start());
        self.expect("`break-if` statement", Token::Semicolon)?;
        Ok(Some(
            self.module
                .statement(StatementKind::BreakIf(condition), span),
        ))
    }

    fn for_statement(&mut self, attrs: &mut Vec<ast::Attribute>) -> Maybe<ast::Statement> {
        let t = self.peek();
        if !self.skip(Token::For) {
            return Ok(None);
        }

        let (init, condition, update) =
            self.expect_paren_block("for loop", |p| p.expect_for_header())?;
        let body = self.expect_compound_statement("for loop")?;

        let kind = StatementKind::For(ast::For {
            init: init.map(Box::new),
            condition,
            update: update.map(Box::new),
            body,
            attributes: std::mem::take(attrs),
        });
        let span = self.span_from(t.1.start());
        Ok(Some(self.module.statement(kind, span)))
    }

    #[allow(clippy::type_complexity)]
    fn expect_for_header(
        &mut self,
    ) -> Expect<(Option<ast::Statement>, Option<Expr>, Option<ast::Statement>)> {
        let init = self.for_header_initializer()?;
        self.expect("initializer in for loop", Token::Semicolon)?;
        let condition = self.expression()?;
        self.expect("condition in for loop", Token::Semicolon)?;
        let update = self.for_header_continuing()?;
        Ok((init, condition, update))
    }

    fn for_header_initializer(&mut self) -> Maybe<ast::Statement> {
        let start = self.peek().1.start();
        let kind = if let Some(call) = self.func_call_statement()? {
            StatementKind::Call(call)
        } else if let Some(var) = self.variable_statement()? {
            StatementKind::Declaration(var)
        } else if let Some(kind) = self.variable_updating_statement()? {
            kind
        } else {
            return Ok(None);
        };
        let span = self.span_from(start);
        Ok(Some(self.module.statement(kind, span)))
    }

    fn for_header_continuing(&mut self) -> Maybe<ast::Statement> {
        let start = self.peek().1.start();
        let kind = if let Some(call) = self.func_call_statement()? {
            StatementKind::Call(call)
        } else if let Some(kind) = self.variable_updating_statement()? {
            kind
        } else {
            return Ok(None);
        };
        let span = self.span_from(start);
        Ok(Some(self.module.statement(kind, span)))
    }

    fn while_statement(&mut self, attrs: &mut Vec<ast::Attribute>) -> Maybe<ast::Statement> {
        let t = self.peek();
        if !self.skip(Token::While) {
            return Ok(None);
        }

        let condition = match self.expression()? {
            Some(condition) => condition,
            None => {
                let t = self.peek();
                return Err(self.error(t.1, "unable to parse while condition expression"));
            }
        };
        let body = self.expect_compound_statement("while loop")?;

        let kind = StatementKind::While(ast::While {
            condition,
            body,
            attributes: std::mem::take(attrs),
        });
        let span = self.span_from(t.1.start());
        Ok(Some(self.module.statement(kind, span)))
    }

    fn func_call_statement(&mut self) -> Maybe<Expr> {
        let t = self.peek();
        if t.0 != Token::Identifier || self.peek_at(1).0 != Token::ParenLeft {
            return Ok(None);
        }
        self.next();

        let arguments = self.expect_argument_expression_list("function call")?;
        let name = self.text(t.1);
        let callee = self.module.ident_expr(name, t.1);
        let span = self.span_from(t.1.start());
        Ok(Some(self.module.call_expr(callee, arguments, span)))
    }

    fn variable_updating_statement(&mut self) -> Maybe<StatementKind> {
        let t = self.peek();
        if t.0 == Token::Identifier && self.peek_at(1).0 == Token::Colon {
            return Err(self.error(t.1, "expected 'var' for variable declaration"));
        }

        let lhs;
        let mut op = None;
        if t.0 == Token::Underscore {
            self.next();
            self.expect("assignment", Token::Equal)?;
            lhs = self.module.add_expression(ExpressionKind::Phony, t.1);
        } else {
            lhs = match self.lhs_expression()? {
                Some(lhs) => lhs,
                None => return Ok(None),
            };

            if self.skip(Token::PlusPlus) {
                return Ok(Some(StatementKind::Increment(lhs)));
            }
            if self.skip(Token::MinusMinus) {
                return Ok(Some(StatementKind::Decrement(lhs)));
            }

            match self.compound_assignment_operator() {
                Some(compound) => op = Some(compound),
                None => self.expect("assignment", Token::Equal)?,
            }
        }

        let rhs = match self.expression()? {
            Some(rhs) => rhs,
            None => {
                let t = self.peek();
                return Err(self.error(t.1, "unable to parse right side of assignment"));
            }
        };
        Ok(Some(StatementKind::Assignment { lhs, op, rhs }))
    }

    fn compound_assignment_operator(&mut self) -> Option<ast::BinaryOperator> {
        use ast::BinaryOperator as Bo;
        let op = match self.peek().0 {
            Token::PlusEqual => Bo::Add,
            Token::MinusEqual => Bo::Subtract,
            Token::TimesEqual => Bo::Multiply,
            Token::DivisionEqual => Bo::Divide,
            Token::ModuloEqual => Bo::Modulo,
            Token::AndEqual => Bo::And,
            Token::OrEqual => Bo::Or,
            Token::XorEqual => Bo::Xor,
            Token::ShiftLeftEqual => Bo::ShiftLeft,
            Token::ShiftRightEqual => Bo::ShiftRight,
            _ => return None,
        };
        self.next();
        Some(op)
    }

    fn core_lhs_expression(&mut self) -> Maybe<Expr> {
        let t = self.peek();
        match t.0 {
            Token::Identifier => {
                self.next();
                let name = self.text(t.1);
                Ok(Some(self.module.ident_expr(name, t.1)))
            }
            Token::ParenLeft => {
                let expr = self.expect_paren_block("", |p| match p.lhs_expression()? {
                    Some(expr) => Ok(expr),
                    None => Err(p.error(t.1, "invalid expression")),
                })?;
                Ok(Some(expr))
            }
            _ => Ok(None),
        }
    }

    fn lhs_expression(&mut self) -> Maybe<Expr> {
        if let Some(core) = self.core_lhs_expression()? {
            return self.component_or_swizzle_specifier(core).map(Some);
        }

        let mut ops = Vec::new();
        loop {
            let t = self.peek();
            let op = match t.0 {
                Token::AndAnd => {
                    self.next();
                    self.split_token(Token::And, Token::And);
                    ast::UnaryOperator::AddressOf
                }
                Token::And => {
                    self.next();
                    ast::UnaryOperator::AddressOf
                }
                Token::Star => {
                    self.next();
                    ast::UnaryOperator::Deref
                }
                _ => break,
            };
            ops.push((op, t.1.start()));
        }
        if ops.is_empty() {
            return Ok(None);
        }

        let t = self.peek();
        let mut expr = match self.lhs_expression()? {
            Some(expr) => expr,
            None => return Err(self.error(t.1, "missing expression")),
        };
        let end = self.module.expression_span(expr).end();
        for (op, start) in ops.into_iter().rev() {
            expr = self.module.add_expression(
                ExpressionKind::Unary { op, expr },
                Span::new(start, end),
            );
        }
        Ok(Some(expr))
    }

    // Expressions

    fn expression(&mut self) -> Maybe<Expr> {
        let expr = match self.expression_unchecked()? {
            Some(expr) => expr,
            None => return Ok(None),
        };

        // Precedence between these groups is deliberately undefined.
        if let ExpressionKind::Binary { op, .. } = *self.module.expression(expr) {
            let next = self.peek();
            if is_binary_operator(next.0) {
                let span = self.module.expression_span(expr).until(&next.1);
                return Err(self.error(
                    span,
                    format!(
                        "mixing '{}' and '{}' requires parenthesis",
                        op.as_str(),
                        next.0.name()
                    ),
                ));
            }
        }
        Ok(Some(expr))
    }

    fn expression_unchecked(&mut self) -> Maybe<Expr> {
        let lhs = match self.unary_expression()? {
            Some(lhs) => lhs,
            None => return Ok(None),
        };

        if let Some(bitwise) = self.bitwise_expression_post_unary_expression(lhs)? {
            return Ok(Some(bitwise));
        }

        let mut result = self.expect_relational_expression_post_unary_expression(lhs)?;

        let t = self.peek();
        let op = match t.0 {
            Token::AndAnd => ast::BinaryOperator::LogicalAnd,
            Token::OrOr => ast::BinaryOperator::LogicalOr,
            _ => return Ok(Some(result)),
        };

        while self.continue_parsing() {
            if !self.skip(t.0) {
                break;
            }
            let rhs = match self.relational_expression()? {
                Some(rhs) => rhs,
                None => return Err(self.right_side_error(op.as_str())),
            };
            result = self.binary(op, result, rhs);
        }
        Ok(Some(result))
    }

    fn right_side_error(&mut self, op: &str) -> Errored {
        let t = self.peek();
        self.error(t.1, format!("unable to parse right side of {op} expression"))
    }

    fn binary(&mut self, op: ast::BinaryOperator, left: Expr, right: Expr) -> Expr {
        let span = self
            .module
            .expression_span(left)
            .until(&self.module.expression_span(right));
        self.module
            .add_expression(ExpressionKind::Binary { op, left, right }, span)
    }

    fn bitwise_expression_post_unary_expression(&mut self, lhs: Expr) -> Maybe<Expr> {
        let t = self.peek();
        let op = match t.0 {
            Token::And => ast::BinaryOperator::And,
            Token::Or => ast::BinaryOperator::Or,
            Token::Xor => ast::BinaryOperator::Xor,
            _ => return Ok(None),
        };
        self.next();

        let mut lhs = lhs;
        while self.continue_parsing() {
            let rhs = match self.unary_expression()? {
                Some(rhs) => rhs,
                None => return Err(self.right_side_error(op.as_str())),
            };
            lhs = self.binary(op, lhs, rhs);
            if !self.skip(t.0) {
                return Ok(Some(lhs));
            }
        }
        Err(Errored)
    }

    fn multiplicative_operator(&mut self) -> Option<ast::BinaryOperator> {
        let op = match self.peek().0 {
            Token::ForwardSlash => ast::BinaryOperator::Divide,
            Token::Modulo => ast::BinaryOperator::Modulo,
            Token::Star => ast::BinaryOperator::Multiply,
            _ => return None,
        };
        self.next();
        Some(op)
    }

    fn expect_multiplicative_expression_post_unary_expression(
        &mut self,
        lhs: Expr,
    ) -> Expect<Expr> {
        let mut lhs = lhs;
        while self.continue_parsing() {
            let op = match self.multiplicative_operator() {
                Some(op) => op,
                None => return Ok(lhs),
            };
            let rhs = match self.unary_expression()? {
                Some(rhs) => rhs,
                None => return Err(self.right_side_error(op.as_str())),
            };
            lhs = self.binary(op, lhs, rhs);
        }
        Err(Errored)
    }

    fn additive_operator(&mut self) -> Option<ast::BinaryOperator> {
        match self.peek().0 {
            Token::Plus => {
                self.next();
                Some(ast::BinaryOperator::Add)
            }
            // `a--b` is `a - -b`.
            Token::MinusMinus => {
                self.next();
                self.split_token(Token::Minus, Token::Minus);
                Some(ast::BinaryOperator::Subtract)
            }
            Token::Minus => {
                self.next();
                Some(ast::BinaryOperator::Subtract)
            }
            _ => None,
        }
    }

    fn expect_additive_expression_post_unary_expression(&mut self, lhs: Expr) -> Expect<Expr> {
        let mut lhs = lhs;
        while self.continue_parsing() {
            let op = match self.additive_operator() {
                Some(op) => op,
                None => return Ok(lhs),
            };
            let unary = match self.unary_expression()? {
                Some(unary) => unary,
                None => return Err(self.right_side_error(op.as_str())),
            };
            let rhs = self.expect_multiplicative_expression_post_unary_expression(unary)?;
            lhs = self.binary(op, lhs, rhs);
        }
        Err(Errored)
    }

    fn expect_math_expression_post_unary_expression(&mut self, lhs: Expr) -> Expect<Expr> {
        let rhs = self.expect_multiplicative_expression_post_unary_expression(lhs)?;
        self.expect_additive_expression_post_unary_expression(rhs)
    }

    fn shift_expression(&mut self) -> Maybe<Expr> {
        match self.unary_expression()? {
            Some(lhs) => self.expect_shift_expression_post_unary_expression(lhs).map(Some),
            None => Ok(None),
        }
    }

    fn expect_shift_expression_post_unary_expression(&mut self, lhs: Expr) -> Expect<Expr> {
        let op = match self.peek().0 {
            Token::ShiftLeft => ast::BinaryOperator::ShiftLeft,
            Token::ShiftRight => ast::BinaryOperator::ShiftRight,
            _ => return self.expect_math_expression_post_unary_expression(lhs),
        };
        self.next();

        let rhs = match self.unary_expression()? {
            Some(rhs) => rhs,
            None => return Err(self.right_side_error(op.as_str())),
        };
        Ok(self.binary(op, lhs, rhs))
    }

    fn relational_expression(&mut self) -> Maybe<Expr> {
        match self.unary_expression()? {
            Some(lhs) => self
                .expect_relational_expression_post_unary_expression(lhs)
                .map(Some),
            None => Ok(None),
        }
    }

    fn expect_relational_expression_post_unary_expression(&mut self, lhs: Expr) -> Expect<Expr> {
        use ast::BinaryOperator as Bo;
        let lhs = self.expect_shift_expression_post_unary_expression(lhs)?;

        let op = match self.peek().0 {
            Token::LessThan => Bo::Less,
            Token::GreaterThan => Bo::Greater,
            Token::LessThanEqual => Bo::LessEqual,
            Token::GreaterThanEqual => Bo::GreaterEqual,
            Token::EqualEqual => Bo::Equal,
            Token::NotEqual => Bo::NotEqual,
            _ => return Ok(lhs),
        };
        self.next();

        let rhs = match self.shift_expression()? {
            Some(rhs) => rhs,
            None => return Err(self.right_side_error(op.as_str())),
        };
        Ok(self.binary(op, lhs, rhs))
    }

    fn unary_expression(&mut self) -> Maybe<Expr> {
        let t = self.peek();
        if self.skip(Token::PlusPlus) || self.skip(Token::MinusMinus) {
            return Err(self.error(
                t.1,
                "prefix increment and decrement operators are reserved for a future WGSL version",
            ));
        }

        let op = match t.0 {
            Token::Minus => ast::UnaryOperator::Negate,
            Token::Bang => ast::UnaryOperator::LogicalNot,
            Token::Tilde => ast::UnaryOperator::Complement,
            Token::Star => ast::UnaryOperator::Deref,
            Token::And => ast::UnaryOperator::AddressOf,
            _ => return self.singular_expression(),
        };
        self.next();

        if self.parse_depth >= MAX_PARSE_DEPTH {
            let t = self.peek();
            return Err(self.error(t.1, "maximum parser recursive depth reached"));
        }

        self.parse_depth += 1;
        let expr = self.unary_expression();
        self.parse_depth -= 1;

        let expr = match expr? {
            Some(expr) => expr,
            None => return Err(self.right_side_error(t.0.name())),
        };
        let span = self.span_from(t.1.start());
        Ok(Some(
            self.module
                .add_expression(ExpressionKind::Unary { op, expr }, span),
        ))
    }

    fn singular_expression(&mut self) -> Maybe<Expr> {
        match self.primary_expression()? {
            Some(prefix) => self.component_or_swizzle_specifier(prefix).map(Some),
            None => Ok(None),
        }
    }

    fn primary_expression(&mut self) -> Maybe<Expr> {
        let t = self.peek();
        let start = t.1.start();

        if self.skip(Token::Bitcast) {
            let what = "bitcast expression";
            let ty = self.expect_template_arg_block(what, |p| p.expect_type(what))?;
            let expr = self.expect_paren_expression()?;
            let span = self.span_from(start);
            return Ok(Some(
                self.module
                    .add_expression(ExpressionKind::Bitcast { ty, expr }, span),
            ));
        }

        if let Some(literal) = self.const_literal()? {
            return Ok(Some(literal));
        }

        match t.0 {
            Token::Identifier => {
                self.next();
                let name = self.text(t.1);

                let mut template_args = Vec::new();
                if self.peek_is(Token::TemplateArgsLeft) {
                    // A broken argument list has been reported and skipped.
                    template_args = self
                        .expect_template_arg_block("template arguments", |p| {
                            p.expect_expression_list(
                                "template argument list",
                                Token::TemplateArgsRight,
                            )
                        })
                        .unwrap_or_default();
                }
                let span = self.span_from(start);
                let ident = self.module.add_expression(
                    ExpressionKind::Ident {
                        ident: Ident::new(name, t.1),
                        template_args,
                    },
                    span,
                );

                if self.peek_is(Token::ParenLeft) {
                    let arguments = self.expect_argument_expression_list("function call")?;
                    let span = self.span_from(start);
                    return Ok(Some(self.module.call_expr(ident, arguments, span)));
                }
                Ok(Some(ident))
            }
            Token::ParenLeft => self.expect_paren_expression().map(Some),
            _ => Ok(None),
        }
    }

    fn const_literal(&mut self) -> Maybe<Expr> {
        let t = self.peek();
        let literal = match t.0 {
            Token::Number(number) => literal(number),
            Token::True => ast::Literal::Bool(true),
            Token::False => ast::Literal::Bool(false),
            _ => {
                if self.handle_error(t) {
                    return Err(Errored);
                }
                return Ok(None);
            }
        };
        self.next();
        Ok(Some(self.module.literal_expr(literal, t.1)))
    }

    fn component_or_swizzle_specifier(&mut self, prefix: Expr) -> Expect<Expr> {
        let start = self.module.expression_span(prefix).start();
        let mut prefix = prefix;
        while self.continue_parsing() {
            if self.skip(Token::BracketLeft) {
                let index = self.sync(Token::BracketRight, |p| {
                    let index = match p.expression()? {
                        Some(index) => index,
                        None => {
                            let t = p.peek();
                            return Err(p.error(t.1, "unable to parse expression inside []"));
                        }
                    };
                    p.expect("index accessor", Token::BracketRight)?;
                    Ok(index)
                })?;
                let span = self.span_from(start);
                prefix = self.module.add_expression(
                    ExpressionKind::Index {
                        base: prefix,
                        index,
                    },
                    span,
                );
                continue;
            }

            if self.skip(Token::Period) {
                let member = self.expect_ident("member accessor")?;
                let span = self.span_from(start);
                prefix = self.module.add_expression(
                    ExpressionKind::Member {
                        base: prefix,
                        member,
                    },
                    span,
                );
                continue;
            }

            return Ok(prefix);
        }
        Err(Errored)
    }

    fn expect_argument_expression_list(&mut self, what: &str) -> Expect<Vec<Expr>> {
        self.expect_paren_block(what, |p| {
            let mut arguments = Vec::new();
            while p.continue_parsing() {
                match p.expression()? {
                    Some(argument) => arguments.push(argument),
                    None => break,
                }
                if !p.skip(Token::Comma) {
                    break;
                }
            }
            Ok(arguments)
        })
    }

    fn expect_expression(&mut self, what: &str) -> Expect<Expr> {
        let t = self.peek();
        match self.expression()? {
            Some(expr) => Ok(expr),
            None => Err(self.error(t.1, format!("expected expression for {what}"))),
        }
    }

    /// One or more comma separated expressions, with an optional trailing
    /// comma before `terminator`.
    fn expect_expression_list(&mut self, what: &str, terminator: Token) -> Expect<Vec<Expr>> {
        let mut exprs = Vec::new();
        while self.continue_parsing() {
            exprs.push(self.expect_expression(what)?);
            if self.peek_is(terminator) {
                break;
            }
            self.expect(what, Token::Comma)?;
            if self.peek_is(terminator) {
                break;
            }
        }
        Ok(exprs)
    }

    // Attributes

    fn attribute_list(&mut self) -> Expect<Vec<ast::Attribute>> {
        let mut errored = false;
        let mut attrs = Vec::new();
        while self.continue_parsing() {
            if !self.skip(Token::Attr) {
                break;
            }
            match self.expect_attribute() {
                Ok(attr) => attrs.push(attr),
                Err(Errored) => errored = true,
            }
        }
        if errored {
            Err(Errored)
        } else {
            Ok(attrs)
        }
    }

    fn expect_attribute(&mut self) -> Expect<ast::Attribute> {
        let t = self.peek();
        match self.attribute()? {
            Some(attr) => Ok(attr),
            None => {
                if self.handle_error(t) {
                    return Err(Errored);
                }
                Err(self.error(t.1, "expected attribute"))
            }
        }
    }

    fn attribute(&mut self) -> Maybe<ast::Attribute> {
        let t = self.peek();

        if self.skip(Token::Const) {
            return Err(self.error(t.1, "const attribute may not appear in shaders"));
        }
        if self.skip(Token::Diagnostic) {
            let control = self.expect_diagnostic_control()?;
            return Ok(Some(ast::Attribute {
                id: self.module.next_id(),
                span: t.1,
                kind: ast::AttributeKind::Diagnostic(control),
            }));
        }

        let (name, _) = self.expect_enum(
            "attribute",
            |word| ATTRIBUTE_NAMES.iter().copied().find(|&n| n == word),
            ATTRIBUTE_NAMES,
            "",
        )?;

        let (min, max) = match name {
            "compute" | "fragment" | "invariant" | "must_use" | "vertex" => (0, 0),
            "interpolate" => (1, 2),
            "workgroup_size" => (1, 3),
            _ => (1, 1),
        };

        let mut args = Vec::new();
        if self.peek_is(Token::ParenLeft) {
            if max == 0 {
                let t = self.peek();
                return Err(self.error(t.1, format!("{name} attribute doesn't take parenthesis")));
            }
            let what = format!("{name} attribute");
            args = self.expect_paren_block(&what, |p| {
                let mut args = Vec::new();
                while p.continue_parsing() {
                    if p.peek_is(Token::ParenRight) {
                        break;
                    }
                    args.push(p.expect_expression(name)?);
                    if !p.skip(Token::Comma) {
                        break;
                    }
                }
                Ok(args)
            })?;
        }

        if args.len() < min {
            let plural = if min != 1 { "s" } else { "" };
            let at_least = if min != max { " at least " } else { " " };
            return Err(self.error(
                t.1,
                format!("{name} expects{at_least}{min} argument{plural}"),
            ));
        }
        if args.len() > max {
            let plural = if max != 1 { "s" } else { "" };
            let got = args.len();
            return Err(self.error(
                t.1,
                format!("{name} expects at most {max} argument{plural}, got {got}"),
            ));
        }

        use ast::AttributeKind as Ak;
        let first = args.first().copied();
        let second = args.get(1).copied();
        let third = args.get(2).copied();
        let kind = match (name, first) {
            ("compute", _) => Ak::Compute,
            ("fragment", _) => Ak::Fragment,
            ("invariant", _) => Ak::Invariant,
            ("must_use", _) => Ak::MustUse,
            ("vertex", _) => Ak::Vertex,
            ("align", Some(a)) => Ak::Align(a),
            ("binding", Some(a)) => Ak::Binding(a),
            ("builtin", Some(a)) => Ak::Builtin(a),
            ("group", Some(a)) => Ak::Group(a),
            ("id", Some(a)) => Ak::Id(a),
            ("location", Some(a)) => Ak::Location(a),
            ("size", Some(a)) => Ak::Size(a),
            ("interpolate", Some(a)) => Ak::Interpolate {
                ty: a,
                sampling: second,
            },
            ("workgroup_size", Some(a)) => Ak::WorkgroupSize {
                x: a,
                y: second,
                z: third,
            },
            _ => return Err(self.error(t.1, "expected attribute")),
        };

        Ok(Some(ast::Attribute {
            id: self.module.next_id(),
            span: t.1,
            kind,
        }))
    }

    fn expect_attributes_consumed(&mut self, attrs: &[ast::Attribute]) -> Expect<()> {
        match attrs.first() {
            Some(attr) => Err(self.error(attr.span, "unexpected attributes")),
            None => Ok(()),
        }
    }

    /// `(severity, rule)`, after `diagnostic`.
    fn expect_diagnostic_control(&mut self) -> Expect<ast::DiagnosticControl> {
        self.expect_paren_block("diagnostic control", |p| {
            let (severity, _) = p.expect_enum(
                "severity control",
                filter::Severity::from_ident,
                filter::Severity::NAMES,
                "",
            )?;
            p.expect("diagnostic control", Token::Comma)?;
            let rule = p.expect_diagnostic_rule_name()?;
            p.skip(Token::Comma);
            Ok(ast::DiagnosticControl { severity, rule })
        })
    }

    fn expect_diagnostic_rule_name(&mut self) -> Expect<ast::DiagnosticRuleName> {
        if self.peek_at(1).0 == Token::Period {
            let category = self.expect_ident_kind("", "diagnostic rule category")?;
            self.expect("diagnostic rule", Token::Period)?;
            let name = self.expect_ident_kind("", "diagnostic rule name")?;
            return Ok(ast::DiagnosticRuleName {
                category: Some(category),
                name,
            });
        }
        let name = self.expect_ident_kind("", "diagnostic rule name")?;
        Ok(ast::DiagnosticRuleName {
            category: None,
            name,
        })
    }
}

fn literal(number: Number) -> ast::Literal {
    match number {
        Number::AbstractInt(v) => ast::Literal::AbstractInt(v),
        Number::AbstractFloat(v) => ast::Literal::AbstractFloat(v),
        Number::I32(v) => ast::Literal::I32(v),
        Number::U32(v) => ast::Literal::U32(v),
        Number::F32(v) => ast::Literal::F32(v),
        Number::F16(v) => ast::Literal::F16(v),
    }
}

/// Tokens that may follow a complete expression as a binary operator.
const fn is_binary_operator(token: Token) -> bool {
    matches!(
        token,
        Token::And
            | Token::AndAnd
            | Token::EqualEqual
            | Token::ForwardSlash
            | Token::GreaterThan
            | Token::GreaterThanEqual
            | Token::LessThan
            | Token::LessThanEqual
            | Token::Minus
            | Token::Modulo
            | Token::NotEqual
            | Token::Or
            | Token::OrOr
            | Token::Plus
            | Token::ShiftLeft
            | Token::ShiftRight
            | Token::Star
            | Token::Xor
    )
}

/// How a statement ending in `;` is named in "expected ';' for ..." errors.
const fn statement_name(kind: &StatementKind) -> &'static str {
    match *kind {
        StatementKind::Return(_) => "return statement",
        StatementKind::Call(_) => "function call",
        StatementKind::Declaration(_) => "variable declaration",
        StatementKind::Break => "break statement",
        StatementKind::Continue => "continue statement",
        StatementKind::Discard => "discard statement",
        StatementKind::Assignment { op: None, .. } => "assignment statement",
        StatementKind::Assignment { op: Some(_), .. } => "compound assignment statement",
        StatementKind::Increment(_) | StatementKind::Decrement(_) => {
            "increment/decrement statement"
        }
        _ => "statement",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOperator, GlobalDeclKind};

    fn parse_ok(source: &str) -> ast::Module {
        let (module, diagnostics) = parse(source, None);
        assert!(
            !diagnostics.contains_errors(),
            "{}",
            diagnostics.to_plain_string(source)
        );
        module
    }

    fn first_error(source: &str) -> String {
        let (_, diagnostics) = parse(source, None);
        diagnostics
            .iter()
            .next()
            .map(|d| d.message.clone())
            .unwrap_or_default()
    }

    fn const_initializer(module: &ast::Module) -> Expr {
        let var = module.global_variables().next().unwrap();
        var.initializer.unwrap()
    }

    #[test]
    fn multiplication_binds_tighter() {
        let module = parse_ok("const x = a + b * c;");
        let init = const_initializer(&module);
        match *module.expression(init) {
            ExpressionKind::Binary {
                op: BinaryOperator::Add,
                right,
                ..
            } => assert!(matches!(
                *module.expression(right),
                ExpressionKind::Binary {
                    op: BinaryOperator::Multiply,
                    ..
                }
            )),
            ref other => panic!("unexpected {other:?}"),
        }
        assert_eq!(module.expression_span(init), Span::new(10, 19));
    }

    #[test]
    fn minus_minus_between_operands() {
        let module = parse_ok("const x = a--b;");
        let init = const_initializer(&module);
        match *module.expression(init) {
            ExpressionKind::Binary {
                op: BinaryOperator::Subtract,
                right,
                ..
            } => assert!(matches!(
                *module.expression(right),
                ExpressionKind::Unary {
                    op: ast::UnaryOperator::Negate,
                    ..
                }
            )),
            ref other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn templated_types() {
        let module = parse_ok("var<private> v: array<vec4<f32>, 4>;");
        let var = module.global_variables().next().unwrap();
        let ty = var.ty.unwrap();
        match *module.expression(ty) {
            ExpressionKind::Ident {
                ref ident,
                ref template_args,
            } => {
                assert_eq!(ident.name, "array");
                assert_eq!(template_args.len(), 2);
            }
            ref other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            var.kind,
            ast::VariableKind::Var {
                address_space: Some(_),
                access: None
            }
        ));
    }

    #[test]
    fn duplicate_enables_are_recorded() {
        let module = parse_ok("enable f16;\nenable f16, f16;");
        assert_eq!(module.enables().count(), 2);
        assert_eq!(module.enables().flatten().count(), 3);
    }

    #[test]
    fn directive_after_declaration() {
        let source = "var<private> t: f32 = 0f;\nenable f16;\n";
        let (module, diagnostics) = parse(source, None);
        assert_eq!(diagnostics.error_count(), 1);
        assert_eq!(
            diagnostics.iter().next().unwrap().message,
            "directives must come before all global declarations"
        );
        assert!(module.has_extension(ast::ExtensionKind::F16));
    }

    #[test]
    fn functions_and_statements() {
        let module = parse_ok(
            "@fragment
            fn main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
                var sum = 0.0;
                for (var i = 0; i < 4; i++) {
                    if i == 2 { continue; } else if i == 3 { break; } else { sum += 1.0; }
                }
                loop {
                    continuing { break if sum > 1.0; }
                }
                switch 1 { case 1, 2: {} default { } }
                _ = uv;
                return vec4(sum);
            }",
        );
        let function = module.functions().next().unwrap();
        assert_eq!(function.name.name, "main");
        assert_eq!(function.stage(), Some(ast::ShaderStage::Fragment));
        assert_eq!(function.params.len(), 1);
        assert_eq!(function.return_attributes.len(), 1);
        assert_eq!(function.body.statements.len(), 6);
        match function.body.statements[1].kind {
            StatementKind::For(ref f) => {
                assert!(f.init.is_some());
                assert!(f.condition.is_some());
                assert!(matches!(
                    f.update.as_ref().map(|s| &s.kind),
                    Some(&StatementKind::Increment(_))
                ));
            }
            ref other => panic!("unexpected {other:?}"),
        }
        match function.body.statements[2].kind {
            StatementKind::Loop(ref l) => {
                let continuing = l.continuing.as_ref().unwrap();
                assert!(matches!(
                    continuing.statements[0].kind,
                    StatementKind::BreakIf(_)
                ));
            }
            ref other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn diagnostic_controls() {
        let module = parse_ok(
            "diagnostic(off, derivative_uniformity);
            @diagnostic(warning, chromium.unreachable_code) fn f() {}",
        );
        let control = module.diagnostic_directives().next().unwrap();
        assert_eq!(control.severity, filter::Severity::Off);
        assert_eq!(control.rule.to_string(), "derivative_uniformity");
        let function = module.functions().next().unwrap();
        match function.attributes[0].kind {
            ast::AttributeKind::Diagnostic(ref control) => {
                assert_eq!(control.rule.to_string(), "chromium.unreachable_code");
            }
            ref other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn recovery_continues_after_errors() {
        let source = "fn f() { a = ; }\nfn g() { b = ; }\nconst ok = 1;";
        let (module, diagnostics) = parse(source, None);
        assert_eq!(diagnostics.error_count(), 2);
        assert_eq!(module.global_variables().count(), 1);
    }

    #[test]
    fn error_messages() {
        assert_eq!(
            first_error("fn f() { x = 1 + 2 << 3; }"),
            "mixing '+' and '<<' requires parenthesis"
        );
        assert_eq!(
            first_error("fn f() { return ++a; }"),
            "prefix increment and decrement operators are reserved for a future WGSL version"
        );
        assert_eq!(first_error("fn f() { let loop = 1; }"), "expected identifier for 'let' declaration");
        assert_eq!(first_error("fn struct() {}"), "expected identifier for function declaration");
        assert_eq!(
            first_error("enable f15;"),
            "expected extension\nDid you mean 'f16'?\nPossible values: 'chromium_disable_uniformity_analysis', 'chromium_experimental_dp4a', 'chromium_experimental_full_ptr_parameters', 'chromium_experimental_push_constant', 'chromium_internal_relaxed_uniform_layout', 'f16'"
        );
        assert_eq!(
            first_error("requires foo;"),
            "feature 'foo' is not supported"
        );
        assert_eq!(
            first_error("fn f() { var x = 0123; }"),
            "integer literal cannot have leading 0s"
        );
    }

    #[test]
    fn reserved_words_are_not_identifiers() {
        assert_eq!(
            first_error("const precision = 1;"),
            "'precision' is a reserved keyword"
        );
    }

    #[test]
    fn requires_directive() {
        let module = parse_ok("requires readonly_and_readwrite_storage_textures;");
        let features: Vec<_> = module.requires().flatten().map(|&(f, _)| f).collect();
        assert_eq!(
            features,
            [ast::LanguageFeature::ReadonlyAndReadwriteStorageTextures]
        );
    }

    #[test]
    fn invalid_utf8_is_reported() {
        let (_, diagnostics) = parse_bytes(b"const a = 1;\xff", None);
        assert_eq!(diagnostics.error_count(), 1);
        let error = diagnostics.iter().next().unwrap();
        assert_eq!(error.message, "invalid UTF-8");
        assert_eq!(error.span, Span::new(12, 13));
    }

    #[test]
    fn declarations_keep_source_order() {
        let module = parse_ok("struct S { a: i32 }\nalias T = S;\nconst_assert true;");
        let kinds: Vec<_> = module
            .declarations()
            .iter()
            .map(|(_, decl)| match decl.kind {
                GlobalDeclKind::TypeDecl(_) => "type",
                GlobalDeclKind::ConstAssert(_) => "assert",
                _ => "other",
            })
            .collect();
        assert_eq!(kinds, ["type", "type", "assert"]);
        assert!(module.find_type("S").is_some());
    }
}
