use super::number::{consume_number, Number};
use crate::Span;

use std::fmt;

/// A problem found while scanning a single token.
///
/// Lexing stops at the first error; the parser reports it when it reaches
/// the error token.
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LexError {
    #[error("invalid UTF-8")]
    InvalidUtf8,
    #[error("unterminated block comment")]
    UnterminatedComment,
    #[error("invalid character found")]
    InvalidCharacter,
    #[error("identifiers must not start with two or more underscores")]
    DoubleUnderscore,
    #[error("integer literal cannot have leading 0s")]
    LeadingZeros,
    #[error("value cannot be represented as '{0}'")]
    Unrepresentable(&'static str),
    /// The literal's value is infinite. The flag is the sign.
    #[error("value cannot be represented as '{0}': {inf}", inf = if *.1 { "-inf" } else { "inf" })]
    NonFinite(&'static str, bool),
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Token {
    // Punctuation
    And,
    AndAnd,
    AndEqual,
    Arrow,
    Attr,
    Bang,
    BraceLeft,
    BraceRight,
    BracketLeft,
    BracketRight,
    Colon,
    Comma,
    DivisionEqual,
    Equal,
    EqualEqual,
    ForwardSlash,
    GreaterThan,
    GreaterThanEqual,
    LessThan,
    LessThanEqual,
    Minus,
    MinusEqual,
    MinusMinus,
    Modulo,
    ModuloEqual,
    NotEqual,
    Or,
    OrEqual,
    OrOr,
    ParenLeft,
    ParenRight,
    Period,
    Plus,
    PlusEqual,
    PlusPlus,
    Semicolon,
    ShiftLeft,
    ShiftLeftEqual,
    ShiftRight,
    ShiftRightEqual,
    Star,
    TimesEqual,
    Tilde,
    Underscore,
    Xor,
    XorEqual,
    /// A `<` that opens a template argument list.
    TemplateArgsLeft,
    /// A `>` that closes a template argument list.
    TemplateArgsRight,

    // Keywords
    Alias,
    Bitcast,
    Break,
    Case,
    Const,
    ConstAssert,
    Continue,
    Continuing,
    Default,
    Diagnostic,
    Discard,
    Else,
    Enable,
    False,
    Fn,
    For,
    If,
    Let,
    Loop,
    Override,
    Requires,
    Return,
    Struct,
    Switch,
    True,
    Var,
    While,

    /// Any other word. The text is recovered from the token's span.
    Identifier,
    Number(Number),
    Error(LexError),
    /// Reserved room for splitting the token before it, like `>>` into
    /// `>` `>`. Skipped by the parser until a split fills it in.
    Placeholder,
    Eof,
}

impl Token {
    fn keyword(word: &str) -> Option<Self> {
        Some(match word {
            "alias" => Self::Alias,
            "bitcast" => Self::Bitcast,
            "break" => Self::Break,
            "case" => Self::Case,
            "const" => Self::Const,
            "const_assert" => Self::ConstAssert,
            "continue" => Self::Continue,
            "continuing" => Self::Continuing,
            "default" => Self::Default,
            "diagnostic" => Self::Diagnostic,
            "discard" => Self::Discard,
            "else" => Self::Else,
            "enable" => Self::Enable,
            "false" => Self::False,
            "fn" => Self::Fn,
            "for" => Self::For,
            "if" => Self::If,
            "let" => Self::Let,
            "loop" => Self::Loop,
            "override" => Self::Override,
            "requires" => Self::Requires,
            "return" => Self::Return,
            "struct" => Self::Struct,
            "switch" => Self::Switch,
            "true" => Self::True,
            "var" => Self::Var,
            "while" => Self::While,
            _ => return None,
        })
    }

    /// How the token is spelled, as used in "expected '...'" messages.
    pub const fn name(&self) -> &'static str {
        match *self {
            Self::And => "&",
            Self::AndAnd => "&&",
            Self::AndEqual => "&=",
            Self::Arrow => "->",
            Self::Attr => "@",
            Self::Bang => "!",
            Self::BraceLeft => "{",
            Self::BraceRight => "}",
            Self::BracketLeft => "[",
            Self::BracketRight => "]",
            Self::Colon => ":",
            Self::Comma => ",",
            Self::DivisionEqual => "/=",
            Self::Equal => "=",
            Self::EqualEqual => "==",
            Self::ForwardSlash => "/",
            Self::GreaterThan | Self::TemplateArgsRight => ">",
            Self::GreaterThanEqual => ">=",
            Self::LessThan | Self::TemplateArgsLeft => "<",
            Self::LessThanEqual => "<=",
            Self::Minus => "-",
            Self::MinusEqual => "-=",
            Self::MinusMinus => "--",
            Self::Modulo => "%",
            Self::ModuloEqual => "%=",
            Self::NotEqual => "!=",
            Self::Or => "|",
            Self::OrEqual => "|=",
            Self::OrOr => "||",
            Self::ParenLeft => "(",
            Self::ParenRight => ")",
            Self::Period => ".",
            Self::Plus => "+",
            Self::PlusEqual => "+=",
            Self::PlusPlus => "++",
            Self::Semicolon => ";",
            Self::ShiftLeft => "<<",
            Self::ShiftLeftEqual => "<<=",
            Self::ShiftRight => ">>",
            Self::ShiftRightEqual => ">>=",
            Self::Star => "*",
            Self::TimesEqual => "*=",
            Self::Tilde => "~",
            Self::Underscore => "_",
            Self::Xor => "^",
            Self::XorEqual => "^=",
            Self::Alias => "alias",
            Self::Bitcast => "bitcast",
            Self::Break => "break",
            Self::Case => "case",
            Self::Const => "const",
            Self::ConstAssert => "const_assert",
            Self::Continue => "continue",
            Self::Continuing => "continuing",
            Self::Default => "default",
            Self::Diagnostic => "diagnostic",
            Self::Discard => "discard",
            Self::Else => "else",
            Self::Enable => "enable",
            Self::False => "false",
            Self::Fn => "fn",
            Self::For => "for",
            Self::If => "if",
            Self::Let => "let",
            Self::Loop => "loop",
            Self::Override => "override",
            Self::Requires => "requires",
            Self::Return => "return",
            Self::Struct => "struct",
            Self::Switch => "switch",
            Self::True => "true",
            Self::Var => "var",
            Self::While => "while",
            Self::Identifier => "identifier",
            Self::Number(_) => "number literal",
            Self::Error(_) => "error",
            Self::Placeholder => "placeholder",
            Self::Eof => "end of file",
        }
    }

    pub const fn is_placeholder(&self) -> bool {
        matches!(*self, Self::Placeholder)
    }

    /// Tokens the parser can't move past.
    pub const fn is_terminal(&self) -> bool {
        matches!(*self, Self::Eof | Self::Error(_))
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub type TokenSpan = (Token, Span);

/// Returns whether or not a char is a blankspace (Unicode Pattern_White_Space)
const fn is_blankspace(c: char) -> bool {
    match c {
        '\u{0020}'
        | '\u{0009}'..='\u{000d}'
        | '\u{0085}'
        | '\u{200e}'
        | '\u{200f}'
        | '\u{2028}'
        | '\u{2029}' => true,
        _ => false,
    }
}

/// Returns whether or not a char is a comment end
/// (Unicode Pattern_White_Space excluding U+0020, U+0009, U+200E and U+200F)
/// <https://www.w3.org/TR/WGSL/#line-break>
const fn is_comment_end(c: char) -> bool {
    match c {
        '\u{000a}'..='\u{000d}' | '\u{0085}' | '\u{2028}' | '\u{2029}' => true,
        _ => false,
    }
}

/// Returns whether or not a char is a word start (Unicode XID_Start + '_')
fn is_word_start(c: char) -> bool {
    c == '_' || unicode_xid::UnicodeXID::is_xid_start(c)
}

/// Returns whether or not a char is a word part (Unicode XID_Continue)
fn is_word_part(c: char) -> bool {
    unicode_xid::UnicodeXID::is_xid_continue(c)
}

/// What [`consume_token`] found at the start of its input.
enum Scanned {
    Token(Token),
    /// A token followed by `n` placeholders.
    Splittable(Token, usize),
    Trivia,
    End,
}

/// Scan one token (or run of trivia) at the start of `input`, returning it
/// and the number of bytes it covers.
fn consume_token(input: &str) -> (Scanned, usize) {
    use Scanned::Token as T;

    let mut chars = input.chars();
    let cur = match chars.next() {
        Some(c) => c,
        None => return (Scanned::End, 0),
    };
    let next = chars.next();
    let third = chars.next();

    match cur {
        '(' => (T(Token::ParenLeft), 1),
        ')' => (T(Token::ParenRight), 1),
        '[' => (T(Token::BracketLeft), 1),
        ']' => (T(Token::BracketRight), 1),
        '{' => (T(Token::BraceLeft), 1),
        '}' => (T(Token::BraceRight), 1),
        ';' => (T(Token::Semicolon), 1),
        ',' => (T(Token::Comma), 1),
        ':' => (T(Token::Colon), 1),
        '@' => (T(Token::Attr), 1),
        '~' => (T(Token::Tilde), 1),
        '.' => match next {
            Some('0'..='9') => {
                let (number, len) = consume_number(input);
                (T(number_token(number)), len)
            }
            _ => (T(Token::Period), 1),
        },
        '0'..='9' => {
            let (number, len) = consume_number(input);
            (T(number_token(number)), len)
        }
        '/' => match next {
            Some('/') => {
                let len = input
                    .char_indices()
                    .find(|&(_, c)| is_comment_end(c))
                    .map_or(input.len(), |(pos, _)| pos);
                (Scanned::Trivia, len)
            }
            Some('*') => match block_comment_len(input) {
                Some(len) => (Scanned::Trivia, len),
                None => (T(Token::Error(LexError::UnterminatedComment)), 2),
            },
            Some('=') => (T(Token::DivisionEqual), 2),
            _ => (T(Token::ForwardSlash), 1),
        },
        '-' => match next {
            Some('>') => (T(Token::Arrow), 2),
            Some('-') => (Scanned::Splittable(Token::MinusMinus, 1), 2),
            Some('=') => (T(Token::MinusEqual), 2),
            _ => (T(Token::Minus), 1),
        },
        '+' => match next {
            Some('+') => (T(Token::PlusPlus), 2),
            Some('=') => (T(Token::PlusEqual), 2),
            _ => (T(Token::Plus), 1),
        },
        '*' => match next {
            Some('=') => (T(Token::TimesEqual), 2),
            _ => (T(Token::Star), 1),
        },
        '%' => match next {
            Some('=') => (T(Token::ModuloEqual), 2),
            _ => (T(Token::Modulo), 1),
        },
        '^' => match next {
            Some('=') => (T(Token::XorEqual), 2),
            _ => (T(Token::Xor), 1),
        },
        '=' => match next {
            Some('=') => (T(Token::EqualEqual), 2),
            _ => (T(Token::Equal), 1),
        },
        '!' => match next {
            Some('=') => (T(Token::NotEqual), 2),
            _ => (T(Token::Bang), 1),
        },
        '&' => match next {
            Some('&') => (Scanned::Splittable(Token::AndAnd, 1), 2),
            Some('=') => (T(Token::AndEqual), 2),
            _ => (T(Token::And), 1),
        },
        '|' => match next {
            Some('|') => (T(Token::OrOr), 2),
            Some('=') => (T(Token::OrEqual), 2),
            _ => (T(Token::Or), 1),
        },
        '<' => match (next, third) {
            (Some('<'), Some('=')) => (T(Token::ShiftLeftEqual), 3),
            (Some('<'), _) => (T(Token::ShiftLeft), 2),
            (Some('='), _) => (T(Token::LessThanEqual), 2),
            _ => (T(Token::LessThan), 1),
        },
        '>' => match (next, third) {
            (Some('>'), Some('=')) => (Scanned::Splittable(Token::ShiftRightEqual, 2), 3),
            (Some('>'), _) => (Scanned::Splittable(Token::ShiftRight, 1), 2),
            (Some('='), _) => (Scanned::Splittable(Token::GreaterThanEqual, 1), 2),
            _ => (T(Token::GreaterThan), 1),
        },
        _ if is_blankspace(cur) => {
            let len = input
                .char_indices()
                .find(|&(_, c)| !is_blankspace(c))
                .map_or(input.len(), |(pos, _)| pos);
            (Scanned::Trivia, len)
        }
        _ if is_word_start(cur) => {
            let len = input
                .char_indices()
                .find(|&(_, c)| !is_word_part(c))
                .map_or(input.len(), |(pos, _)| pos);
            let word = &input[..len];
            let token = if word == "_" {
                Token::Underscore
            } else if word.starts_with("__") {
                Token::Error(LexError::DoubleUnderscore)
            } else {
                Token::keyword(word).unwrap_or(Token::Identifier)
            };
            (T(token), len)
        }
        _ => (T(Token::Error(LexError::InvalidCharacter)), cur.len_utf8()),
    }
}

fn number_token(number: Result<Number, LexError>) -> Token {
    match number {
        Ok(number) => Token::Number(number),
        Err(e) => Token::Error(e),
    }
}

/// Length of the (possibly nested) block comment at the start of `input`,
/// or `None` if it never closes.
fn block_comment_len(input: &str) -> Option<usize> {
    let bytes = input.as_bytes();
    let mut depth = 0usize;
    let mut pos = 0;
    while pos + 1 < bytes.len() {
        match (bytes[pos], bytes[pos + 1]) {
            (b'/', b'*') => {
                depth += 1;
                pos += 2;
            }
            (b'*', b'/') => {
                depth -= 1;
                pos += 2;
                if depth == 0 {
                    return Some(pos);
                }
            }
            _ => pos += 1,
        }
    }
    None
}

/// Tokenize `source` up front.
///
/// The result always ends in either [`Token::Eof`] or the first
/// [`Token::Error`]. Template argument brackets are still plain `<` and `>`;
/// see [`super::template::classify_template_args`].
pub fn tokenize(source: &str) -> Vec<TokenSpan> {
    let mut tokens = Vec::new();
    let mut offset = 0;
    loop {
        let (scanned, len) = consume_token(&source[offset..]);
        let span = Span::from(offset..offset + len);
        match scanned {
            Scanned::End => {
                tokens.push((Token::Eof, Span::point(offset as u32)));
                break;
            }
            Scanned::Trivia => {}
            Scanned::Token(token) => {
                log::trace!("token {:?} at {:?}", token, span);
                tokens.push((token, span));
                if let Token::Error(_) = token {
                    break;
                }
            }
            Scanned::Splittable(token, placeholders) => {
                tokens.push((token, span));
                for i in 1..=placeholders {
                    tokens.push((Token::Placeholder, Span::from(offset + i..offset + len)));
                }
            }
        }
        offset += len;
    }
    tokens
}

/// Tokenize raw bytes, stopping with [`LexError::InvalidUtf8`] at the first
/// malformed sequence.
pub fn tokenize_bytes(bytes: &[u8]) -> Vec<TokenSpan> {
    match std::str::from_utf8(bytes) {
        Ok(source) => tokenize(source),
        Err(e) => {
            let valid_up_to = e.valid_up_to();
            // Always valid: `valid_up_to` ends on a character boundary.
            let prefix = std::str::from_utf8(&bytes[..valid_up_to]).unwrap_or_default();
            let mut tokens = tokenize(prefix);
            if let Some(&(Token::Eof, _)) = tokens.last() {
                tokens.pop();
                let bad_len = e.error_len().unwrap_or(bytes.len() - valid_up_to);
                tokens.push((
                    Token::Error(LexError::InvalidUtf8),
                    Span::from(valid_up_to..valid_up_to + bad_len),
                ));
            }
            tokens
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source).into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn punctuation_and_placeholders() {
        assert_eq!(
            kinds("a >> b >>= c && d -- >="),
            [
                Token::Identifier,
                Token::ShiftRight,
                Token::Placeholder,
                Token::Identifier,
                Token::ShiftRightEqual,
                Token::Placeholder,
                Token::Placeholder,
                Token::Identifier,
                Token::AndAnd,
                Token::Placeholder,
                Token::Identifier,
                Token::MinusMinus,
                Token::Placeholder,
                Token::GreaterThanEqual,
                Token::Placeholder,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn keywords_and_identifiers() {
        assert_eq!(
            kinds("fn _ _x main const_assert"),
            [
                Token::Fn,
                Token::Underscore,
                Token::Identifier,
                Token::Identifier,
                Token::ConstAssert,
                Token::Eof,
            ]
        );
        assert_eq!(
            kinds("__x"),
            [Token::Error(LexError::DoubleUnderscore)]
        );
    }

    #[test]
    fn unicode_identifiers() {
        let source = "let déjà_vu = 1;";
        let tokens = tokenize(source);
        assert_eq!(tokens[1].0, Token::Identifier);
        assert_eq!(&source[tokens[1].1], "déjà_vu");
    }

    #[test]
    fn comments_nest() {
        assert_eq!(
            kinds("a /* x /* y */ z */ b // c\nd"),
            [
                Token::Identifier,
                Token::Identifier,
                Token::Identifier,
                Token::Eof
            ]
        );
    }

    #[test]
    fn unterminated_comment_points_at_start() {
        let tokens = tokenize("a /* /* */");
        assert_eq!(
            tokens.last(),
            Some(&(Token::Error(LexError::UnterminatedComment), Span::new(2, 4)))
        );
    }

    #[test]
    fn invalid_utf8_offset() {
        let tokens = tokenize_bytes(b"fn fu\xd0nc() {}");
        assert_eq!(
            tokens.last(),
            Some(&(Token::Error(LexError::InvalidUtf8), Span::new(5, 6)))
        );
        assert_eq!(tokens.len(), 3);
    }

    #[test]
    fn numbers() {
        assert_eq!(
            kinds("1u 2.5f 0x10"),
            [
                Token::Number(Number::U32(1)),
                Token::Number(Number::F32(2.5)),
                Token::Number(Number::AbstractInt(16)),
                Token::Eof,
            ]
        );
        assert_eq!(
            LexError::NonFinite("f32", true).to_string(),
            "value cannot be represented as 'f32': -inf"
        );
    }
}
