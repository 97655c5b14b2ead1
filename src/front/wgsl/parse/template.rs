//! Template list discovery.
//!
//! WGSL can't tell `a < b` from the start of `array<f32, 4>` by looking at
//! one token, so once the whole source is tokenized this pass rewrites the
//! `<` and `>` tokens that delimit template argument lists into
//! [`Token::TemplateArgsLeft`] and [`Token::TemplateArgsRight`].
//!
//! <https://www.w3.org/TR/WGSL/#template-list-discovery>

use super::lexer::{Token, TokenSpan};
use crate::Span;

/// A `<` that may open a template list.
struct Candidate {
    index: usize,
    depth: usize,
}

/// Classify the template list delimiters of `tokens` in place.
///
/// A `>>`, `>=` or `>>=` that closes a list is split: the closing `>`
/// keeps the first byte and the rest of the operator moves into the
/// placeholder the lexer left behind it.
pub fn classify_template_args(tokens: &mut [TokenSpan]) {
    let count = tokens.len();
    let mut stack: Vec<Candidate> = Vec::new();
    let mut depth = 0;

    let mut i = 0;
    while i + 1 < count {
        match tokens[i].0 {
            Token::Identifier | Token::Var | Token::Bitcast => {
                if tokens[i + 1].0 == Token::LessThan {
                    stack.push(Candidate {
                        index: i + 1,
                        depth,
                    });
                    // Skip the `<`.
                    i += 1;
                }
            }
            Token::GreaterThan
            | Token::ShiftRight
            | Token::GreaterThanEqual
            | Token::ShiftRightEqual => {
                if let Some(top) = stack.last() {
                    if top.depth == depth {
                        let open = top.index;
                        stack.pop();
                        close(tokens, open, i);
                    }
                }
            }
            Token::ParenLeft | Token::BracketLeft => depth += 1,
            Token::ParenRight | Token::BracketRight => {
                while stack.last().map_or(false, |top| top.depth == depth) {
                    stack.pop();
                }
                depth = depth.saturating_sub(1);
            }
            Token::Semicolon | Token::BraceLeft | Token::Equal | Token::Colon => {
                depth = 0;
                stack.clear();
            }
            Token::AndAnd | Token::OrOr => {
                while stack.last().map_or(false, |top| top.depth == depth) {
                    stack.pop();
                }
            }
            _ => {}
        }
        i += 1;
    }
}

fn close(tokens: &mut [TokenSpan], open: usize, at: usize) {
    tokens[open].0 = Token::TemplateArgsLeft;
    let (token, span) = tokens[at];
    let start = span.start();
    let rest = match token {
        Token::ShiftRight => Some(Token::GreaterThan),
        Token::GreaterThanEqual => Some(Token::Equal),
        Token::ShiftRightEqual => Some(Token::GreaterThanEqual),
        _ => None,
    };
    tokens[at] = (Token::TemplateArgsRight, Span::new(start, start + 1));
    if let Some(rest) = rest {
        tokens[at + 1].0 = rest;
    }
    log::trace!("template list {:?}..{:?}", tokens[open].1, tokens[at].1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::front::wgsl::parse::lexer::tokenize;

    fn classify(source: &str) -> Vec<Token> {
        let mut tokens = tokenize(source);
        classify_template_args(&mut tokens);
        tokens
            .into_iter()
            .map(|(t, _)| t)
            .filter(|t| !t.is_placeholder())
            .collect()
    }

    #[test]
    fn less_than_stays_relational() {
        assert_eq!(
            classify("a < b"),
            [Token::Identifier, Token::LessThan, Token::Identifier, Token::Eof]
        );
        assert_eq!(
            classify("a<b || c>d"),
            [
                Token::Identifier,
                Token::LessThan,
                Token::Identifier,
                Token::OrOr,
                Token::Identifier,
                Token::GreaterThan,
                Token::Identifier,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn nested_lists_split_shift() {
        let source = "vec2<vec2<u32>>";
        let mut tokens = tokenize(source);
        classify_template_args(&mut tokens);
        let kinds: Vec<_> = tokens.iter().map(|&(t, _)| t).collect();
        assert_eq!(
            kinds,
            [
                Token::Identifier,
                Token::TemplateArgsLeft,
                Token::Identifier,
                Token::TemplateArgsLeft,
                Token::Identifier,
                Token::TemplateArgsRight,
                Token::TemplateArgsRight,
                Token::Eof,
            ]
        );
        assert_eq!(tokens[5].1, Span::new(13, 14));
        assert_eq!(tokens[6].1, Span::new(14, 15));
    }

    #[test]
    fn lists_with_several_arguments() {
        let tokens = classify("array<vec2<f32>, 4>");
        assert_eq!(tokens[1], Token::TemplateArgsLeft);
        assert_eq!(tokens[3], Token::TemplateArgsLeft);
        assert_eq!(tokens[5], Token::TemplateArgsRight);
        assert_eq!(tokens[8], Token::TemplateArgsRight);
    }

    #[test]
    fn greater_equal_after_list() {
        assert_eq!(
            classify("a = vec2<f32>=b"),
            [
                Token::Identifier,
                Token::Equal,
                Token::Identifier,
                Token::TemplateArgsLeft,
                Token::Identifier,
                Token::TemplateArgsRight,
                Token::Equal,
                Token::Identifier,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn brackets_hide_comparisons() {
        let tokens = classify("a<(b>c)>");
        assert_eq!(tokens[1], Token::TemplateArgsLeft);
        assert_eq!(tokens[4], Token::GreaterThan);
        assert_eq!(tokens[7], Token::TemplateArgsRight);
    }
}
