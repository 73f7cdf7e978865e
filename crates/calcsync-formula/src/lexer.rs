//! Tokenizer for the evaluator's expression language.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Range;

use chumsky::error::SimpleReason;
use chumsky::prelude::*;

/// Float literal compared by bit pattern so tokens can be hashed.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Number(pub f64);

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for Number {}

impl Hash for Number {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0.to_bits());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum Token {
    Int(i64),
    Float(Number),
    Str(String),
    Bool(bool),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
    Question,
    Colon,
    Comma,
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Int(i) => write!(f, "number `{i}`"),
            Token::Float(v) => write!(f, "number `{}`", v.0),
            Token::Str(s) => write!(f, "string '{s}'"),
            Token::Bool(b) => write!(f, "`{b}`"),
            Token::Ident(s) => write!(f, "identifier `{s}`"),
            Token::Plus => f.write_str("'+'"),
            Token::Minus => f.write_str("'-'"),
            Token::Star => f.write_str("'*'"),
            Token::Slash => f.write_str("'/'"),
            Token::Caret => f.write_str("'^'"),
            Token::Eq => f.write_str("'=='"),
            Token::Ne => f.write_str("'!='"),
            Token::Lt => f.write_str("'<'"),
            Token::Le => f.write_str("'<='"),
            Token::Gt => f.write_str("'>'"),
            Token::Ge => f.write_str("'>='"),
            Token::And => f.write_str("'and'"),
            Token::Or => f.write_str("'or'"),
            Token::Not => f.write_str("'not'"),
            Token::Question => f.write_str("'?'"),
            Token::Colon => f.write_str("':'"),
            Token::Comma => f.write_str("','"),
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
        }
    }
}

/// A token and the character range it covers.
pub(crate) type Spanned = (Token, Range<usize>);

pub(crate) fn lexer() -> impl Parser<char, Vec<Spanned>, Error = Simple<char>> {
    let exponent = one_of("eE")
        .then(one_of("+-").or_not())
        .then(text::digits(10))
        .map(|((marker, sign), digits): ((char, Option<char>), String)| {
            let mut text = String::from(marker);
            text.extend(sign);
            text.push_str(&digits);
            text
        });

    let fraction = just('.')
        .ignore_then(text::digits(10).or_not())
        .map(Option::unwrap_or_default);
    let integral = text::digits(10).then(fraction.or_not());
    let leading_dot = just('.')
        .ignore_then(text::digits(10))
        .map(|frac: String| (String::from("0"), Some(frac)));

    // Literals without a decimal point or exponent are integers unless
    // they overflow i64.
    let number = integral
        .or(leading_dot)
        .then(exponent.or_not())
        .try_map(
            |((int, frac), exp): ((String, Option<String>), Option<String>), span| {
                if frac.is_none() && exp.is_none() {
                    if let Ok(i) = int.parse::<i64>() {
                        return Ok(Token::Int(i));
                    }
                }
                let mut text = int;
                if let Some(frac) = frac {
                    text.push('.');
                    text.push_str(&frac);
                }
                if let Some(exp) = exp {
                    text.push_str(&exp);
                }
                text.parse::<f64>()
                    .map(|v| Token::Float(Number(v)))
                    .map_err(|_| Simple::custom(span, format!("invalid number '{text}'")))
            },
        );

    // A backslash escapes the next character.
    let quoted = |quote: char| {
        just(quote)
            .ignore_then(
                just('\\')
                    .ignore_then(any())
                    .or(filter(move |c: &char| *c != quote && *c != '\\'))
                    .repeated()
                    .collect::<String>(),
            )
            .then_ignore(just(quote))
    };
    let string = quoted('"').or(quoted('\'')).map(Token::Str);

    let word = text::ident().map(|word: String| match word.to_ascii_lowercase().as_str() {
        "and" => Token::And,
        "or" => Token::Or,
        "not" => Token::Not,
        "true" => Token::Bool(true),
        "false" => Token::Bool(false),
        _ => Token::Ident(word),
    });

    let op = choice::<_, Simple<char>>(vec![
        just("==").to(Token::Eq).boxed(),
        just("!=").to(Token::Ne).boxed(),
        just("<>").to(Token::Ne).boxed(),
        just("<=").to(Token::Le).boxed(),
        just(">=").to(Token::Ge).boxed(),
        just("&&").to(Token::And).boxed(),
        just("||").to(Token::Or).boxed(),
        just("=").to(Token::Eq).boxed(),
        just("<").to(Token::Lt).boxed(),
        just(">").to(Token::Gt).boxed(),
        just("!").to(Token::Not).boxed(),
        just("+").to(Token::Plus).boxed(),
        just("-").to(Token::Minus).boxed(),
        just("*").to(Token::Star).boxed(),
        just("/").to(Token::Slash).boxed(),
        just("^").to(Token::Caret).boxed(),
        just("?").to(Token::Question).boxed(),
        just(":").to(Token::Colon).boxed(),
        just(",").to(Token::Comma).boxed(),
        just("(").to(Token::LParen).boxed(),
        just(")").to(Token::RParen).boxed(),
    ]);

    choice::<_, Simple<char>>((number, string, word, op))
        .map_with_span(|tok, span| (tok, span))
        .padded()
        .repeated()
        .then_ignore(end())
}

/// Split an expression into tokens.
///
/// Errors carry a human-readable message that includes the character offset.
pub(crate) fn tokenize(input: &str) -> Result<Vec<Spanned>, String> {
    lexer().parse(input).map_err(|errors| {
        errors
            .into_iter()
            .next()
            .map(describe_lex_error)
            .unwrap_or_else(|| "invalid expression".to_string())
    })
}

fn describe_lex_error(err: Simple<char>) -> String {
    let offset = err.span().start;
    match (err.reason(), err.found()) {
        (SimpleReason::Custom(message), _) => format!("{message} at offset {offset}"),
        (_, Some(&'[')) => format!("unresolved field reference at offset {offset}"),
        (_, Some(c)) => format!("unexpected character '{c}' at offset {offset}"),
        (_, None) => format!("unexpected end of input at offset {offset}"),
    }
}
