//! Expression grammar over the lexer's token stream.
//!
//! Precedence, lowest first:
//!
//! | level        | operators                       | associativity |
//! |--------------|---------------------------------|---------------|
//! | conditional  | `c ? a : b`                     | right         |
//! | or           | `or`, `\|\|`                    | left          |
//! | and          | `and`, `&&`                     | left          |
//! | not          | `not`, `!`                      | prefix        |
//! | comparison   | `== = != <> < <= > >=`          | left          |
//! | additive     | `+ -`                           | left          |
//! | multiplicative | `* /`                         | left          |
//! | unary        | `-x`, `+x`                      | prefix        |
//! | power        | `^`                             | right         |

use chumsky::Stream;
use chumsky::error::SimpleReason;
use chumsky::prelude::*;

use crate::lexer::{Number, Token, tokenize};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub(crate) fn symbol(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Pow => "^",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::And => "and",
            Self::Or => "or",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Literal(Value),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Conditional {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
}

/// Parse a complete expression. Trailing tokens are an error.
pub(crate) fn parse(input: &str) -> Result<Expr, String> {
    if input.trim().is_empty() {
        return Err("empty expression".to_string());
    }
    let tokens = tokenize(input)?;
    let eoi = input.chars().count();
    let stream = Stream::from_iter(eoi..eoi + 1, tokens.into_iter());
    expression()
        .then_ignore(end())
        .parse(stream)
        .map_err(|errors| {
            errors
                .into_iter()
                .next()
                .map(describe_syntax_error)
                .unwrap_or_else(|| "invalid expression".to_string())
        })
}

fn describe_syntax_error(err: Simple<Token>) -> String {
    let offset = err.span().start;
    match (err.reason(), err.found()) {
        (SimpleReason::Custom(message), _) => format!("{message} at offset {offset}"),
        (_, Some(token)) => format!("unexpected {token} at offset {offset}"),
        (_, None) => format!("unexpected end of input at offset {offset}"),
    }
}

fn expression() -> impl Parser<Token, Expr, Error = Simple<Token>> {
    recursive(|expr| {
        let literal = select! {
            Token::Int(i) => Expr::Literal(Value::Int(i)),
            Token::Float(Number(f)) => Expr::Literal(Value::Float(f)),
            Token::Str(s) => Expr::Literal(Value::Text(s)),
            Token::Bool(b) => Expr::Literal(Value::Bool(b)),
        };

        let call = select! { Token::Ident(name) => name }
            .then(
                expr.clone()
                    .separated_by(just(Token::Comma))
                    .delimited_by(just(Token::LParen), just(Token::RParen)),
            )
            .map(|(name, args): (String, Vec<Expr>)| Expr::Call {
                name: name.to_ascii_lowercase(),
                args,
            });

        let atom = literal
            .or(call)
            .or(expr
                .clone()
                .delimited_by(just(Token::LParen), just(Token::RParen)))
            .boxed();

        // The exponent may carry its own sign: 2 ^ -1.
        let unary = recursive(|unary| {
            let sign = select! {
                Token::Minus => UnaryOp::Neg,
                Token::Plus => UnaryOp::Pos,
            };
            let power = atom
                .then(just(Token::Caret).ignore_then(unary.clone()).or_not())
                .map(|(base, exponent)| match exponent {
                    Some(exponent) => binary(BinaryOp::Pow, base, exponent),
                    None => base,
                });
            sign.then(unary)
                .map(|(op, operand)| unary_expr(op, operand))
                .or(power)
        })
        .boxed();

        let product_op = select! {
            Token::Star => BinaryOp::Mul,
            Token::Slash => BinaryOp::Div,
        };
        let product = unary
            .clone()
            .then(product_op.then(unary).repeated())
            .foldl(|lhs, (op, rhs)| binary(op, lhs, rhs))
            .boxed();

        let sum_op = select! {
            Token::Plus => BinaryOp::Add,
            Token::Minus => BinaryOp::Sub,
        };
        let sum = product
            .clone()
            .then(sum_op.then(product).repeated())
            .foldl(|lhs, (op, rhs)| binary(op, lhs, rhs))
            .boxed();

        let comparison_op = select! {
            Token::Eq => BinaryOp::Eq,
            Token::Ne => BinaryOp::Ne,
            Token::Lt => BinaryOp::Lt,
            Token::Le => BinaryOp::Le,
            Token::Gt => BinaryOp::Gt,
            Token::Ge => BinaryOp::Ge,
        };
        let comparison = sum
            .clone()
            .then(comparison_op.then(sum).repeated())
            .foldl(|lhs, (op, rhs)| binary(op, lhs, rhs))
            .boxed();

        let negation = just(Token::Not)
            .repeated()
            .then(comparison)
            .foldr(|_not, operand| unary_expr(UnaryOp::Not, operand))
            .boxed();

        let conjunction = negation
            .clone()
            .then(just(Token::And).to(BinaryOp::And).then(negation).repeated())
            .foldl(|lhs, (op, rhs)| binary(op, lhs, rhs))
            .boxed();

        let disjunction = conjunction
            .clone()
            .then(just(Token::Or).to(BinaryOp::Or).then(conjunction).repeated())
            .foldl(|lhs, (op, rhs)| binary(op, lhs, rhs))
            .boxed();

        disjunction
            .then(
                just(Token::Question)
                    .ignore_then(expr.clone())
                    .then_ignore(just(Token::Colon))
                    .then(expr)
                    .or_not(),
            )
            .map(|(condition, branches)| match branches {
                Some((then_branch, else_branch)) => Expr::Conditional {
                    condition: Box::new(condition),
                    then_branch: Box::new(then_branch),
                    else_branch: Box::new(else_branch),
                },
                None => condition,
            })
    })
}

fn unary_expr(op: UnaryOp, operand: Expr) -> Expr {
    Expr::Unary {
        op,
        operand: Box::new(operand),
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}
