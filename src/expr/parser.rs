//! Expression grammar.
//!
//! Precedence, lowest to highest: top-level assignment, `+ -`, `* /`,
//! `**` (right-associative), unary minus, atom.

use chumsky::prelude::*;
use chumsky::span::SimpleSpan;

use super::ast::{BinaryOp, Expr, Span, Statement, Suffix, Target};
use crate::error::{FlowError, Origin, Result};

pub type ParseError<'src> = Rich<'src, char>;

fn to_range(span: SimpleSpan) -> Span {
    span.start..span.end
}

/// Integer or float literal. Text without `.` or an exponent is an integer.
/// Digits after the point are optional once there is an integer part (`1.`).
fn number<'src>() -> impl Parser<'src, &'src str, Expr, extra::Err<ParseError<'src>>> + Clone {
    let exponent = one_of("eE").then(one_of("+-").or_not()).then(text::digits(10));

    choice((
        text::digits(10).then(just('.').then(text::digits(10).or_not()).or_not()).ignored(),
        just('.').then(text::digits(10)).ignored(),
    ))
    .then(exponent.or_not())
    .to_slice()
    .try_map(|s: &str, span| {
        if s.contains(['.', 'e', 'E']) {
            s.parse::<f64>()
                .map(Expr::Float)
                .map_err(|_| Rich::custom(span, format!("malformed number '{}'", s)))
        } else {
            // Integers too wide for i64 degrade to floats.
            Ok(s.parse::<i64>()
                .map(Expr::Int)
                .unwrap_or_else(|_| Expr::Float(s.parse::<f64>().unwrap_or(f64::INFINITY))))
        }
    })
}

/// Dot-separated identifier chain.
fn path<'src>() -> impl Parser<'src, &'src str, String, extra::Err<ParseError<'src>>> + Clone {
    text::ascii::ident()
        .separated_by(just('.'))
        .at_least(1)
        .collect::<Vec<&str>>()
        .map(|segments| segments.join("."))
}

fn index_groups<'src, P>(
    expr: P,
) -> impl Parser<'src, &'src str, Vec<Vec<Expr>>, extra::Err<ParseError<'src>>> + Clone
where
    P: Parser<'src, &'src str, Expr, extra::Err<ParseError<'src>>> + Clone,
{
    expr.separated_by(just(','))
        .at_least(1)
        .collect::<Vec<_>>()
        .padded()
        .delimited_by(just('['), just(']'))
        .repeated()
        .at_least(1)
        .collect::<Vec<_>>()
}

pub fn expression<'src>() -> impl Parser<'src, &'src str, Expr, extra::Err<ParseError<'src>>> + Clone {
    recursive(|expr| {
        let call_args = expr
            .clone()
            .separated_by(just(','))
            .collect::<Vec<_>>()
            .padded()
            .delimited_by(just('('), just(')'));

        let suffix = choice((
            index_groups(expr.clone()).map(Suffix::Index),
            call_args.map(Suffix::Call),
        ))
        .or_not()
        .map(|s| s.unwrap_or(Suffix::None));

        let name = path().then(suffix).map_with(|(path, suffix), e| Expr::Name {
            path,
            suffix,
            span: to_range(e.span()),
        });

        let atom = choice((
            number(),
            name,
            expr.clone().padded().delimited_by(just('('), just(')')),
        ))
        .padded();

        let unary = just('-')
            .padded()
            .repeated()
            .foldr(atom, |_, operand| Expr::Neg(Box::new(operand)));

        let power = unary
            .clone()
            .then_ignore(just("**").padded())
            .repeated()
            .foldr(unary, |lhs, rhs| Expr::Binary {
                op: BinaryOp::Pow,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            });

        let product = power.clone().foldl(
            choice((just('*').to(BinaryOp::Mul), just('/').to(BinaryOp::Div)))
                .padded()
                .then(power)
                .repeated(),
            |lhs, (op, rhs)| Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) },
        );

        product.clone().foldl(
            choice((just('+').to(BinaryOp::Add), just('-').to(BinaryOp::Sub)))
                .padded()
                .then(product)
                .repeated(),
            |lhs, (op, rhs)| Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) },
        )
    })
}

/// Optional `target =` followed by an expression, spanning the whole input.
pub fn statement<'src>() -> impl Parser<'src, &'src str, Statement, extra::Err<ParseError<'src>>> + Clone {
    let expr = expression();

    let target = path()
        .then(index_groups(expr.clone()).or_not())
        .map_with(|(path, indices), e| Target {
            path,
            indices: indices.unwrap_or_default(),
            span: to_range(e.span()),
        })
        .padded();

    target
        .then_ignore(just('='))
        .or_not()
        .then(expr)
        .then_ignore(end())
        .map(|(target, value)| Statement { target, value })
}

/// Runs the grammar over `text`, reporting the first error with its character offset.
pub fn parse(text: &str) -> Result<Statement> {
    statement().parse(text).into_result().map_err(|errs| {
        let (offset, message) = errs
            .into_iter()
            .next()
            .map(|err| (err.span().start, err.to_string()))
            .unwrap_or((0, "malformed expression".to_string()));
        FlowError::ExpressionSyntax { origin: Origin::root(), text: text.to_string(), offset, message }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn name(path: &str) -> Expr {
        match parse(path).unwrap().value {
            e @ Expr::Name { .. } => e,
            other => panic!("expected a name, got {:?}", other),
        }
    }

    fn strip(expr: &Expr) -> String {
        match expr {
            Expr::Int(i) => i.to_string(),
            Expr::Float(f) => format!("{:?}", f),
            Expr::Name { path, suffix, .. } => match suffix {
                Suffix::None => path.clone(),
                Suffix::Index(groups) => {
                    let mut s = path.clone();
                    for g in groups {
                        let parts: Vec<String> = g.iter().map(strip).collect();
                        s.push_str(&format!("[{}]", parts.join(",")));
                    }
                    s
                }
                Suffix::Call(args) => {
                    let parts: Vec<String> = args.iter().map(strip).collect();
                    format!("{}({})", path, parts.join(","))
                }
            },
            Expr::Neg(inner) => format!("(-{})", strip(inner)),
            Expr::Binary { op, lhs, rhs } => {
                let sym = match op {
                    BinaryOp::Add => "+",
                    BinaryOp::Sub => "-",
                    BinaryOp::Mul => "*",
                    BinaryOp::Div => "/",
                    BinaryOp::Pow => "**",
                };
                format!("({}{}{})", strip(lhs), sym, strip(rhs))
            }
        }
    }

    #[rstest]
    #[case("1 + 2 * 3", "(1+(2*3))")]
    #[case("1 - 2 - 3", "((1-2)-3)")]
    #[case("2 ** 3 ** 2", "(2**(3**2))")]
    #[case("-2**2", "((-2)**2)")]
    #[case("a.b[2]+c.y(x)", "(a.b[2]+c.y(x))")]
    #[case("m[1, -1][0]", "m[1,(-1)][0]")]
    #[case("(a + b) / 2.5e1", "((a+b)/25.0)")]
    #[case(".5*x", "(0.5*x)")]
    #[case("f()", "f()")]
    fn test_precedence_and_shapes(#[case] text: &str, #[case] expected: &str) {
        let stmt = parse(text).unwrap();
        assert!(stmt.target.is_none());
        assert_eq!(strip(&stmt.value), expected);
    }

    #[test]
    fn test_assignment_target() {
        let stmt = parse("sub.x[1] = y * 2").unwrap();
        let target = stmt.target.unwrap();
        assert_eq!(target.path, "sub.x");
        assert_eq!(target.indices.len(), 1);
        assert_eq!(strip(&stmt.value), "(y*2)");
    }

    #[test]
    fn test_integer_and_float_literals() {
        assert_eq!(parse("42").unwrap().value, Expr::Int(42));
        assert_eq!(parse("4.0").unwrap().value, Expr::Float(4.0));
        assert_eq!(parse("1e3").unwrap().value, Expr::Float(1000.0));
        assert_eq!(parse("1.").unwrap().value, Expr::Float(1.0));
        assert_eq!(parse(".5").unwrap().value, Expr::Float(0.5));
        assert_eq!(parse("2. * 3").unwrap().value, Expr::Binary {
            op: BinaryOp::Mul,
            lhs: Box::new(Expr::Float(2.0)),
            rhs: Box::new(Expr::Int(3)),
        });
    }

    #[test]
    fn test_name_span_covers_suffix() {
        match name("comp.x[0]") {
            Expr::Name { span, .. } => assert_eq!(span, 0..9),
            _ => unreachable!(),
        }
    }

    #[rstest]
    #[case("a +")]
    #[case("a + (b")]
    #[case("a b")]
    #[case("x = = 1")]
    #[case("a[1](2)")]
    fn test_syntax_errors_carry_text_and_offset(#[case] text: &str) {
        match parse(text) {
            Err(FlowError::ExpressionSyntax { text: t, offset, .. }) => {
                assert_eq!(t, text);
                assert!(offset <= text.len(), "offset {} beyond '{}'", offset, text);
            }
            other => panic!("expected syntax error for '{}', got {:?}", text, other),
        }
    }
}
