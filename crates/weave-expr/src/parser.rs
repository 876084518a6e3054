//! Recursive-descent parser over the token stream.
//!
//! Mirrors the grammar in `spec.md` §4.1 production-for-production; each
//! `parse_*` method corresponds to one grammar rule.

use thiserror::Error;

use crate::ast::{AddOp, CompareOp, Expr, MulOp};
use crate::token::{tokenize, LexError, Token};

/// Parse error; always folds into `Value::Unresolved` at the evaluator's
/// public boundary — never surfaced to a blueprint author directly except
/// via the static analyzer's aggregated report (§4.2).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ParseError {
    /// Lexing failed.
    #[error(transparent)]
    Lex(#[from] LexError),
    /// The token stream ended before a complete expression was parsed.
    #[error("unexpected end of expression")]
    UnexpectedEof,
    /// A token appeared where the grammar did not expect one.
    #[error("unexpected token: {0:?}")]
    UnexpectedToken(Token),
    /// Trailing tokens remained after a complete expression was parsed.
    #[error("trailing input after expression")]
    TrailingInput,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

/// Parses `source` into an [`Expr`] tree.
pub fn parse(source: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expression()?;
    if parser.peek() != &Token::Eof {
        return Err(ParseError::TrailingInput);
    }
    Ok(expr)
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, t: &Token) -> Result<(), ParseError> {
        if self.peek() == t {
            self.advance();
            Ok(())
        } else {
            Err(ParseError::UnexpectedToken(self.peek().clone()))
        }
    }

    fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        self.parse_logical_or()
    }

    fn parse_logical_or(&mut self) -> Result<Expr, ParseError> {
        let first = self.parse_logical_and()?;
        let mut rest = vec![first];
        while self.peek() == &Token::Or {
            self.advance();
            rest.push(self.parse_logical_and()?);
        }
        Ok(if rest.len() == 1 {
            rest.pop().unwrap()
        } else {
            Expr::Or(rest)
        })
    }

    fn parse_logical_and(&mut self) -> Result<Expr, ParseError> {
        let first = self.parse_comparison()?;
        let mut rest = vec![first];
        while self.peek() == &Token::And {
            self.advance();
            rest.push(self.parse_comparison()?);
        }
        Ok(if rest.len() == 1 {
            rest.pop().unwrap()
        } else {
            Expr::And(rest)
        })
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_addition()?;
        let mut chain = Vec::new();
        loop {
            let op = match self.peek() {
                Token::Eq => CompareOp::Eq,
                Token::Neq => CompareOp::Neq,
                Token::Gt => CompareOp::Gt,
                Token::Lt => CompareOp::Lt,
                Token::Gte => CompareOp::Gte,
                Token::Lte => CompareOp::Lte,
                Token::In => CompareOp::In,
                _ => break,
            };
            self.advance();
            chain.push((op, self.parse_addition()?));
        }
        Ok(if chain.is_empty() {
            left
        } else {
            Expr::Compare(Box::new(left), chain)
        })
    }

    fn parse_addition(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_multiplication()?;
        let mut chain = Vec::new();
        loop {
            let op = match self.peek() {
                Token::Plus => AddOp::Add,
                Token::Minus => AddOp::Sub,
                _ => break,
            };
            self.advance();
            chain.push((op, self.parse_multiplication()?));
        }
        Ok(if chain.is_empty() {
            left
        } else {
            Expr::Add(Box::new(left), chain)
        })
    }

    fn parse_multiplication(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_unary()?;
        let mut chain = Vec::new();
        loop {
            let op = match self.peek() {
                Token::Star => MulOp::Mul,
                Token::Slash => MulOp::Div,
                _ => break,
            };
            self.advance();
            chain.push((op, self.parse_unary()?));
        }
        Ok(if chain.is_empty() {
            left
        } else {
            Expr::Mul(Box::new(left), chain)
        })
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if self.peek() == &Token::Minus {
            self.advance();
            return Ok(Expr::Neg(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        match self.advance() {
            Token::Number(n) => Ok(Expr::Number(n)),
            Token::Str(s) => Ok(Expr::Str(s)),
            Token::True => Ok(Expr::True),
            Token::False => Ok(Expr::False),
            Token::Null => Ok(Expr::Null),
            Token::LBracket => {
                let mut items = Vec::new();
                if self.peek() != &Token::RBracket {
                    items.push(self.parse_expression()?);
                    while self.peek() == &Token::Comma {
                        self.advance();
                        items.push(self.parse_expression()?);
                    }
                }
                self.expect(&Token::RBracket)?;
                Ok(Expr::List(items))
            }
            Token::LParen => {
                let inner = self.parse_expression()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Token::Ident(name) => {
                if self.peek() == &Token::LParen {
                    self.advance();
                    let mut args = Vec::new();
                    if self.peek() != &Token::RParen {
                        args.push(self.parse_expression()?);
                        while self.peek() == &Token::Comma {
                            self.advance();
                            args.push(self.parse_expression()?);
                        }
                    }
                    self.expect(&Token::RParen)?;
                    Ok(Expr::Call(name, args))
                } else {
                    let mut parts = vec![name];
                    while self.peek() == &Token::Dot {
                        self.advance();
                        match self.advance() {
                            Token::Ident(p) => parts.push(p),
                            other => return Err(ParseError::UnexpectedToken(other)),
                        }
                    }
                    Ok(Expr::Variable(parts))
                }
            }
            Token::Eof => Err(ParseError::UnexpectedEof),
            other => Err(ParseError::UnexpectedToken(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_arithmetic_precedence() {
        let ast = parse("1 + 2 * 3").unwrap();
        assert_eq!(
            ast,
            Expr::Add(
                Box::new(Expr::Number(1.0)),
                vec![(
                    AddOp::Add,
                    Expr::Mul(Box::new(Expr::Number(2.0)), vec![(MulOp::Mul, Expr::Number(3.0))])
                )]
            )
        );
    }

    #[test]
    fn parses_dotted_variable() {
        assert_eq!(
            parse("msg.payload.id").unwrap(),
            Expr::Variable(vec!["msg".into(), "payload".into(), "id".into()])
        );
    }

    #[test]
    fn parses_function_call() {
        assert_eq!(
            parse("sum(read.accounts.balance)").unwrap(),
            Expr::Call(
                "sum".into(),
                vec![Expr::Variable(vec![
                    "read".into(),
                    "accounts".into(),
                    "balance".into()
                ])]
            )
        );
    }

    #[test]
    fn rejects_trailing_garbage() {
        assert!(matches!(parse("1 + 2)"), Err(ParseError::TrailingInput)));
    }

    #[test]
    fn rejects_unterminated_string() {
        assert!(matches!(
            parse("\"abc"),
            Err(ParseError::Lex(LexError::UnterminatedString))
        ));
    }
}
