//! Recursive-descent parser
//!
//! One token of lookahead, grammar:
//!
//! ```text
//! program ::= expr*
//! expr    ::= '+' | '-' | '<' | '>' | '.' | ',' | loop
//! loop    ::= '[' expr* ']'
//! ```
//!
//! The parser never fails the process.  An unterminated loop collapses
//! into a single `Error` node in its place, a stray `]` at the top level
//! becomes an `Error` node and the token is consumed, and parsing carries
//! on to the end of input either way.  `Error` nodes ride through the
//! optimizer untouched and only become fatal in the emitter.

use crate::ir::Node;
use crate::lexer::{Lexer,Token};

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
}

impl<'a> Parser<'a> {
    pub fn create(mut lexer: Lexer<'a>) -> Self {
        let current = lexer.next_token();
        Self { lexer, current }
    }
    fn step(&mut self) {
        self.current = self.lexer.next_token();
    }
    fn parse_loop(&mut self) -> Node {
        self.step();
        let mut exprs = Vec::new();
        while self.current != Token::Eof && self.current != Token::RBracket {
            exprs.push(self.parse_expr());
        }
        if self.current != Token::RBracket {
            return Node::Error;
        }
        self.step();
        Node::Loop(exprs)
    }
    fn parse_expr(&mut self) -> Node {
        let node = match self.current {
            Token::Plus => Node::Incr(1),
            Token::Minus => Node::Decr(1),
            Token::Lt => Node::Left(1),
            Token::Gt => Node::Right(1),
            Token::Dot => Node::Output,
            Token::Comma => Node::Input,
            Token::LBracket => return self.parse_loop(),
            Token::RBracket | Token::Eof => Node::Error,
        };
        self.step();
        node
    }
    pub fn parse(mut self) -> Vec<Node> {
        let mut exprs = Vec::new();
        while self.current != Token::Eof {
            exprs.push(self.parse_expr());
        }
        exprs
    }
}

/// Convenience function, parses a complete in-memory program.
pub fn parse_slice(text: &[u8]) -> Vec<Node> {
    Parser::create(Lexer::from_slice(text)).parse()
}

#[test]
fn single_commands() {
    assert_eq!(parse_slice(b"+-<>.,"),vec![
        Node::Incr(1),Node::Decr(1),Node::Left(1),
        Node::Right(1),Node::Output,Node::Input,
    ]);
}

#[test]
fn empty_program() {
    assert_eq!(parse_slice(b""),Vec::<Node>::new());
    assert_eq!(parse_slice(b"no commands here"),Vec::<Node>::new());
}

#[test]
fn nested_loops() {
    assert_eq!(parse_slice(b"+[>[-]<]"),vec![
        Node::Incr(1),
        Node::Loop(vec![
            Node::Right(1),
            Node::Loop(vec![Node::Decr(1)]),
            Node::Left(1),
        ]),
    ]);
}

#[test]
fn unterminated_loop_is_one_error() {
    assert_eq!(parse_slice(b"[[+]"),vec![Node::Error]);
    assert_eq!(parse_slice(b"+["),vec![Node::Incr(1),Node::Error]);
}

#[test]
fn stray_close_is_an_error() {
    assert_eq!(parse_slice(b"]+"),vec![Node::Error,Node::Incr(1)]);
}
