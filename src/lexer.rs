//! Token stream over brainfuck source
//!
//! Only the eight command characters are significant, every other byte is
//! a comment and is dropped here so the parser never sees it.  The lexer
//! runs over either an in-memory slice or a byte reader with a one-byte
//! lookahead (the reader variant is what the stdin path uses).  It is a
//! single consumer and cannot be restarted.

use std::io::Read;

/// The eight command characters plus end of input.
#[derive(Clone,Copy,Debug,PartialEq,Eq)]
pub enum Token {
    Eof,
    Plus,
    Minus,
    Lt,
    Gt,
    Dot,
    Comma,
    LBracket,
    RBracket,
}

enum Input<'a> {
    Slice { text: &'a [u8], index: usize },
    Reader { src: Box<dyn Read + 'a>, current: Option<u8> },
}

pub struct Lexer<'a> {
    input: Input<'a>,
}

fn read_byte<R: Read + ?Sized>(src: &mut R) -> Option<u8> {
    let mut buf = [0u8;1];
    // a read error ends the input the same way end-of-stream does
    match src.read_exact(&mut buf) {
        Ok(()) => Some(buf[0]),
        Err(_) => None,
    }
}

impl<'a> Lexer<'a> {
    pub fn from_slice(text: &'a [u8]) -> Self {
        Self {
            input: Input::Slice { text, index: 0 },
        }
    }
    /// Wrap a byte reader, priming the one-byte lookahead.
    pub fn from_reader(src: impl Read + 'a) -> Self {
        let mut src: Box<dyn Read + 'a> = Box::new(src);
        let current = read_byte(&mut src);
        Self {
            input: Input::Reader { src, current },
        }
    }
    /// True once the input is exhausted.
    pub fn done(&self) -> bool {
        match &self.input {
            Input::Slice { text, index } => *index >= text.len(),
            Input::Reader { current, .. } => current.is_none(),
        }
    }
    fn current(&self) -> Option<u8> {
        match &self.input {
            Input::Slice { text, index } => text.get(*index).copied(),
            Input::Reader { current, .. } => *current,
        }
    }
    fn step(&mut self) {
        match &mut self.input {
            Input::Slice { index, .. } => *index += 1,
            Input::Reader { src, current } => *current = read_byte(src),
        }
    }
    /// Next significant token, `Eof` forever once the input runs out.
    pub fn next_token(&mut self) -> Token {
        loop {
            let byte = match self.current() {
                Some(b) => b,
                None => return Token::Eof,
            };
            self.step();
            match byte {
                b'+' => return Token::Plus,
                b'-' => return Token::Minus,
                b'<' => return Token::Lt,
                b'>' => return Token::Gt,
                b'.' => return Token::Dot,
                b',' => return Token::Comma,
                b'[' => return Token::LBracket,
                b']' => return Token::RBracket,
                _ => {}
            }
        }
    }
}

#[cfg(test)]
fn drain(mut lexer: Lexer) -> Vec<Token> {
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token();
        if token == Token::Eof {
            return tokens;
        }
        tokens.push(token);
    }
}

#[test]
fn recognizes_all_commands() {
    let tokens = drain(Lexer::from_slice(b"+-<>.,[]"));
    assert_eq!(tokens,vec![
        Token::Plus,Token::Minus,Token::Lt,Token::Gt,
        Token::Dot,Token::Comma,Token::LBracket,Token::RBracket,
    ]);
}

#[test]
fn drops_comment_bytes() {
    let tokens = drain(Lexer::from_slice(b"say + or - but\nnothing else\xff"));
    assert_eq!(tokens,vec![Token::Plus,Token::Minus]);
}

#[test]
fn reader_matches_slice() {
    let text: &[u8] = b"comment [->>+<<] done.";
    let from_reader = drain(Lexer::from_reader(std::io::Cursor::new(text)));
    let from_slice = drain(Lexer::from_slice(text));
    assert_eq!(from_reader,from_slice);
}

#[test]
fn eof_is_sticky() {
    let mut lexer = Lexer::from_slice(b"+");
    assert_eq!(lexer.next_token(),Token::Plus);
    assert!(lexer.done());
    assert_eq!(lexer.next_token(),Token::Eof);
    assert_eq!(lexer.next_token(),Token::Eof);
}
