// Copyright 2019 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Hand-written tokenizer for formula text. Produces a flat stream of
//! spanned tokens consumed by `crate::parser`.

use std::str::CharIndices;

use lazy_static::lazy_static;
use regex::Regex;
use unicode_xid::UnicodeXID;

use crate::common::{ErrorCode, ExpressionSyntaxError};

#[cfg(test)]
mod test;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Token<'input> {
    Plus,
    Minus,
    Mul,
    Div,
    Mod,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    LParen,
    RParen,
    Comma,
    Ident(&'input str),
    Num(&'input str),
}

pub type Spanned<T> = (usize, T, usize);

fn error<T>(code: ErrorCode, position: usize) -> Result<T, ExpressionSyntaxError> {
    Err(ExpressionSyntaxError { code, position })
}

fn is_ident_start(c: char) -> bool {
    UnicodeXID::is_xid_start(c) || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    UnicodeXID::is_xid_continue(c) || c == '_'
}

pub struct Lexer<'input> {
    text: &'input str,
    chars: CharIndices<'input>,
    lookahead: Option<(usize, char)>,
}

impl<'input> Lexer<'input> {
    pub fn new(input: &'input str) -> Self {
        let mut lexer = Lexer {
            text: input,
            chars: input.char_indices(),
            lookahead: None,
        };
        lexer.bump();
        lexer
    }

    fn bump(&mut self) -> Option<(usize, char)> {
        self.lookahead = self.chars.next();
        self.lookahead
    }

    fn take_while<F: FnMut(char) -> bool>(&mut self, mut keep_going: F) -> usize {
        loop {
            match self.lookahead {
                Some((idx, c)) if keep_going(c) => {
                    let _ = idx;
                    self.bump();
                }
                Some((idx, _)) => return idx,
                None => return self.text.len(),
            }
        }
    }

    fn identifierish(&mut self, start: usize) -> Spanned<Token<'input>> {
        let end = self.take_while(is_ident_continue);
        (start, Token::Ident(&self.text[start..end]), end)
    }

    fn quoted_identifier(
        &mut self,
        start: usize,
    ) -> Result<Spanned<Token<'input>>, ExpressionSyntaxError> {
        self.bump(); // consume opening quote
        loop {
            match self.lookahead {
                Some((idx, '"')) => {
                    self.bump();
                    let end = idx + 1;
                    return Ok((start, Token::Ident(&self.text[start..end]), end));
                }
                Some(_) => {
                    self.bump();
                }
                None => return error(ErrorCode::UnclosedQuotedIdent, self.text.len()),
            }
        }
    }

    fn number(&mut self, start: usize) -> Spanned<Token<'input>> {
        lazy_static! {
            static ref NUMBER_RE: Regex =
                Regex::new(r"^\d+(\.\d*)?([eE][-+]?\d+)?|^\.\d+([eE][-+]?\d+)?").unwrap();
        }
        let m = NUMBER_RE.find(&self.text[start..]).unwrap();
        let end = start + m.end();
        for _ in 0..m.as_str().chars().count() {
            self.bump();
        }
        (start, Token::Num(&self.text[start..end]), end)
    }

    fn next_token(&mut self) -> Option<Result<Spanned<Token<'input>>, ExpressionSyntaxError>> {
        loop {
            let (start, c) = self.lookahead?;
            if c.is_whitespace() {
                self.bump();
                continue;
            }

            macro_rules! single {
                ($tok:expr) => {{
                    self.bump();
                    return Some(Ok((start, $tok, start + 1)));
                }};
            }

            return Some(match c {
                '+' => {
                    single!(Token::Plus)
                }
                '-' => {
                    single!(Token::Minus)
                }
                '*' => {
                    single!(Token::Mul)
                }
                '/' => {
                    single!(Token::Div)
                }
                '%' => {
                    single!(Token::Mod)
                }
                '(' => {
                    single!(Token::LParen)
                }
                ')' => {
                    single!(Token::RParen)
                }
                ',' => {
                    single!(Token::Comma)
                }
                '=' => {
                    self.bump();
                    if self.lookahead.map(|(_, c)| c) == Some('=') {
                        self.bump();
                        Ok((start, Token::Eq, start + 2))
                    } else {
                        Ok((start, Token::Eq, start + 1))
                    }
                }
                '!' => {
                    self.bump();
                    if self.lookahead.map(|(_, c)| c) == Some('=') {
                        self.bump();
                        Ok((start, Token::Neq, start + 2))
                    } else {
                        error(ErrorCode::UnrecognizedToken, start)
                    }
                }
                '<' => {
                    self.bump();
                    if self.lookahead.map(|(_, c)| c) == Some('=') {
                        self.bump();
                        Ok((start, Token::Lte, start + 2))
                    } else if self.lookahead.map(|(_, c)| c) == Some('>') {
                        self.bump();
                        Ok((start, Token::Neq, start + 2))
                    } else {
                        Ok((start, Token::Lt, start + 1))
                    }
                }
                '>' => {
                    self.bump();
                    if self.lookahead.map(|(_, c)| c) == Some('=') {
                        self.bump();
                        Ok((start, Token::Gte, start + 2))
                    } else {
                        Ok((start, Token::Gt, start + 1))
                    }
                }
                '"' => match self.quoted_identifier(start) {
                    Ok(tok) => Ok(tok),
                    Err(e) => Err(e),
                },
                c if c.is_ascii_digit() || c == '.' => Ok(self.number(start)),
                c if is_ident_start(c) => Ok(self.identifierish(start)),
                _ => error(ErrorCode::InvalidToken, start),
            });
        }
    }
}

impl<'input> Iterator for Lexer<'input> {
    type Item = Result<Spanned<Token<'input>>, ExpressionSyntaxError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token()
    }
}
