// Copyright 2019 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use super::*;

fn lex_all(input: &str) -> Vec<Token> {
    Lexer::new(input)
        .map(|r| r.unwrap().1)
        .collect::<Vec<_>>()
}

#[test]
fn test_simple_tokens() {
    assert_eq!(
        lex_all("a + 1"),
        vec![Token::Ident("a"), Token::Plus, Token::Num("1")]
    );
    assert_eq!(
        lex_all("foo(bar, 2.5)"),
        vec![
            Token::Ident("foo"),
            Token::LParen,
            Token::Ident("bar"),
            Token::Comma,
            Token::Num("2.5"),
            Token::RParen,
        ]
    );
}

#[test]
fn test_comparisons() {
    assert_eq!(lex_all("a == b"), vec![Token::Ident("a"), Token::Eq, Token::Ident("b")]);
    assert_eq!(lex_all("a != b"), vec![Token::Ident("a"), Token::Neq, Token::Ident("b")]);
    assert_eq!(lex_all("a <> b"), vec![Token::Ident("a"), Token::Neq, Token::Ident("b")]);
    assert_eq!(lex_all("a <= b"), vec![Token::Ident("a"), Token::Lte, Token::Ident("b")]);
    assert_eq!(lex_all("a >= b"), vec![Token::Ident("a"), Token::Gte, Token::Ident("b")]);
    assert_eq!(lex_all("a < b"), vec![Token::Ident("a"), Token::Lt, Token::Ident("b")]);
    assert_eq!(lex_all("a > b"), vec![Token::Ident("a"), Token::Gt, Token::Ident("b")]);
}

#[test]
fn test_quoted_identifier() {
    assert_eq!(lex_all("\"kettle temp\""), vec![Token::Ident("\"kettle temp\"")]);
}

#[test]
fn test_unclosed_quote_is_error() {
    let mut lexer = Lexer::new("\"oops");
    let err = lexer.next().unwrap().unwrap_err();
    assert_eq!(err.code, ErrorCode::UnclosedQuotedIdent);
}

#[test]
fn test_scientific_notation() {
    assert_eq!(lex_all("1.5e-3"), vec![Token::Num("1.5e-3")]);
    assert_eq!(lex_all(".5"), vec![Token::Num(".5")]);
}

#[test]
fn test_invalid_token() {
    let mut lexer = Lexer::new("a @ b");
    assert_eq!(lexer.next().unwrap().unwrap().1, Token::Ident("a"));
    let err = lexer.next().unwrap().unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidToken);
}
