/*
Copyright 2025 The SN/X Project Developers

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

//! Scanner: source text to a spanned token stream.
//!
//! Token recognition is driven by the pest grammar in `grammar.pest`.
//! Whitespace and `;` comments are discarded there; newlines survive as EOL
//! tokens and an EOF token is appended at the end. The grammar accepts any
//! input, so lexical problems surface as L-code diagnostics, not failures.

use crate::diagnostics::{DiagnosticCollector, SourceSpan};
use pest::Parser;
use pest_derive::Parser;

// Derive the scanner from our grammar file.
#[derive(Parser)]
#[grammar = "./grammar.pest"]
pub struct SnxScanner;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Number,
    Register,
    Comma,
    Colon,
    LParen,
    RParen,
    Eol,
    Eof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Exact source spelling.
    pub lexeme: String,
    /// Uppercased for IDENT and REGISTER, otherwise the lexeme itself.
    pub normalized: String,
    pub line: usize,
    pub column: usize,
}

impl Token {
    pub fn span(&self) -> SourceSpan {
        let end_col = self.column + self.lexeme.chars().count();
        SourceSpan::new(self.line, self.column, self.line, end_col)
    }
}

pub fn tokenize(source: &str, diagnostics: &mut DiagnosticCollector) -> Vec<Token> {
    let pairs = SnxScanner::parse(Rule::tokens, source)
        .expect("the token grammar accepts any input");

    let mut tokens: Vec<Token> = Vec::new();
    let mut eof_line = 1;
    let mut eof_col = 1;

    for pair in pairs.flatten() {
        let (line, column) = pair.as_span().start_pos().line_col();
        let lexeme = pair.as_str();

        match pair.as_rule() {
            Rule::eol => tokens.push(plain_token(TokenKind::Eol, "\n", line, column)),
            Rule::comma => tokens.push(plain_token(TokenKind::Comma, ",", line, column)),
            Rule::colon => tokens.push(plain_token(TokenKind::Colon, ":", line, column)),
            Rule::lparen => tokens.push(plain_token(TokenKind::LParen, "(", line, column)),
            Rule::rparen => tokens.push(plain_token(TokenKind::RParen, ")", line, column)),
            Rule::register => tokens.push(Token {
                kind: TokenKind::Register,
                lexeme: lexeme.to_string(),
                normalized: lexeme.to_uppercase(),
                line,
                column,
            }),
            Rule::bare_sigil => {
                // A `$` with no digits after it: report, but keep a register
                // token so the parser can keep going on this line.
                diagnostics.add_error(
                    "L002",
                    "expected register number after '$'".to_string(),
                    SourceSpan::new(line, column, line, column + 1),
                );
                tokens.push(plain_token(TokenKind::Register, "$", line, column));
            }
            Rule::number => tokens.push(Token {
                kind: TokenKind::Number,
                lexeme: lexeme.to_string(),
                normalized: lexeme.to_string(),
                line,
                column,
            }),
            Rule::ident => tokens.push(Token {
                kind: TokenKind::Ident,
                lexeme: lexeme.to_string(),
                normalized: lexeme.to_uppercase(),
                line,
                column,
            }),
            Rule::stray => {
                diagnostics.add_error(
                    "L001",
                    format!("invalid character: '{lexeme}'"),
                    SourceSpan::new(line, column, line, column + 1),
                );
            }
            Rule::EOI => {
                eof_line = line;
                eof_col = column;
            }
            _ => {}
        }
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        lexeme: String::new(),
        normalized: String::new(),
        line: eof_line,
        column: eof_col,
    });
    tokens
}

fn plain_token(kind: TokenKind, lexeme: &str, line: usize, column: usize) -> Token {
    Token {
        kind,
        lexeme: lexeme.to_string(),
        normalized: lexeme.to_string(),
        line,
        column,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(source: &str) -> (Vec<Token>, DiagnosticCollector) {
        let mut diagnostics = DiagnosticCollector::new();
        let tokens = tokenize(source, &mut diagnostics);
        (tokens, diagnostics)
    }

    fn kinds(tokens: &[Token]) -> Vec<TokenKind> {
        tokens.iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_tokenize_instruction_line() {
        let (tokens, diagnostics) = scan("LDA $3, 64($0)\n");
        assert!(!diagnostics.has_errors());
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Ident,
                TokenKind::Register,
                TokenKind::Comma,
                TokenKind::Number,
                TokenKind::LParen,
                TokenKind::Register,
                TokenKind::RParen,
                TokenKind::Eol,
                TokenKind::Eof,
            ]
        );
        assert_eq!(tokens[0].lexeme, "LDA");
        assert_eq!(tokens[1].lexeme, "$3");
        assert_eq!(tokens[3].lexeme, "64");
    }

    #[test]
    fn test_identifiers_normalize_to_upper() {
        let (tokens, _) = scan("main: add $1, $2, $3\n");
        assert_eq!(tokens[0].lexeme, "main");
        assert_eq!(tokens[0].normalized, "MAIN");
        assert_eq!(tokens[2].normalized, "ADD");
    }

    #[test]
    fn test_comments_and_whitespace_discarded() {
        let (tokens, diagnostics) = scan("  HLT \t ; stop here\nHLT");
        assert!(!diagnostics.has_errors());
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Ident,
                TokenKind::Eol,
                TokenKind::Ident,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_signed_numbers() {
        let (tokens, diagnostics) = scan("-2 +17 5");
        assert!(!diagnostics.has_errors());
        assert_eq!(tokens[0].lexeme, "-2");
        assert_eq!(tokens[1].lexeme, "+17");
        assert_eq!(tokens[2].lexeme, "5");
        assert_eq!(tokens[0].kind, TokenKind::Number);
    }

    #[test]
    fn test_spans_are_one_based() {
        let (tokens, _) = scan("BZ $0, top\n");
        let span = tokens[0].span();
        assert_eq!((span.start_line, span.start_col), (1, 1));
        assert_eq!(span.end_col, 3); // exclusive end column
        let reg = tokens[1].span();
        assert_eq!((reg.start_line, reg.start_col), (1, 4));
        assert_eq!(reg.end_col, 6);
    }

    #[test]
    fn test_invalid_character_recovers() {
        let (tokens, diagnostics) = scan("ADD @ $1\n");
        let diags = diagnostics.diagnostics();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, "L001");
        assert_eq!(diags[0].span.start_col, 5);
        // scanning resumed after the bad character
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Ident,
                TokenKind::Register,
                TokenKind::Eol,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_bare_sigil_reports_l002() {
        let (tokens, diagnostics) = scan("LD $, 0($3)\n");
        let diags = diagnostics.diagnostics();
        assert_eq!(diags[0].code, "L002");
        // a register token is still produced for parser recovery
        assert_eq!(tokens[1].kind, TokenKind::Register);
        assert_eq!(tokens[1].lexeme, "$");
    }

    #[test]
    fn test_eol_tracks_lines() {
        let (tokens, _) = scan("HLT\nHLT\n");
        assert_eq!(tokens[1].kind, TokenKind::Eol);
        assert_eq!(tokens[1].line, 1);
        assert_eq!(tokens[2].line, 2);
        assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof);
        assert_eq!(tokens.last().unwrap().line, 3);
    }

    #[test]
    fn test_empty_source() {
        let (tokens, diagnostics) = scan("");
        assert!(!diagnostics.has_errors());
        assert_eq!(kinds(&tokens), vec![TokenKind::Eof]);
        assert_eq!(tokens[0].line, 1);
        assert_eq!(tokens[0].column, 1);
    }
}
