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

//! Recursive-descent parser over the token stream, one line at a time.
//!
//! Per-line grammar:
//!
//! ```text
//! line         := [label_def] [instruction] EOL
//! label_def    := IDENT ':'
//! instruction  := IDENT operand_list?
//! operand_list := operand (',' operand)*
//! operand      := REGISTER | NUMBER '(' REGISTER ')' | IDENT
//! ```
//!
//! On an unexpected token the parser reports a diagnostic and skips to the
//! next EOL, so one bad line never hides problems on the lines after it.

use crate::ast::{
    AddressOperand, InstructionNode, LabelDef, LabelRefOperand, Line, Opcode, Operand, Program,
    RegisterOperand,
};
use crate::diagnostics::{DiagnosticCollector, SourceSpan};
use crate::tokenizer::{Token, TokenKind, tokenize};

pub fn parse(source: &str, diagnostics: &mut DiagnosticCollector) -> Program {
    let tokens = tokenize(source, diagnostics);
    let source_lines: Vec<String> = source.lines().map(str::to_string).collect();
    LineParser {
        tokens,
        pos: 0,
        source_lines,
        diagnostics,
    }
    .parse_program()
}

struct LineParser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    source_lines: Vec<String>,
    diagnostics: &'a mut DiagnosticCollector,
}

impl<'a> LineParser<'a> {
    fn parse_program(mut self) -> Program {
        let mut lines = Vec::new();
        while self.peek().kind != TokenKind::Eof {
            if self.peek().kind == TokenKind::Eol {
                self.advance();
                continue;
            }
            if let Some(line) = self.parse_line() {
                lines.push(line);
            }
        }
        Program { lines }
    }

    fn parse_line(&mut self) -> Option<Line> {
        let line_no = self.peek().line;
        let raw = self
            .source_lines
            .get(line_no - 1)
            .cloned()
            .unwrap_or_default();

        // Check for a label first
        let mut label = None;
        if self.peek().kind == TokenKind::Ident && self.peek_next().kind == TokenKind::Colon {
            let name_tok = self.advance();
            self.advance(); // ':'
            label = Some(LabelDef {
                name: name_tok.normalized.clone(),
                original: name_tok.lexeme.clone(),
                span: name_tok.span(),
            });
        }

        // Check for an instruction
        let mut instruction = None;
        match self.peek().kind {
            TokenKind::Ident => {
                instruction = self.parse_instruction(line_no);
                if instruction.is_none() {
                    self.synchronize();
                }
            }
            TokenKind::Eol | TokenKind::Eof => {}
            _ => {
                let tok = self.advance();
                self.diagnostics.add_line_error(
                    line_no,
                    "P003",
                    format!("unexpected token {}", describe(&tok)),
                    tok.span(),
                );
                self.synchronize();
            }
        }

        // Line terminator: EOL, or EOF on the last line.
        match self.peek().kind {
            TokenKind::Eol => {
                self.advance();
            }
            TokenKind::Eof => {}
            _ => {
                let tok = self.advance();
                self.diagnostics.add_line_error(
                    line_no,
                    "P003",
                    format!("unexpected token {}", describe(&tok)),
                    tok.span(),
                );
                // the line did not parse as a whole; drop the partial
                // instruction and resume at the next line
                instruction = None;
                self.synchronize();
                if self.peek().kind == TokenKind::Eol {
                    self.advance();
                }
            }
        }

        if label.is_none() && instruction.is_none() {
            None
        } else {
            Some(Line {
                line_no,
                label,
                instruction,
                raw,
            })
        }
    }

    fn parse_instruction(&mut self, line_no: usize) -> Option<InstructionNode> {
        let opcode_tok = self.advance();
        let opcode = Opcode::from_mnemonic(&opcode_tok.normalized);
        if opcode.is_none() {
            self.diagnostics.add_line_error(
                line_no,
                "S001",
                format!("unknown opcode '{}'", opcode_tok.lexeme),
                opcode_tok.span(),
            );
        }

        let mut operands: Vec<Operand> = Vec::new();
        if !matches!(self.peek().kind, TokenKind::Eol | TokenKind::Eof) {
            loop {
                operands.push(self.parse_operand(line_no)?);
                if self.peek().kind == TokenKind::Comma {
                    self.advance();
                } else {
                    break;
                }
            }
        }

        let end = operands
            .last()
            .map(|op| op.span())
            .unwrap_or_else(|| opcode_tok.span());
        let span = SourceSpan::new(opcode_tok.line, opcode_tok.column, end.end_line, end.end_col);
        let text = if operands.is_empty() {
            opcode_tok.lexeme.clone()
        } else {
            let operand_texts: Vec<&str> = operands.iter().map(|op| op.text()).collect();
            format!("{} {}", opcode_tok.lexeme, operand_texts.join(", "))
        };

        Some(InstructionNode {
            opcode,
            opcode_text: opcode_tok.lexeme.clone(),
            operands,
            text,
            span,
        })
    }

    fn parse_operand(&mut self, line_no: usize) -> Option<Operand> {
        match self.peek().kind {
            TokenKind::Register => {
                let tok = self.advance();
                self.register_operand(&tok, line_no).map(Operand::Register)
            }
            TokenKind::Number => self.parse_address(line_no),
            TokenKind::Ident => {
                let tok = self.advance();
                Some(Operand::LabelRef(LabelRefOperand {
                    name: tok.normalized.clone(),
                    original: tok.lexeme.clone(),
                    text: tok.lexeme.clone(),
                    span: tok.span(),
                }))
            }
            _ => {
                let tok = self.peek().clone();
                self.diagnostics.add_line_error(
                    line_no,
                    "P003",
                    format!("expected an operand, found {}", describe(&tok)),
                    tok.span(),
                );
                None
            }
        }
    }

    /// `NUMBER '(' REGISTER ')'`
    fn parse_address(&mut self, line_no: usize) -> Option<Operand> {
        let number_tok = self.advance();
        let offset = match number_tok.lexeme.parse::<i32>() {
            Ok(value) => value,
            Err(_) => {
                self.diagnostics.add_line_error(
                    line_no,
                    "P005",
                    format!("invalid numeric literal '{}'", number_tok.lexeme),
                    number_tok.span(),
                );
                return None;
            }
        };

        if self.peek().kind != TokenKind::LParen {
            let tok = self.peek().clone();
            self.diagnostics.add_line_error(
                line_no,
                "P002",
                format!("expected '(' after address offset, found {}", describe(&tok)),
                tok.span(),
            );
            return None;
        }
        self.advance(); // '('

        if self.peek().kind != TokenKind::Register {
            let tok = self.peek().clone();
            self.diagnostics.add_line_error(
                line_no,
                "P006",
                format!("expected a base register in address, found {}", describe(&tok)),
                tok.span(),
            );
            return None;
        }
        let reg_tok = self.advance();
        let base = self.register_operand(&reg_tok, line_no)?;

        if self.peek().kind != TokenKind::RParen {
            let tok = self.peek().clone();
            self.diagnostics.add_line_error(
                line_no,
                "P002",
                format!("expected ')' after base register, found {}", describe(&tok)),
                tok.span(),
            );
            return None;
        }
        let rparen_tok = self.advance();

        let text = format!("{}({})", number_tok.lexeme, reg_tok.lexeme);
        let span = SourceSpan::new(
            number_tok.line,
            number_tok.column,
            rparen_tok.line,
            rparen_tok.span().end_col,
        );
        Some(Operand::Address(AddressOperand {
            offset,
            base,
            text,
            span,
        }))
    }

    fn register_operand(&mut self, tok: &Token, line_no: usize) -> Option<RegisterOperand> {
        let digits = tok.lexeme.strip_prefix('$').unwrap_or(&tok.lexeme);
        match digits.parse::<usize>() {
            Ok(index) => Some(RegisterOperand {
                index,
                text: tok.lexeme.clone(),
                span: tok.span(),
            }),
            Err(_) => {
                self.diagnostics.add_line_error(
                    line_no,
                    "P004",
                    format!("malformed register '{}'", tok.lexeme),
                    tok.span(),
                );
                None
            }
        }
    }

    /// Skips to the next EOL (or EOF) without consuming it.
    fn synchronize(&mut self) {
        while !matches!(self.peek().kind, TokenKind::Eol | TokenKind::Eof) {
            self.advance();
        }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek_next(&self) -> &Token {
        let idx = (self.pos + 1).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }
}

fn describe(tok: &Token) -> String {
    match tok.kind {
        TokenKind::Eol => "end of line".to_string(),
        TokenKind::Eof => "end of file".to_string(),
        _ => format!("'{}'", tok.lexeme),
    }
}
