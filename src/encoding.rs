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

//! Instruction encoding to 16-bit machine words, the structural decoder, and
//! the hex / Intel-HEX output formats.
//!
//! Field layout (MSB first):
//!
//! ```text
//! bits  15..12   11..10   9..8   7..6   7..0      9..0
//!         OP       RA       RB    RC    IMM8      TARGET10
//! ```
//!
//! BZ and BAL-to-label compute their word with integer addition, not bitwise
//! OR. A label PC above 0x3FF carries into the RA and OP fields. snxasm
//! encodes branches this way, and staying word-compatible with it is part of
//! the contract; do not "repair" the overflow.

use crate::ast::{IRProgram, InstructionIR, Opcode, Operand};
use crate::constants::HEX_WORDS_PER_LINE;
use crate::errors::EncodingError;
use crate::word::{imm8, word};
use std::collections::BTreeMap;

pub const LABEL_PC_MASK: u16 = 0x3FF;

/// Numeric opcode as placed in bits 15..12.
pub fn opcode_value(opcode: Opcode) -> u16 {
    match opcode {
        Opcode::Add => 0x0,
        Opcode::And => 0x1,
        Opcode::Sub => 0x2,
        Opcode::Slt => 0x3,
        Opcode::Not => 0x4,
        Opcode::Sr => 0x6,
        Opcode::Hlt => 0x7,
        Opcode::Ld => 0x8,
        Opcode::St => 0x9,
        Opcode::Lda => 0xA,
        Opcode::In => 0xC,
        Opcode::Out => 0xD,
        Opcode::Bz => 0xE,
        Opcode::Bal => 0xF,
    }
}

pub fn opcode_from_value(value: u16) -> Option<Opcode> {
    match value {
        0x0 => Some(Opcode::Add),
        0x1 => Some(Opcode::And),
        0x2 => Some(Opcode::Sub),
        0x3 => Some(Opcode::Slt),
        0x4 => Some(Opcode::Not),
        0x6 => Some(Opcode::Sr),
        0x7 => Some(Opcode::Hlt),
        0x8 => Some(Opcode::Ld),
        0x9 => Some(Opcode::St),
        0xA => Some(Opcode::Lda),
        0xC => Some(Opcode::In),
        0xD => Some(Opcode::Out),
        0xE => Some(Opcode::Bz),
        0xF => Some(Opcode::Bal),
        _ => None,
    }
}

pub fn encode_instruction(
    inst: &InstructionIR,
    labels: &BTreeMap<String, usize>,
) -> Result<u16, EncodingError> {
    let op = opcode_value(inst.opcode);

    match inst.opcode {
        // R-type: OP, RA=src1, RB=src2, RC=dest
        Opcode::Add | Opcode::And | Opcode::Sub | Opcode::Slt => {
            let (dest, src1, src2) = match (
                inst.operands.first(),
                inst.operands.get(1),
                inst.operands.get(2),
            ) {
                (
                    Some(Operand::Register(dest)),
                    Some(Operand::Register(src1)),
                    Some(Operand::Register(src2)),
                ) => (dest, src1, src2),
                _ => return Err(invalid("R-type", inst)),
            };
            Ok((op << 12)
                | ((src1.index as u16) << 10)
                | ((src2.index as u16) << 8)
                | ((dest.index as u16) << 6))
        }

        // R1-type: OP, RA=src, RC=dest
        Opcode::Not | Opcode::Sr => {
            let (dest, src) = match (inst.operands.first(), inst.operands.get(1)) {
                (Some(Operand::Register(dest)), Some(Operand::Register(src))) => (dest, src),
                _ => return Err(invalid("R1-type", inst)),
            };
            Ok((op << 12) | ((src.index as u16) << 10) | ((dest.index as u16) << 6))
        }

        Opcode::Hlt => Ok(op << 12),

        // I-type: OP, RA=reg, RB=base, IMM8
        Opcode::Ld | Opcode::St | Opcode::Lda => {
            let (reg, addr) = match (inst.operands.first(), inst.operands.get(1)) {
                (Some(Operand::Register(reg)), Some(Operand::Address(addr))) => (reg, addr),
                _ => return Err(invalid("I-type", inst)),
            };
            Ok((op << 12)
                | ((reg.index as u16) << 10)
                | ((addr.base.index as u16) << 8)
                | imm8(addr.offset) as u16)
        }

        Opcode::In | Opcode::Out => {
            let reg = match inst.operands.first() {
                Some(Operand::Register(reg)) => reg,
                _ => return Err(invalid(inst.opcode.name(), inst)),
            };
            Ok((op << 12) | ((reg.index as u16) << 10))
        }

        Opcode::Bz => {
            let (cond, label) = match (inst.operands.first(), inst.operands.get(1)) {
                (Some(Operand::Register(cond)), Some(Operand::LabelRef(label))) => (cond, label),
                _ => return Err(invalid("BZ", inst)),
            };
            let label_pc = labels.get(&label.name).copied().unwrap_or(0);
            // Addition on purpose: a target above the 10-bit field carries
            // into the register and opcode bits, the same way snxasm does.
            Ok(word(
                ((op as i32) << 12) + ((cond.index as i32) << 10) + label_pc as i32,
            ))
        }

        Opcode::Bal => {
            let link = match inst.operands.first() {
                Some(Operand::Register(link)) => link,
                _ => return Err(invalid("BAL", inst)),
            };
            match inst.operands.get(1) {
                Some(Operand::LabelRef(label)) => {
                    let label_pc = labels.get(&label.name).copied().unwrap_or(0);
                    // same additive overflow contract as BZ
                    Ok(word(
                        ((op as i32) << 12) + ((link.index as i32) << 10) + label_pc as i32,
                    ))
                }
                Some(Operand::Address(addr)) => Ok((op << 12)
                    | ((link.index as u16) << 10)
                    | ((addr.base.index as u16) << 8)
                    | imm8(addr.offset) as u16),
                _ => Err(invalid("BAL", inst)),
            }
        }
    }
}

fn invalid(kind: &'static str, inst: &InstructionIR) -> EncodingError {
    EncodingError::InvalidOperands {
        kind,
        text: inst.text.clone(),
    }
}

pub fn encode_program(ir: &IRProgram) -> Result<Vec<u16>, EncodingError> {
    ir.instructions
        .iter()
        .map(|inst| encode_instruction(inst, &ir.labels))
        .collect()
}

/// Structural view of a decoded word. BZ/BAL words whose encoding overflowed
/// the 10-bit target field alias into other opcodes; the decoder makes no
/// attempt to recover from that.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodedWord {
    /// ADD/AND/SUB/SLT
    Register {
        opcode: Opcode,
        dest: u16,
        src1: u16,
        src2: u16,
    },
    /// NOT/SR
    Register1 { opcode: Opcode, dest: u16, src: u16 },
    /// HLT
    NoOperand { opcode: Opcode },
    /// LD/ST/LDA
    Memory {
        opcode: Opcode,
        reg: u16,
        base: u16,
        imm: u16,
    },
    /// IN/OUT
    Io { opcode: Opcode, reg: u16 },
    /// BZ
    Branch {
        opcode: Opcode,
        cond_reg: u16,
        target: u16,
    },
    /// BAL; both field readings are returned because the word alone cannot
    /// tell a label target from an indirect address
    BranchAndLink {
        opcode: Opcode,
        link_reg: u16,
        base: u16,
        imm: u16,
        target: u16,
    },
    Unknown { raw: u16 },
}

pub fn decode_word(value: u16) -> DecodedWord {
    let op = (value >> 12) & 0xF;
    let Some(opcode) = opcode_from_value(op) else {
        return DecodedWord::Unknown { raw: value };
    };

    match opcode {
        Opcode::Add | Opcode::And | Opcode::Sub | Opcode::Slt => DecodedWord::Register {
            opcode,
            dest: (value >> 6) & 0x3,
            src1: (value >> 10) & 0x3,
            src2: (value >> 8) & 0x3,
        },
        Opcode::Not | Opcode::Sr => DecodedWord::Register1 {
            opcode,
            dest: (value >> 6) & 0x3,
            src: (value >> 10) & 0x3,
        },
        Opcode::Hlt => DecodedWord::NoOperand { opcode },
        Opcode::Ld | Opcode::St | Opcode::Lda => DecodedWord::Memory {
            opcode,
            reg: (value >> 10) & 0x3,
            base: (value >> 8) & 0x3,
            imm: value & 0xFF,
        },
        Opcode::In | Opcode::Out => DecodedWord::Io {
            opcode,
            reg: (value >> 10) & 0x3,
        },
        Opcode::Bz => DecodedWord::Branch {
            opcode,
            cond_reg: (value >> 10) & 0x3,
            target: value & LABEL_PC_MASK,
        },
        Opcode::Bal => DecodedWord::BranchAndLink {
            opcode,
            link_reg: (value >> 10) & 0x3,
            base: (value >> 8) & 0x3,
            imm: value & 0xFF,
            target: value & LABEL_PC_MASK,
        },
    }
}

/// Uppercase 4-digit hex words, space separated, `words_per_line` per line.
pub fn format_hex(words: &[u16], words_per_line: usize) -> String {
    words
        .chunks(words_per_line.max(1))
        .map(|chunk| {
            chunk
                .iter()
                .map(|w| format!("{w:04X}"))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_hex_default(words: &[u16]) -> String {
    format_hex(words, HEX_WORDS_PER_LINE)
}

/// Intel-HEX: one data record per word (byte count 02, type 00, address =
/// word index, big-endian data), terminated by the EOF record.
pub fn format_intel_hex(words: &[u16]) -> String {
    let mut lines: Vec<String> = Vec::with_capacity(words.len() + 1);
    for (i, &w) in words.iter().enumerate() {
        let byte_count: u32 = 2;
        let address = i as u32;
        let record_type: u32 = 0;
        let data_high = (w >> 8) as u32;
        let data_low = (w & 0xFF) as u32;
        let sum = byte_count + (address >> 8) + (address & 0xFF) + record_type + data_low + data_high;
        let checksum = sum.wrapping_neg() & 0xFF;
        lines.push(format!(
            ":{byte_count:02X}{address:04X}{record_type:02X}{w:04X}{checksum:02X}"
        ));
    }
    lines.push(":00000001FF".to_string());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::analyze;
    use crate::constants::DEFAULT_REG_COUNT;
    use crate::diagnostics::DiagnosticCollector;
    use crate::parser::parse;

    fn compile_ir(source: &str) -> IRProgram {
        let mut diagnostics = DiagnosticCollector::new();
        let program = parse(source, &mut diagnostics);
        let result = analyze(program, &mut diagnostics, DEFAULT_REG_COUNT);
        result.ir.unwrap_or_else(|| {
            panic!("source failed to compile: {:?}", diagnostics.diagnostics())
        })
    }

    fn encode_one(source: &str) -> u16 {
        let ir = compile_ir(source);
        encode_instruction(&ir.instructions[0], &ir.labels).unwrap()
    }

    #[test]
    fn test_encode_r_type() {
        assert_eq!(encode_one("ADD $1, $2, $3\n"), 0x0B40); // src1=2,src2=3,dest=1
        assert_eq!(encode_one("AND $0, $1, $2\n"), 0x1600);
        assert_eq!(encode_one("SUB $3, $0, $1\n"), 0x21C0);
        assert_eq!(encode_one("SLT $0, $1, $0\n"), 0x3400);
    }

    #[test]
    fn test_encode_r1_type() {
        assert_eq!(encode_one("NOT $1, $2\n"), 0x4840); // src=2, dest=1
        assert_eq!(encode_one("SR $2, $2\n"), 0x6880);
    }

    #[test]
    fn test_encode_hlt() {
        assert_eq!(encode_one("HLT\n"), 0x7000);
    }

    #[test]
    fn test_encode_memory_type() {
        assert_eq!(encode_one("LD $1, 0($3)\n"), 0x8700);
        assert_eq!(encode_one("ST $2, 1($3)\n"), 0x9B01);
        assert_eq!(encode_one("LDA $3, 64($0)\n"), 0xAC40);
        // negative offsets occupy the IMM8 field in two's complement
        assert_eq!(encode_one("LDA $3, -2($3)\n"), 0xAFFE);
    }

    #[test]
    fn test_encode_io() {
        assert_eq!(encode_one("IN $1\n"), 0xC400);
        assert_eq!(encode_one("OUT $2\n"), 0xD800);
    }

    #[test]
    fn test_encode_bz_adds_label_pc() {
        let ir = compile_ir("main: LDA $1, 1($0)\nBZ $1, main\nHLT\n");
        let bz = &ir.instructions[1];
        assert_eq!(encode_instruction(bz, &ir.labels).unwrap(), 0xE400); // target 0
    }

    #[test]
    fn test_encode_bal_indirect() {
        let ir = compile_ir("main: BAL $2, 0($2)\n");
        assert_eq!(encode_instruction(&ir.instructions[0], &ir.labels).unwrap(), 0xFA00);
    }

    #[test]
    fn test_branch_overflow_quirk_is_additive() {
        // synthetic label table puts L at the edge of the 10-bit field
        let ir = compile_ir("main: BAL $1, main\n");
        let mut labels = ir.labels.clone();

        labels.insert("MAIN".to_string(), 0x3FF);
        assert_eq!(
            encode_instruction(&ir.instructions[0], &labels).unwrap(),
            0xF7FF
        );

        // one past the field: the carry lands in RA (and would keep going
        // into OP), it is not masked away
        labels.insert("MAIN".to_string(), 0x400);
        assert_eq!(
            encode_instruction(&ir.instructions[0], &labels).unwrap(),
            0xF800
        );
    }

    #[test]
    fn test_encode_program_length_matches() {
        let ir = compile_ir("main: LDA $1, 1($0)\nOUT $1\nHLT\n");
        let words = encode_program(&ir).unwrap();
        assert_eq!(words.len(), ir.instructions.len());
    }

    #[test]
    fn test_encoder_rejects_mismatched_operands() {
        // hand-build an IR instruction that violates the validated shape
        let inst = InstructionIR {
            opcode: Opcode::Hlt,
            operands: Vec::new(),
            text: "HLT".to_string(),
            pc: 0,
        };
        let labels = BTreeMap::new();
        assert!(encode_instruction(&inst, &labels).is_ok());

        let bad = InstructionIR {
            opcode: Opcode::Add,
            operands: Vec::new(),
            text: "ADD".to_string(),
            pc: 0,
        };
        assert_eq!(
            encode_instruction(&bad, &labels),
            Err(EncodingError::InvalidOperands {
                kind: "R-type",
                text: "ADD".to_string()
            })
        );
    }

    #[test]
    fn test_decode_round_trips_non_branch() {
        let sources = [
            "ADD $1, $2, $3\n",
            "NOT $1, $2\n",
            "LD $1, 5($3)\n",
            "IN $1\n",
            "OUT $2\n",
            "HLT\n",
        ];
        for source in sources {
            let ir = compile_ir(source);
            let word = encode_instruction(&ir.instructions[0], &ir.labels).unwrap();
            match decode_word(word) {
                DecodedWord::Register { dest, src1, src2, .. } => {
                    assert_eq!((dest, src1, src2), (1, 2, 3));
                }
                DecodedWord::Register1 { dest, src, .. } => {
                    assert_eq!((dest, src), (1, 2));
                }
                DecodedWord::Memory { reg, base, imm, .. } => {
                    assert_eq!((reg, base, imm), (1, 3, 5));
                }
                DecodedWord::Io { reg, .. } => assert!(reg == 1 || reg == 2),
                DecodedWord::NoOperand { opcode } => assert_eq!(opcode, Opcode::Hlt),
                other => panic!("unexpected decode for {source:?}: {other:?}"),
            }
        }
    }

    #[test]
    fn test_decode_branch_fields() {
        let ir = compile_ir("main: LDA $1, 1($0)\nBZ $1, main\nHLT\n");
        let word = encode_instruction(&ir.instructions[1], &ir.labels).unwrap();
        assert_eq!(
            decode_word(word),
            DecodedWord::Branch {
                opcode: Opcode::Bz,
                cond_reg: 1,
                target: 0
            }
        );
    }

    #[test]
    fn test_decode_unknown_opcode() {
        // 0x5 and 0xB are unassigned
        assert_eq!(decode_word(0x5000), DecodedWord::Unknown { raw: 0x5000 });
        assert_eq!(decode_word(0xB123), DecodedWord::Unknown { raw: 0xB123 });
    }

    #[test]
    fn test_format_hex_groups_words() {
        let words: Vec<u16> = (0..10).map(|i| 0x1000 + i).collect();
        let text = format_hex(&words, 8);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            "1000 1001 1002 1003 1004 1005 1006 1007"
        );
        assert_eq!(lines[1], "1008 1009");
    }

    #[test]
    fn test_format_intel_hex() {
        let text = format_intel_hex(&[0xAC40, 0x7000]);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], ":02000000AC4012"); // checksum -(02+00+00+00+40+AC)
        assert_eq!(lines[1], ":0200010070008D");
        assert_eq!(lines[2], ":00000001FF");
    }
}
