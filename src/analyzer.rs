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

//! Semantic analysis: two passes over the parsed line stream.
//!
//! Pass 1 assigns PCs and builds the label table (labels alone never advance
//! the PC). Pass 2 checks every instruction against its opcode's operand
//! signature and register/label constraints. The IR is only produced when the
//! collector holds no errors at all.

use crate::ast::{
    IRProgram, InstructionIR, InstructionNode, Opcode, Operand, Program,
};
use crate::diagnostics::{DiagnosticCollector, RelatedInfo, SourceSpan};
use std::collections::{BTreeMap, HashMap};

/// Expected operand tag, per the opcode signature table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandPattern {
    Register,
    Address,
    LabelRef,
    LabelRefOrAddress,
}

impl OperandPattern {
    fn matches(&self, operand: &Operand) -> bool {
        match self {
            OperandPattern::Register => matches!(operand, Operand::Register(_)),
            OperandPattern::Address => matches!(operand, Operand::Address(_)),
            OperandPattern::LabelRef => matches!(operand, Operand::LabelRef(_)),
            OperandPattern::LabelRefOrAddress => {
                matches!(operand, Operand::LabelRef(_) | Operand::Address(_))
            }
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            OperandPattern::Register => "a register",
            OperandPattern::Address => "an address",
            OperandPattern::LabelRef => "a label",
            OperandPattern::LabelRefOrAddress => "a label or an address",
        }
    }
}

/// Operand signature for each opcode.
pub fn operand_spec(opcode: Opcode) -> &'static [OperandPattern] {
    use OperandPattern::*;
    match opcode {
        Opcode::Add | Opcode::And | Opcode::Sub | Opcode::Slt => {
            &[Register, Register, Register]
        }
        Opcode::Not | Opcode::Sr => &[Register, Register],
        Opcode::Lda | Opcode::Ld | Opcode::St => &[Register, Address],
        Opcode::In | Opcode::Out => &[Register],
        Opcode::Bz => &[Register, LabelRef],
        Opcode::Bal => &[Register, LabelRefOrAddress],
        Opcode::Hlt => &[],
    }
}

#[derive(Debug)]
pub struct AnalysisResult {
    pub program: Program,
    /// None when any error has been collected (by this or an earlier stage).
    pub ir: Option<IRProgram>,
}

pub fn analyze(
    program: Program,
    diagnostics: &mut DiagnosticCollector,
    reg_count: usize,
) -> AnalysisResult {
    let mut analyzer = Analyzer {
        diagnostics,
        reg_count,
        labels: BTreeMap::new(),
        label_spans: HashMap::new(),
        instructions: Vec::new(),
    };
    analyzer.build_label_table(&program);
    analyzer.analyze_instructions(&program);

    let ir = if analyzer.diagnostics.has_errors() {
        None
    } else {
        Some(IRProgram {
            instructions: analyzer.instructions,
            labels: analyzer.labels,
        })
    };
    AnalysisResult { program, ir }
}

struct Analyzer<'a> {
    diagnostics: &'a mut DiagnosticCollector,
    reg_count: usize,
    labels: BTreeMap<String, usize>,
    label_spans: HashMap<String, SourceSpan>,
    instructions: Vec<InstructionIR>,
}

impl<'a> Analyzer<'a> {
    /// Pass 1: label table. Each instruction advances the PC by exactly one.
    fn build_label_table(&mut self, program: &Program) {
        let mut pc = 0;
        for line in &program.lines {
            if let Some(label) = &line.label {
                if let Some(prev_span) = self.label_spans.get(&label.name) {
                    self.diagnostics.add_error_with_related(
                        "S006",
                        format!("duplicate label definition: '{}'", label.original),
                        label.span,
                        vec![RelatedInfo {
                            message: "previous definition here".to_string(),
                            span: *prev_span,
                        }],
                    );
                } else {
                    self.labels.insert(label.name.clone(), pc);
                    self.label_spans.insert(label.name.clone(), label.span);
                }
            }
            if line.instruction.is_some() {
                pc += 1;
            }
        }
    }

    /// Pass 2: per-instruction checks and IR construction.
    fn analyze_instructions(&mut self, program: &Program) {
        let mut pc = 0;
        for line in &program.lines {
            let Some(inst) = &line.instruction else {
                continue;
            };
            let Some(opcode) = inst.opcode else {
                // unknown mnemonic (S001 already reported); it still occupies
                // a PC slot
                pc += 1;
                continue;
            };

            self.check_operand_spec(inst, opcode, line.line_no);
            self.check_register_bounds(inst, line.line_no);
            self.check_label_refs(inst, line.line_no);

            self.instructions.push(InstructionIR {
                opcode,
                operands: inst.operands.clone(),
                text: inst.text.clone(),
                pc,
            });
            pc += 1;
        }
    }

    fn check_operand_spec(&mut self, inst: &InstructionNode, opcode: Opcode, line_no: usize) {
        let spec = operand_spec(opcode);
        if inst.operands.len() != spec.len() {
            self.diagnostics.add_line_error(
                line_no,
                "S002",
                format!(
                    "'{}' expects {} operand(s), found {}",
                    opcode.name(),
                    spec.len(),
                    inst.operands.len()
                ),
                inst.span,
            );
            return;
        }

        for (i, (operand, pattern)) in inst.operands.iter().zip(spec.iter()).enumerate() {
            if !pattern.matches(operand) {
                self.diagnostics.add_line_error(
                    line_no,
                    "S003",
                    format!(
                        "operand {} of '{}' must be {}",
                        i + 1,
                        opcode.name(),
                        pattern.describe()
                    ),
                    operand.span(),
                );
            }
        }
    }

    fn check_register_bounds(&mut self, inst: &InstructionNode, line_no: usize) {
        for operand in &inst.operands {
            let reg = match operand {
                Operand::Register(reg) => reg,
                Operand::Address(addr) => &addr.base,
                _ => continue,
            };
            if reg.index >= self.reg_count {
                self.diagnostics.add_line_error(
                    line_no,
                    "S005",
                    format!(
                        "register index out of range: {} (valid range: $0-${})",
                        reg.text,
                        self.reg_count - 1
                    ),
                    reg.span,
                );
            }
        }
    }

    fn check_label_refs(&mut self, inst: &InstructionNode, line_no: usize) {
        for operand in &inst.operands {
            if let Operand::LabelRef(label) = operand {
                if !self.labels.contains_key(&label.name) {
                    self.diagnostics.add_line_error(
                        line_no,
                        "S004",
                        format!("undefined label: '{}'", label.original),
                        label.span,
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_REG_COUNT;
    use crate::parser::parse;

    fn analyze_source(source: &str) -> (AnalysisResult, DiagnosticCollector) {
        let mut diagnostics = DiagnosticCollector::new();
        let program = parse(source, &mut diagnostics);
        let result = analyze(program, &mut diagnostics, DEFAULT_REG_COUNT);
        (result, diagnostics)
    }

    fn error_codes(collector: &DiagnosticCollector) -> Vec<String> {
        collector
            .diagnostics()
            .iter()
            .map(|d| d.code.clone())
            .collect()
    }

    #[test]
    fn test_labels_map_to_next_instruction_pc() {
        let (result, _) = analyze_source("main:\n    LDA $1, 3($0)\nmid:\nend:\n    HLT\n");
        let ir = result.ir.unwrap();
        assert_eq!(ir.labels.get("MAIN"), Some(&0));
        assert_eq!(ir.labels.get("MID"), Some(&1));
        assert_eq!(ir.labels.get("END"), Some(&1));
        assert_eq!(ir.instructions.len(), 2);
        assert_eq!(ir.instructions[1].pc, 1);
    }

    #[test]
    fn test_duplicate_label_reports_s006_with_related() {
        let (result, diagnostics) = analyze_source("l: HLT\nl: HLT\n");
        assert!(result.ir.is_none());
        let diags = diagnostics.diagnostics();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, "S006");
        assert_eq!(diags[0].span.start_line, 2);
        assert_eq!(diags[0].related.len(), 1);
        assert_eq!(diags[0].related[0].span.start_line, 1);
    }

    #[test]
    fn test_wrong_arity_reports_s002() {
        let (result, diagnostics) = analyze_source("ADD $1, $2\n");
        assert!(result.ir.is_none());
        assert_eq!(error_codes(&diagnostics), vec!["S002"]);
    }

    #[test]
    fn test_wrong_operand_type_reports_s003() {
        let (_, diagnostics) = analyze_source("ADD $1, $2, loop\nloop: HLT\n");
        assert_eq!(error_codes(&diagnostics), vec!["S003"]);
    }

    #[test]
    fn test_bal_accepts_label_or_address() {
        let (result, _) = analyze_source("main: BAL $2, main\nBAL $2, 0($2)\nHLT\n");
        assert!(result.ir.is_some());
    }

    #[test]
    fn test_bz_rejects_address_target() {
        let (_, diagnostics) = analyze_source("main: BZ $0, 0($2)\n");
        assert_eq!(error_codes(&diagnostics), vec!["S003"]);
    }

    #[test]
    fn test_undefined_label_reports_s004() {
        let (result, diagnostics) = analyze_source("BZ $0, nowhere\n");
        assert!(result.ir.is_none());
        assert_eq!(error_codes(&diagnostics), vec!["S004"]);
    }

    #[test]
    fn test_register_out_of_range_reports_s005() {
        let (_, diagnostics) = analyze_source("OUT $4\n");
        assert_eq!(error_codes(&diagnostics), vec!["S005"]);
        let (_, diagnostics) = analyze_source("LD $1, 0($7)\n");
        assert_eq!(error_codes(&diagnostics), vec!["S005"]);
    }

    #[test]
    fn test_errors_on_same_line_chain_to_primary() {
        // arity is fine but both operand types are wrong: the second S003
        // points back at the first
        let (_, diagnostics) = analyze_source("x: LD loop, $1\nloop: HLT\n");
        let diags = diagnostics.diagnostics();
        assert_eq!(diags.len(), 2);
        assert_eq!(diags[0].code, "S003");
        assert_eq!(diags[1].code, "S003");
        assert!(diags[0].related.is_empty());
        assert_eq!(diags[1].related.len(), 1);
    }

    #[test]
    fn test_clean_program_builds_ir() {
        let (result, diagnostics) = analyze_source(
            "main:\n    LDA $3, 64($0)\n    LD $1, 0($3)\n    OUT $1\n    HLT\n",
        );
        assert!(!diagnostics.has_errors());
        let ir = result.ir.unwrap();
        assert_eq!(ir.instructions.len(), 4);
        assert_eq!(ir.instructions[0].opcode, Opcode::Lda);
        assert_eq!(ir.instructions[3].opcode, Opcode::Hlt);
        assert_eq!(ir.labels.len(), 1);
    }

    #[test]
    fn test_in_and_out_take_one_register() {
        let (result, _) = analyze_source("IN $1\nOUT $1\nHLT\n");
        let ir = result.ir.unwrap();
        assert_eq!(ir.instructions[0].opcode, Opcode::In);
        assert_eq!(ir.instructions[1].opcode, Opcode::Out);
    }
}
