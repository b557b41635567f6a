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

//! Static checker: builds the CFG, reports control-flow problems (W001
//! unreachable code, C010 infinite loop) and projects dataflow issues back
//! onto source spans through the pc-to-line map.

use crate::ast::{IRProgram, Program};
use crate::cfg::{Cfg, build_cfg, find_infinite_loop_sccs, find_reachable_pcs};
use crate::dataflow::{DataflowResult, analyze_dataflow};
use crate::diagnostics::{DiagnosticCollector, Severity, SourceSpan};
use std::collections::{BTreeSet, HashMap, HashSet};

#[derive(Debug)]
pub struct CheckResult {
    pub cfg: Cfg,
    pub dataflow: DataflowResult,
}

pub fn check_program(
    program: &Program,
    ir: &IRProgram,
    diagnostics: &mut DiagnosticCollector,
    reg_count: usize,
) -> CheckResult {
    let mut checker = StaticChecker::new(program, diagnostics);

    let cfg = build_cfg(ir);
    checker.check_cfg_issues(&cfg);

    let dataflow = analyze_dataflow(ir, &cfg, reg_count);
    checker.check_dataflow_issues(&dataflow);

    CheckResult { cfg, dataflow }
}

struct StaticChecker<'a> {
    diagnostics: &'a mut DiagnosticCollector,
    pc_to_line: HashMap<usize, usize>,
    line_spans: HashMap<usize, SourceSpan>,
}

impl<'a> StaticChecker<'a> {
    fn new(program: &Program, diagnostics: &'a mut DiagnosticCollector) -> Self {
        let mut pc_to_line = HashMap::new();
        let mut line_spans = HashMap::new();
        let mut pc = 0;
        for line in &program.lines {
            if let Some(inst) = &line.instruction {
                pc_to_line.insert(pc, line.line_no);
                line_spans.insert(line.line_no, inst.span);
                pc += 1;
            }
        }
        StaticChecker {
            diagnostics,
            pc_to_line,
            line_spans,
        }
    }

    fn check_cfg_issues(&mut self, cfg: &Cfg) {
        let reachable = find_reachable_pcs(cfg, cfg.entry_pc);
        let all_pcs: BTreeSet<usize> = cfg
            .blocks
            .values()
            .flat_map(|b| b.instructions.iter().map(|inst| inst.pc))
            .collect();

        for &pc in all_pcs.difference(&reachable) {
            let Some(&line_no) = self.pc_to_line.get(&pc) else {
                continue;
            };
            let Some(&span) = self.line_spans.get(&line_no) else {
                continue;
            };
            let labels_at_pc = cfg.reverse_labels.get(&pc);
            match labels_at_pc {
                Some(labels) if !labels.is_empty() => {
                    self.diagnostics.add_warning(
                        "W001",
                        format!("Unreachable code at label '{}'", labels.join(", ")),
                        span,
                    );
                }
                _ => {
                    self.diagnostics
                        .add_warning("W001", "Unreachable code".to_string(), span);
                }
            }
        }

        let mut reported_lines: HashSet<usize> = HashSet::new();
        for scc in find_infinite_loop_sccs(cfg) {
            let Some(&min_pc) = scc.iter().next() else {
                continue;
            };
            let Some(&line_no) = self.pc_to_line.get(&min_pc) else {
                continue;
            };
            if !reported_lines.insert(line_no) {
                continue;
            }
            let Some(&span) = self.line_spans.get(&line_no) else {
                continue;
            };

            let labels_in_scc: BTreeSet<&str> = scc
                .iter()
                .filter_map(|pc| cfg.reverse_labels.get(pc))
                .flatten()
                .map(String::as_str)
                .collect();
            if labels_in_scc.is_empty() {
                self.diagnostics.add_error(
                    "C010",
                    "Infinite loop detected: no path to HLT".to_string(),
                    span,
                );
            } else {
                let label_str = labels_in_scc.into_iter().collect::<Vec<_>>().join(", ");
                self.diagnostics.add_error(
                    "C010",
                    format!("Infinite loop detected: no path to HLT from '{label_str}'"),
                    span,
                );
            }
        }
    }

    fn check_dataflow_issues(&mut self, dataflow: &DataflowResult) {
        for issue in &dataflow.issues {
            let Some(&line_no) = self.pc_to_line.get(&issue.pc) else {
                continue;
            };
            let span = self
                .line_spans
                .get(&line_no)
                .copied()
                .unwrap_or_else(|| SourceSpan::new(line_no, 1, line_no, 1));

            match issue.severity {
                Severity::Error => {
                    self.diagnostics
                        .add_error(&issue.code, issue.message.clone(), span);
                }
                _ => {
                    self.diagnostics
                        .add_warning(&issue.code, issue.message.clone(), span);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::analyze;
    use crate::constants::DEFAULT_REG_COUNT;
    use crate::parser::parse;

    fn check(source: &str) -> (CheckResult, DiagnosticCollector) {
        let mut diagnostics = DiagnosticCollector::new();
        let program = parse(source, &mut diagnostics);
        let result = analyze(program, &mut diagnostics, DEFAULT_REG_COUNT);
        let ir = result.ir.unwrap_or_else(|| {
            panic!("source failed to compile: {:?}", diagnostics.diagnostics())
        });
        let check_result = check_program(&result.program, &ir, &mut diagnostics, DEFAULT_REG_COUNT);
        (check_result, diagnostics)
    }

    fn codes(collector: &DiagnosticCollector) -> Vec<String> {
        collector
            .diagnostics()
            .iter()
            .map(|d| d.code.clone())
            .collect()
    }

    #[test]
    fn test_unreachable_code_warns_w001() {
        let (_, diagnostics) = check("main: HLT\nOUT $0\n");
        assert_eq!(codes(&diagnostics), vec!["W001"]);
        let diag = &diagnostics.diagnostics()[0];
        assert_eq!(diag.severity, Severity::Warning);
        assert_eq!(diag.span.start_line, 2);
    }

    #[test]
    fn test_unreachable_label_named_in_message() {
        let (_, diagnostics) = check("main: HLT\ndead: OUT $0\n");
        let diag = &diagnostics.diagnostics()[0];
        assert_eq!(diag.code, "W001");
        assert!(diag.message.contains("'DEAD'"), "message: {}", diag.message);
    }

    #[test]
    fn test_infinite_loop_reports_c010_once() {
        let (_, diagnostics) = check("main:\n    LDA $0, 0($0)\n    BZ $0, main\n");
        assert_eq!(codes(&diagnostics), vec!["C010"]);
        let diag = &diagnostics.diagnostics()[0];
        assert_eq!(diag.severity, Severity::Error);
        assert_eq!(diag.span.start_line, 2); // lowest PC of the component
        assert!(diag.message.contains("'MAIN'"));
    }

    #[test]
    fn test_dataflow_issue_projected_to_source_line() {
        let (_, diagnostics) = check("main:\n    LDA $3, 64($0)\n    LD $1, 0($3)\n    HLT\n");
        assert_eq!(codes(&diagnostics), vec!["D001"]);
        assert_eq!(diagnostics.diagnostics()[0].span.start_line, 3);
        assert!(diagnostics.has_errors());
    }

    #[test]
    fn test_clean_program_has_no_check_diagnostics() {
        let (check_result, diagnostics) = check(
            "main:\n    LDA $1, 3($0)\n    OUT $1\n    HLT\n",
        );
        assert!(codes(&diagnostics).is_empty());
        assert_eq!(check_result.cfg.entry_pc, 0);
        assert!(check_result.dataflow.issues.is_empty());
    }

    #[test]
    fn test_indirect_return_leaves_hlt_unreachable() {
        // the RETURN edge is unresolved statically, so the HLT after it is
        // reported unreachable; the C002 is the real finding
        let (_, diagnostics) = check("main:\n    LDA $2, 5($0)\n    BAL $2, 0($2)\n    HLT\n");
        let all = codes(&diagnostics);
        assert!(all.contains(&"C002".to_string()));
        assert!(all.contains(&"W001".to_string()));
    }
}
