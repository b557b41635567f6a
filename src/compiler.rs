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

//! Compile façade: tokenize, parse, analyze, then (optionally) run the
//! static checks, with every stage reporting into one diagnostic collector.
//! A stage that fails to produce its output stops the stages after it; the
//! diagnostics collected so far are always returned.

use crate::analyzer::analyze;
use crate::ast::{IRProgram, Program};
use crate::cfg::Cfg;
use crate::checker::check_program;
use crate::constants::DEFAULT_REG_COUNT;
use crate::dataflow::DataflowResult;
use crate::diagnostics::{Diagnostic, DiagnosticCollector, Severity};
use crate::parser::parse;

#[derive(Debug, Clone, Copy)]
pub struct CompileOptions {
    pub reg_count: usize,
    pub run_static_checks: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            reg_count: DEFAULT_REG_COUNT,
            run_static_checks: true,
        }
    }
}

#[derive(Debug)]
pub struct CompileResult {
    pub program: Option<Program>,
    pub ir: Option<IRProgram>,
    pub cfg: Option<Cfg>,
    pub dataflow: Option<DataflowResult>,
    pub diagnostics: Vec<Diagnostic>,
    pub reg_count: usize,
}

impl CompileResult {
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    pub fn has_warnings(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Warning)
    }

    pub fn format_diagnostics(&self) -> String {
        if self.diagnostics.is_empty() {
            return "No issues found.".to_string();
        }

        let errors: Vec<&Diagnostic> = self
            .diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .collect();
        let warnings: Vec<&Diagnostic> = self
            .diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .collect();

        let mut lines: Vec<String> = Vec::new();
        if !errors.is_empty() {
            lines.push(format!("=== {} Error(s) ===", errors.len()));
            for d in errors {
                lines.push(d.to_string());
            }
        }
        if !warnings.is_empty() {
            lines.push(format!("=== {} Warning(s) ===", warnings.len()));
            for d in warnings {
                lines.push(d.to_string());
            }
        }
        lines.join("\n")
    }
}

pub fn compile_program(source: &str) -> CompileResult {
    compile_with_options(source, &CompileOptions::default())
}

pub fn compile_with_options(source: &str, options: &CompileOptions) -> CompileResult {
    let mut diagnostics = DiagnosticCollector::new();

    let program = parse(source, &mut diagnostics);
    tracing::debug!(lines = program.lines.len(), "parse stage complete");

    let analysis = analyze(program, &mut diagnostics, options.reg_count);

    let mut cfg = None;
    let mut dataflow = None;
    if let Some(ir) = &analysis.ir {
        if options.run_static_checks {
            let check = check_program(&analysis.program, ir, &mut diagnostics, options.reg_count);
            tracing::debug!(
                blocks = check.cfg.blocks.len(),
                issues = check.dataflow.issues.len(),
                "static checks complete"
            );
            cfg = Some(check.cfg);
            dataflow = Some(check.dataflow);
        }
    }

    CompileResult {
        program: Some(analysis.program),
        ir: analysis.ir,
        cfg,
        dataflow,
        diagnostics: diagnostics.into_diagnostics(),
        reg_count: options.reg_count,
    }
}
