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

//! SN/X: assembler, static analyzer and simulator for a minimal 16-bit
//! teaching architecture.
//!
//! The pipeline is tokenize -> parse -> semantic-analyze -> CFG -> dataflow,
//! orchestrated by [`compiler::compile_program`]. The encoder and the
//! simulator consume the validated IR independently of the analyses.

pub mod analyzer;
pub mod ast;
pub mod cfg;
pub mod checker;
pub mod compiler;
pub mod constants;
pub mod dataflow;
pub mod diagnostics;
pub mod encoding;
pub mod errors;
pub mod file_reader;
pub mod parser;
pub mod runner;
pub mod simulator;
pub mod tokenizer;
pub mod trace;
pub mod word;

use anyhow::{Context, Result};
use file_reader::FileReader;
use std::path::Path;

pub use cfg::{Cfg, build_cfg};
pub use checker::{CheckResult, check_program};
pub use compiler::{CompileOptions, CompileResult, compile_program, compile_with_options};
pub use dataflow::{DataflowResult, analyze_dataflow};
pub use diagnostics::{Diagnostic, DiagnosticCollector, Severity, SourceSpan};
pub use encoding::{decode_word, encode_instruction, encode_program, format_hex, format_intel_hex};
pub use errors::{EncodingError, SimulatorError};
pub use simulator::Simulator;
pub use word::{imm8, signed8, signed16, word};

/// Reads a source file through the given reader and compiles it with the
/// default options.
pub fn compile_file<F: FileReader>(path: &Path, reader: &F) -> Result<CompileResult> {
    let source = reader
        .read_to_string(path)
        .context("Failed during source reading stage")?;
    Ok(compile_program(&source))
}
