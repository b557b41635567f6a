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

//! Analyze-then-run drivers: print the static analysis report, then the
//! execution trace, and return a process exit code.

use crate::compiler::compile_program;
use crate::file_reader::{FileReader, SourceFileReader};
use crate::simulator::Simulator;
use crate::trace::{format_trace_header, format_trace_row, format_trace_separator};
use std::path::Path;

/// Recursive Fibonacci via BAL call and indirect-BAL return. The frame lives
/// on the `$3` stack: slot 0 holds the return address, slot 1 the argument.
/// With n = 4 the program halts with 3 in `$1`.
pub const SAMPLE_PROGRAM: &str = "
main:
    LDA $3, 64($0)  ; initialize the stack pointer
    LDA $1, 4($0)   ; argument n = 4
    BAL $2, fib     ; call fib
    HLT
fib:
    LDA $3, -2($3)  ; open a two-slot frame
    ST  $2, 0($3)   ; save return address
    ST  $1, 1($3)   ; save n
    LDA $0, 2($0)   ; constant 2
    SLT $0, $1, $0  ; n < 2 ?
    BZ  $0, recurse
base:
    LD  $2, 0($3)   ; base case returns n itself
    LDA $3, 2($3)
    BAL $2, 0($2)   ; return via saved address
recurse:
    LDA $1, -1($1)
    BAL $2, fib     ; fib(n-1)
    LDA $3, -1($3)
    ST  $1, 0($3)   ; push fib(n-1)
    LD  $1, 2($3)   ; restore n
    LDA $1, -2($1)
    BAL $2, fib     ; fib(n-2)
    LD  $2, 0($3)   ; pop fib(n-1)
    LDA $3, 1($3)
    ADD $1, $1, $2  ; fib(n-2) + fib(n-1)
    BAL $0, base    ; jump to the shared epilogue
";

pub fn run_program_from_source(source: &str) -> i32 {
    let result = compile_program(source);

    println!("=== Static Analysis Result ===");
    println!("{}", result.format_diagnostics());
    println!();

    if result.has_errors() {
        println!("Build failed due to errors above.");
        return 1;
    }

    if result.has_warnings() {
        println!("Build succeeded with warnings.");
        println!();
    }

    let mut sim = match Simulator::from_compile_result(&result) {
        Ok(sim) => sim,
        Err(err) => {
            println!("{err}");
            return 1;
        }
    };
    sim.set_trace_callback(|event| {
        println!(
            "{}",
            format_trace_row(event.pc, event.text, event.regs, event.reg_initialized)
        );
    });

    println!("=== Execution Trace ===");
    println!("{}", format_trace_header(result.reg_count));
    println!("{}", format_trace_separator(result.reg_count));

    sim.run(None);

    println!();
    println!("=== Execution completed successfully ===");
    0
}

pub fn run_program_from_file(path: &Path) -> i32 {
    match SourceFileReader.read_to_string(path) {
        Ok(source) => run_program_from_source(&source),
        Err(err) => {
            eprintln!("error: {err:#}");
            1
        }
    }
}

pub fn run_sample_program() -> i32 {
    run_program_from_source(SAMPLE_PROGRAM)
}
