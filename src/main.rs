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

use anyhow::{Result, bail};
use clap::Parser as clap_parser;
use clap::{Subcommand, ValueEnum};
use snx::compiler::compile_program;
use snx::encoding::{encode_program, format_hex_default, format_intel_hex};
use snx::file_reader::{FileReader, SourceFileReader};
use snx::runner::{run_program_from_file, run_sample_program};
use std::path::PathBuf;
use std::process::exit;

#[derive(clap_parser)]
#[clap(version = "0.1.0", about = "SN/X assembler, static analyzer and simulator")]
struct Opts {
    /// SN/X assembly source file
    input: Option<PathBuf>,
    /// Emit machine code instead of running the program
    #[clap(long, value_enum)]
    emit: Option<EmitFormat>,
    /// Print diagnostics as JSON and stop
    #[clap(long)]
    json: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the built-in recursive Fibonacci sample program
    Sample,
}

#[derive(Clone, Copy, ValueEnum)]
enum EmitFormat {
    /// Plain hex dump, 8 words per line
    Hex,
    /// Intel-HEX records
    Ihex,
}

fn main() -> Result<()> {
    let opts: Opts = Opts::parse();

    if let Some(Commands::Sample) = &opts.command {
        exit(run_sample_program());
    }

    let Some(input) = &opts.input else {
        bail!("no input file given (try `snx program.snx` or `snx sample`)");
    };

    if opts.emit.is_none() && !opts.json {
        // default mode: analyze, then execute with a trace
        exit(run_program_from_file(input));
    }

    let source = SourceFileReader.read_to_string(input)?;
    let result = compile_program(&source);

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&result.diagnostics)?);
        if result.has_errors() {
            exit(1);
        }
        return Ok(());
    }

    println!("{}", result.format_diagnostics());
    if result.has_errors() {
        exit(1);
    }

    if let Some(format) = opts.emit {
        let Some(ir) = &result.ir else {
            bail!("compilation produced no IR");
        };
        let words = encode_program(ir)?;
        match format {
            EmitFormat::Hex => println!("{}", format_hex_default(&words)),
            EmitFormat::Ihex => println!("{}", format_intel_hex(&words)),
        }
    }

    Ok(())
}
