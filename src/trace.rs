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

//! Execution-trace table formatting. Registers that were never written
//! render as `*`.

pub fn format_trace_header(reg_count: usize) -> String {
    let reg_headers = (0..reg_count)
        .map(|i| format!("${i:<2}"))
        .collect::<Vec<_>>()
        .join(" | ");
    format!("| PC  | INST            | {reg_headers} |")
}

pub fn format_trace_separator(reg_count: usize) -> String {
    let reg_seps = vec!["---"; reg_count].join(" | ");
    format!("| --- | --------------- | {reg_seps} |")
}

pub fn format_trace_row(
    pc: usize,
    inst_text: &str,
    regs: &[u16],
    reg_initialized: &[bool],
) -> String {
    let reg_vals = regs
        .iter()
        .zip(reg_initialized.iter())
        .map(|(value, initialized)| {
            let display = if *initialized {
                value.to_string()
            } else {
                "*".to_string()
            };
            format!("{display:<3}")
        })
        .collect::<Vec<_>>()
        .join(" | ");
    format!("| {pc:<3} | {inst_text:<15} | {reg_vals} |")
}
