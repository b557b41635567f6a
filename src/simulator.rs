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

//! Deterministic IR executor.
//!
//! One instruction per [`Simulator::step`]. All register and memory writes go
//! through the 16-bit word mask. Out-of-bounds memory accesses never fail:
//! loads read 0, stores are dropped, and the OOB hook (if any) is told.
//!
//! Register 0 is a real, writable register. Only the *address-base*
//! computation substitutes 0 for its contents; do not "optimize" it into a
//! hardwired zero register, the sample program depends on the difference.

use crate::ast::{AddressOperand, IRProgram, InstructionIR, Opcode, Operand};
use crate::compiler::CompileResult;
use crate::constants::{DEFAULT_MEM_SIZE, DEFAULT_REG_COUNT};
use crate::errors::SimulatorError;
use crate::word::{signed8, signed16, word};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OobKind {
    Load,
    Store,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OobAccess {
    pub kind: OobKind,
    /// The effective address that fell outside memory.
    pub address: u16,
    pub pc: usize,
}

/// Snapshot handed to the trace hook after every executed instruction.
#[derive(Debug, Clone, Copy)]
pub struct TraceEvent<'a> {
    pub pc: usize,
    pub text: &'a str,
    pub regs: &'a [u16],
    pub reg_initialized: &'a [bool],
}

pub type InputFn = Box<dyn FnMut() -> u16>;
pub type OutputFn = Box<dyn FnMut(u16)>;
pub type OobFn = Box<dyn FnMut(&OobAccess)>;
pub type TraceFn = Box<dyn FnMut(&TraceEvent<'_>)>;

pub struct Simulator {
    regs: Vec<u16>,
    memory: Vec<u16>,
    reg_initialized: Vec<bool>,
    mem_initialized: Vec<bool>,
    pc: usize,
    running: bool,
    output: Vec<u16>,
    instructions: Vec<InstructionIR>,
    labels: BTreeMap<String, usize>,
    input_fn: Option<InputFn>,
    output_fn: Option<OutputFn>,
    oob_callback: Option<OobFn>,
    trace_callback: Option<TraceFn>,
}

impl Simulator {
    pub fn new(ir: &IRProgram) -> Simulator {
        Simulator::with_config(ir, DEFAULT_REG_COUNT, DEFAULT_MEM_SIZE)
    }

    pub fn with_config(ir: &IRProgram, reg_count: usize, mem_size: usize) -> Simulator {
        Simulator {
            regs: vec![0; reg_count],
            memory: vec![0; mem_size],
            reg_initialized: vec![false; reg_count],
            mem_initialized: vec![false; mem_size],
            pc: 0,
            running: true,
            output: Vec::new(),
            instructions: ir.instructions.clone(),
            labels: ir.labels.clone(),
            input_fn: None,
            output_fn: None,
            oob_callback: None,
            trace_callback: None,
        }
    }

    pub fn from_compile_result(result: &CompileResult) -> Result<Simulator, SimulatorError> {
        let ir = result.ir.as_ref().ok_or(SimulatorError::MissingIr)?;
        Ok(Simulator::with_config(
            ir,
            result.reg_count,
            DEFAULT_MEM_SIZE,
        ))
    }

    pub fn set_input_fn(&mut self, f: impl FnMut() -> u16 + 'static) {
        self.input_fn = Some(Box::new(f));
    }

    pub fn set_output_fn(&mut self, f: impl FnMut(u16) + 'static) {
        self.output_fn = Some(Box::new(f));
    }

    pub fn set_oob_callback(&mut self, f: impl FnMut(&OobAccess) + 'static) {
        self.oob_callback = Some(Box::new(f));
    }

    pub fn set_trace_callback(&mut self, f: impl FnMut(&TraceEvent<'_>) + 'static) {
        self.trace_callback = Some(Box::new(f));
    }

    pub fn regs(&self) -> &[u16] {
        &self.regs
    }

    pub fn memory(&self) -> &[u16] {
        &self.memory
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn output(&self) -> &[u16] {
        &self.output
    }

    pub fn reg_init_flags(&self) -> &[bool] {
        &self.reg_initialized
    }

    pub fn mem_init_flags(&self) -> &[bool] {
        &self.mem_initialized
    }

    /// Executes one instruction and returns the running flag.
    pub fn step(&mut self) -> bool {
        if !self.running || self.pc >= self.instructions.len() {
            self.running = false;
            return false;
        }

        let inst = self.instructions[self.pc].clone();
        let current_pc = self.pc;
        self.pc += 1;

        self.execute(&inst, current_pc);

        if let Some(mut cb) = self.trace_callback.take() {
            cb(&TraceEvent {
                pc: current_pc,
                text: &inst.text,
                regs: &self.regs,
                reg_initialized: &self.reg_initialized,
            });
            self.trace_callback = Some(cb);
        }

        self.running
    }

    pub fn run(&mut self, max_steps: Option<usize>) {
        let mut steps = 0;
        while self.running {
            if let Some(max) = max_steps {
                if steps >= max {
                    break;
                }
            }
            self.step();
            steps += 1;
        }
    }

    fn execute(&mut self, inst: &InstructionIR, current_pc: usize) {
        match inst.opcode {
            Opcode::Lda => {
                let dest = reg_index(&inst.operands[0]);
                let ea = self.effective_address(address(&inst.operands[1]));
                self.write_reg(dest, ea);
            }

            Opcode::Ld => {
                let dest = reg_index(&inst.operands[0]);
                let ea = self.effective_address(address(&inst.operands[1]));
                let value = self.load_word(ea, current_pc);
                self.write_reg(dest, value);
            }

            Opcode::St => {
                let src = reg_index(&inst.operands[0]);
                let ea = self.effective_address(address(&inst.operands[1]));
                let value = self.regs[src];
                self.store_word(ea, value, current_pc);
            }

            Opcode::Add => {
                let (dest, a, b) = self.three_reg(inst);
                self.write_reg(dest, word(a as i32 + b as i32));
            }

            Opcode::And => {
                let (dest, a, b) = self.three_reg(inst);
                self.write_reg(dest, a & b);
            }

            Opcode::Sub => {
                let (dest, a, b) = self.three_reg(inst);
                self.write_reg(dest, word(a as i32 - b as i32));
            }

            Opcode::Slt => {
                let (dest, a, b) = self.three_reg(inst);
                let flag = if signed16(a) < signed16(b) { 1 } else { 0 };
                self.write_reg(dest, flag);
            }

            Opcode::Not => {
                let dest = reg_index(&inst.operands[0]);
                let value = self.regs[reg_index(&inst.operands[1])];
                self.write_reg(dest, !value);
            }

            Opcode::Sr => {
                let dest = reg_index(&inst.operands[0]);
                let value = self.regs[reg_index(&inst.operands[1])];
                self.write_reg(dest, value >> 1);
            }

            Opcode::In => {
                let dest = reg_index(&inst.operands[0]);
                let value = match self.input_fn.as_mut() {
                    Some(f) => f(),
                    None => 0,
                };
                self.write_reg(dest, value);
            }

            Opcode::Out => {
                let value = self.regs[reg_index(&inst.operands[0])];
                self.output.push(value);
                if let Some(f) = self.output_fn.as_mut() {
                    f(value);
                }
            }

            Opcode::Bz => {
                let cond = self.regs[reg_index(&inst.operands[0])];
                if cond == 0 {
                    self.pc = self.label_target(&inst.operands[1]);
                }
            }

            Opcode::Bal => {
                let link = reg_index(&inst.operands[0]);
                let next_pc = self.pc;
                let target = match &inst.operands[1] {
                    Operand::LabelRef(_) => self.label_target(&inst.operands[1]),
                    Operand::Address(addr) => self.effective_address(addr) as usize,
                    _ => unreachable!("validated IR: BAL target is a label or address"),
                };
                self.write_reg(link, word(next_pc as i32));
                self.pc = target;
            }

            Opcode::Hlt => {
                self.running = false;
            }
        }
    }

    /// `EA <- off + (base == $0 ? 0 : Rb)`, truncated to the machine word.
    fn effective_address(&self, addr: &AddressOperand) -> u16 {
        let base = if addr.base.index == 0 {
            0
        } else {
            self.regs[addr.base.index] as i32
        };
        word(base + signed8(addr.offset))
    }

    fn load_word(&mut self, ea: u16, pc: usize) -> u16 {
        let index = ea as usize;
        if index < self.memory.len() {
            self.memory[index]
        } else {
            self.fire_oob(OobKind::Load, ea, pc);
            0
        }
    }

    fn store_word(&mut self, ea: u16, value: u16, pc: usize) {
        let index = ea as usize;
        if index < self.memory.len() {
            self.memory[index] = value;
            self.mem_initialized[index] = true;
        } else {
            self.fire_oob(OobKind::Store, ea, pc);
        }
    }

    fn write_reg(&mut self, index: usize, value: u16) {
        self.regs[index] = value;
        self.reg_initialized[index] = true;
    }

    fn three_reg(&self, inst: &InstructionIR) -> (usize, u16, u16) {
        let dest = reg_index(&inst.operands[0]);
        let a = self.regs[reg_index(&inst.operands[1])];
        let b = self.regs[reg_index(&inst.operands[2])];
        (dest, a, b)
    }

    fn label_target(&self, operand: &Operand) -> usize {
        match operand {
            Operand::LabelRef(label) => *self
                .labels
                .get(&label.name)
                .expect("validated IR resolves every label"),
            _ => unreachable!("validated IR: branch target is a label"),
        }
    }

    fn fire_oob(&mut self, kind: OobKind, address: u16, pc: usize) {
        if let Some(cb) = self.oob_callback.as_mut() {
            cb(&OobAccess { kind, address, pc });
        }
    }
}

fn reg_index(operand: &Operand) -> usize {
    match operand {
        Operand::Register(reg) => reg.index,
        _ => unreachable!("validated IR carries a register operand here"),
    }
}

fn address(operand: &Operand) -> &AddressOperand {
    match operand {
        Operand::Address(addr) => addr,
        _ => unreachable!("validated IR carries an address operand here"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::analyze;
    use crate::constants::DEFAULT_REG_COUNT;
    use crate::diagnostics::DiagnosticCollector;
    use crate::parser::parse;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn simulator(source: &str) -> Simulator {
        let mut diagnostics = DiagnosticCollector::new();
        let program = parse(source, &mut diagnostics);
        let result = analyze(program, &mut diagnostics, DEFAULT_REG_COUNT);
        let ir = result.ir.unwrap_or_else(|| {
            panic!("source failed to compile: {:?}", diagnostics.diagnostics())
        });
        Simulator::new(&ir)
    }

    #[test]
    fn test_lda_writes_effective_address() {
        let mut sim = simulator("main: LDA $1, 64($0)\nHLT\n");
        sim.run(None);
        assert_eq!(sim.regs()[1], 64);
        assert!(sim.reg_init_flags()[1]);
        assert!(!sim.running());
    }

    #[test]
    fn test_register_zero_is_writable_but_base_reads_zero() {
        let mut sim = simulator("main: LDA $0, 5($0)\nLDA $1, 3($0)\nHLT\n");
        sim.run(None);
        // $0 really holds 5...
        assert_eq!(sim.regs()[0], 5);
        assert!(sim.reg_init_flags()[0]);
        // ...but as an address base it still contributes 0
        assert_eq!(sim.regs()[1], 3);
    }

    #[test]
    fn test_store_and_load_round_trip() {
        let mut sim = simulator(
            "main: LDA $3, 64($0)\nLDA $1, 7($0)\nST $1, 0($3)\nLD $2, 0($3)\nHLT\n",
        );
        sim.run(None);
        assert_eq!(sim.regs()[2], 7);
        assert_eq!(sim.memory()[64], 7);
        assert!(sim.mem_init_flags()[64]);
    }

    #[test]
    fn test_arithmetic_is_word_masked() {
        let mut sim = simulator(
            "main: NOT $1, $0\nADD $2, $1, $1\nSUB $3, $0, $1\nHLT\n",
        );
        sim.run(None);
        assert_eq!(sim.regs()[1], 0xFFFF);
        assert_eq!(sim.regs()[2], 0xFFFE); // 0xFFFF + 0xFFFF wraps
        assert_eq!(sim.regs()[3], 0x0001); // 0 - (-1)
    }

    #[test]
    fn test_slt_compares_signed() {
        let mut sim = simulator("main: NOT $1, $0\nSLT $2, $1, $0\nHLT\n");
        sim.run(None);
        assert_eq!(sim.regs()[2], 1); // -1 < 0
    }

    #[test]
    fn test_sr_is_logical_shift() {
        let mut sim = simulator("main: NOT $1, $0\nSR $2, $1\nHLT\n");
        sim.run(None);
        assert_eq!(sim.regs()[2], 0x7FFF);
    }

    #[test]
    fn test_and_masks_bits() {
        let mut sim = simulator("main: LDA $1, 12($0)\nLDA $2, 10($0)\nAND $3, $1, $2\nHLT\n");
        sim.run(None);
        assert_eq!(sim.regs()[3], 8);
    }

    #[test]
    fn test_bz_taken_and_not_taken() {
        let mut sim = simulator(
            "main: LDA $1, 1($0)\nBZ $1, skip\nLDA $2, 7($0)\nskip: BZ $0, end\nLDA $2, 9($0)\nend: HLT\n",
        );
        // $0 starts at 0, so the second branch is taken; the first is not
        sim.run(None);
        assert_eq!(sim.regs()[2], 7);
    }

    #[test]
    fn test_bal_links_and_indirect_return() {
        let mut sim = simulator("main: BAL $2, sub\nHLT\nsub: BAL $0, 0($2)\n");
        sim.run(None);
        assert!(!sim.running());
        assert_eq!(sim.regs()[2], 1); // link to the instruction after the call
        assert_eq!(sim.regs()[0], 3); // link written by the indirect return
        assert_eq!(sim.pc(), 2); // halted right after the HLT at pc 1
    }

    #[test]
    fn test_oob_load_reads_zero_and_fires_hook() {
        let accesses = Rc::new(RefCell::new(Vec::new()));
        let seen = Rc::clone(&accesses);
        let mut sim = simulator("main: LDA $1, 1($0)\nLD $1, -1($0)\nHLT\n");
        sim.set_oob_callback(move |access| seen.borrow_mut().push(*access));
        sim.run(None);
        assert_eq!(sim.regs()[1], 0);
        let accesses = accesses.borrow();
        assert_eq!(accesses.len(), 1);
        assert_eq!(accesses[0].kind, OobKind::Load);
        assert_eq!(accesses[0].address, 0xFFFF);
        assert_eq!(accesses[0].pc, 1);
    }

    #[test]
    fn test_oob_store_is_dropped() {
        let count = Rc::new(RefCell::new(0));
        let seen = Rc::clone(&count);
        let mut sim = simulator("main: LDA $1, 5($0)\nST $1, -1($0)\nHLT\n");
        sim.set_oob_callback(move |access| {
            assert_eq!(access.kind, OobKind::Store);
            *seen.borrow_mut() += 1;
        });
        sim.run(None);
        assert_eq!(*count.borrow(), 1);
        // nothing landed in memory
        assert!(sim.mem_init_flags().iter().all(|flag| !flag));
    }

    #[test]
    fn test_in_uses_hook_and_defaults_to_zero() {
        let mut sim = simulator("main: IN $1\nIN $2\nHLT\n");
        let mut values = vec![42u16];
        sim.set_input_fn(move || values.pop().unwrap_or(0));
        sim.run(None);
        assert_eq!(sim.regs()[1], 42);
        assert_eq!(sim.regs()[2], 0);

        let mut plain = simulator("main: IN $1\nHLT\n");
        plain.run(None);
        assert_eq!(plain.regs()[1], 0);
        assert!(plain.reg_init_flags()[1]);
    }

    #[test]
    fn test_out_appends_and_calls_hook() {
        let sent = Rc::new(RefCell::new(Vec::new()));
        let seen = Rc::clone(&sent);
        let mut sim = simulator("main: LDA $1, 9($0)\nOUT $1\nOUT $1\nHLT\n");
        sim.set_output_fn(move |value| seen.borrow_mut().push(value));
        sim.run(None);
        assert_eq!(sim.output(), &[9, 9]);
        assert_eq!(*sent.borrow(), vec![9, 9]);
    }

    #[test]
    fn test_trace_fires_once_per_step() {
        let rows = Rc::new(RefCell::new(0));
        let seen = Rc::clone(&rows);
        let mut sim = simulator("main: LDA $1, 1($0)\nOUT $1\nHLT\n");
        sim.set_trace_callback(move |_event| *seen.borrow_mut() += 1);
        sim.run(None);
        assert_eq!(*rows.borrow(), 3);
    }

    #[test]
    fn test_max_steps_stops_infinite_program() {
        let mut sim = simulator("main: BZ $0, main\n");
        sim.run(Some(10));
        assert!(sim.running()); // still running, just paused
    }

    #[test]
    fn test_running_off_the_end_stops() {
        let mut sim = simulator("main: LDA $1, 1($0)\n");
        sim.run(None);
        assert!(!sim.running());
        assert_eq!(sim.regs()[1], 1);
    }

    #[test]
    fn test_determinism() {
        let source =
            "main: LDA $3, 64($0)\nLDA $1, 7($0)\nST $1, 0($3)\nLD $2, 0($3)\nOUT $2\nHLT\n";
        let mut first = simulator(source);
        first.run(None);
        let mut second = simulator(source);
        second.run(None);
        assert_eq!(first.regs(), second.regs());
        assert_eq!(first.memory(), second.memory());
        assert_eq!(first.output(), second.output());
    }
}
