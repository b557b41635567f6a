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

//! Forward abstract interpretation over the value-state lattice
//! `UNINIT < {DATA, RETURN_ADDR} < UNKNOWN`, with stack-slot tracking keyed
//! off the stack-pointer register and join-over-all-predecessors.
//!
//! The fixpoint runs a FIFO worklist with two safety clamps: a per-PC visit
//! cap and a global pop budget. Neither should trigger on well-formed
//! programs; both exist because the `sp_offset` join (`max`) is not monotonic
//! for every input.

use crate::ast::{AddressOperand, IRProgram, InstructionIR, Opcode, Operand};
use crate::cfg::{Cfg, EdgeTarget, build_cfg};
use crate::constants::{
    ITERATION_BUDGET_FACTOR, MAX_VISITS_PER_PC, STACK_POINTER_REG, STATIC_SEGMENT_BASE,
};
use crate::diagnostics::Severity;
use crate::word::signed8;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueState {
    Uninit,
    Data,
    ReturnAddr,
    Unknown,
}

impl ValueState {
    /// Lattice join: equal values keep themselves, everything else loses
    /// precision.
    pub fn join(self, other: ValueState) -> ValueState {
        if self == other { self } else { ValueState::Unknown }
    }
}

/// Per-PC snapshot. Registers or slots without an entry are UNINIT.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AbstractState {
    pub registers: BTreeMap<usize, ValueState>,
    pub stack_slots: BTreeMap<i32, ValueState>,
    pub sp_offset: i32,
}

impl AbstractState {
    pub fn register(&self, index: usize) -> ValueState {
        self.registers
            .get(&index)
            .copied()
            .unwrap_or(ValueState::Uninit)
    }

    pub fn stack_slot(&self, key: i32) -> ValueState {
        self.stack_slots
            .get(&key)
            .copied()
            .unwrap_or(ValueState::Uninit)
    }

    pub fn join(&self, other: &AbstractState) -> AbstractState {
        let mut result = AbstractState::default();

        let reg_keys: BTreeSet<usize> = self
            .registers
            .keys()
            .chain(other.registers.keys())
            .copied()
            .collect();
        for key in reg_keys {
            result
                .registers
                .insert(key, self.register(key).join(other.register(key)));
        }

        let slot_keys: BTreeSet<i32> = self
            .stack_slots
            .keys()
            .chain(other.stack_slots.keys())
            .copied()
            .collect();
        for key in slot_keys {
            result
                .stack_slots
                .insert(key, self.stack_slot(key).join(other.stack_slot(key)));
        }

        // conservative for stack-depth growth
        result.sp_offset = self.sp_offset.max(other.sp_offset);
        result
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataflowIssue {
    pub pc: usize,
    pub code: String,
    pub message: String,
    pub severity: Severity,
    pub instruction_text: String,
}

#[derive(Debug, Clone, Default)]
pub struct DataflowResult {
    /// Raw issue list in generation order; the fixpoint may produce the same
    /// (pc, code) more than once.
    pub issues: Vec<DataflowIssue>,
    pub states_at_pc: BTreeMap<usize, AbstractState>,
    pub unreachable_pcs: BTreeSet<usize>,
}

impl DataflowResult {
    /// Deduplicated view for display: first occurrence of each (pc, code).
    pub fn unique_issues(&self) -> Vec<&DataflowIssue> {
        let mut seen: BTreeSet<(usize, &str)> = BTreeSet::new();
        self.issues
            .iter()
            .filter(|issue| seen.insert((issue.pc, issue.code.as_str())))
            .collect()
    }
}

pub fn analyze_dataflow(ir: &IRProgram, cfg: &Cfg, reg_count: usize) -> DataflowResult {
    DataflowAnalyzer::new(ir, cfg, reg_count).analyze()
}

/// Convenience entry point that builds the CFG itself.
pub fn analyze_dataflow_standalone(ir: &IRProgram, reg_count: usize) -> DataflowResult {
    let cfg = build_cfg(ir);
    analyze_dataflow(ir, &cfg, reg_count)
}

struct DataflowAnalyzer<'a> {
    cfg: &'a Cfg,
    reg_count: usize,
    issues: Vec<DataflowIssue>,
    states: BTreeMap<usize, AbstractState>,
    inst_by_pc: HashMap<usize, &'a InstructionIR>,
    instruction_count: usize,
}

impl<'a> DataflowAnalyzer<'a> {
    fn new(ir: &'a IRProgram, cfg: &'a Cfg, reg_count: usize) -> Self {
        DataflowAnalyzer {
            cfg,
            reg_count,
            issues: Vec::new(),
            states: BTreeMap::new(),
            inst_by_pc: ir.instructions.iter().map(|inst| (inst.pc, inst)).collect(),
            instruction_count: ir.instructions.len(),
        }
    }

    fn analyze(mut self) -> DataflowResult {
        if self.instruction_count == 0 {
            return DataflowResult::default();
        }

        // Entry state: register 0 holds the constant-zero data value, every
        // other register is uninitialized, the stack is empty.
        let mut entry_state = AbstractState::default();
        entry_state.registers.insert(0, ValueState::Data);
        for reg in 1..self.reg_count {
            entry_state.registers.insert(reg, ValueState::Uninit);
        }

        let entry_pc = self.cfg.entry_pc;
        self.states.insert(entry_pc, entry_state);

        let mut worklist: VecDeque<usize> = VecDeque::new();
        worklist.push_back(entry_pc);
        let mut visit_count: HashMap<usize, usize> = HashMap::new();
        let mut budget = self.instruction_count * ITERATION_BUDGET_FACTOR;

        while budget > 0 {
            let Some(pc) = worklist.pop_front() else {
                break;
            };
            budget -= 1;

            let Some(inst) = self.inst_by_pc.get(&pc).copied() else {
                continue;
            };

            let visits = visit_count.entry(pc).or_insert(0);
            *visits += 1;
            if *visits > MAX_VISITS_PER_PC {
                tracing::debug!(pc, "dataflow visit cap reached, dropping revisit");
                continue;
            }

            let in_state = self.states.get(&pc).cloned().unwrap_or_default();
            let (out_state, successors) = self.transfer(inst, &in_state);

            for succ in successors {
                let EdgeTarget::Pc(succ_pc) = succ else {
                    continue;
                };
                match self.states.get(&succ_pc) {
                    Some(existing) => {
                        let merged = existing.join(&out_state);
                        if &merged != existing {
                            self.states.insert(succ_pc, merged);
                            if !worklist.contains(&succ_pc) {
                                worklist.push_back(succ_pc);
                            }
                        }
                    }
                    None => {
                        self.states.insert(succ_pc, out_state.clone());
                        if !worklist.contains(&succ_pc) {
                            worklist.push_back(succ_pc);
                        }
                    }
                }
            }
        }
        if budget == 0 {
            tracing::debug!("dataflow iteration budget exhausted");
        }

        let all_pcs: BTreeSet<usize> = self.inst_by_pc.keys().copied().collect();
        let reached: BTreeSet<usize> = self.states.keys().copied().collect();
        let unreachable_pcs = all_pcs.difference(&reached).copied().collect();

        DataflowResult {
            issues: self.issues,
            states_at_pc: self.states,
            unreachable_pcs,
        }
    }

    /// Applies one instruction to the state and yields its successors.
    fn transfer(
        &mut self,
        inst: &InstructionIR,
        in_state: &AbstractState,
    ) -> (AbstractState, Vec<EdgeTarget>) {
        let mut out_state = in_state.clone();
        let mut successors: Vec<EdgeTarget> = Vec::new();
        let pc = inst.pc;

        match inst.opcode {
            Opcode::Lda => {
                if let (Some(Operand::Register(dest)), Some(addr)) =
                    (inst.operands.first(), inst.operands.get(1))
                {
                    out_state.registers.insert(dest.index, ValueState::Data);
                    if dest.index == STACK_POINTER_REG {
                        if let Operand::Address(addr) = addr {
                            if addr.base.index == STACK_POINTER_REG {
                                out_state.sp_offset += signed8(addr.offset);
                            }
                        }
                    }
                }
                successors.push(EdgeTarget::Pc(pc + 1));
            }

            Opcode::Ld => {
                if let (Some(Operand::Register(dest)), Some(Operand::Address(addr))) =
                    (inst.operands.first(), inst.operands.get(1))
                {
                    match stack_slot_key(addr, in_state) {
                        Some(slot_key) => match in_state.stack_slot(slot_key) {
                            ValueState::Uninit => {
                                self.issues.push(DataflowIssue {
                                    pc,
                                    code: "D001".to_string(),
                                    message: format!(
                                        "Reading from uninitialized memory at {}",
                                        addr.text
                                    ),
                                    severity: Severity::Error,
                                    instruction_text: inst.text.clone(),
                                });
                                out_state.registers.insert(dest.index, ValueState::Unknown);
                            }
                            ValueState::Unknown => {
                                self.issues.push(DataflowIssue {
                                    pc,
                                    code: "D002".to_string(),
                                    message: format!(
                                        "Reading from potentially uninitialized memory at {}",
                                        addr.text
                                    ),
                                    severity: Severity::Warning,
                                    instruction_text: inst.text.clone(),
                                });
                                out_state.registers.insert(dest.index, ValueState::Unknown);
                            }
                            state => {
                                out_state.registers.insert(dest.index, state);
                            }
                        },
                        None => {
                            // untrackable address: no issue, but the loaded
                            // value is anyone's guess
                            out_state.registers.insert(dest.index, ValueState::Unknown);
                        }
                    }
                }
                successors.push(EdgeTarget::Pc(pc + 1));
            }

            Opcode::St => {
                if let (Some(Operand::Register(src)), Some(Operand::Address(addr))) =
                    (inst.operands.first(), inst.operands.get(1))
                {
                    if let Some(slot_key) = stack_slot_key(addr, in_state) {
                        out_state
                            .stack_slots
                            .insert(slot_key, in_state.register(src.index));
                    }
                }
                successors.push(EdgeTarget::Pc(pc + 1));
            }

            Opcode::Add | Opcode::And | Opcode::Sub | Opcode::Slt => {
                if let Some(Operand::Register(dest)) = inst.operands.first() {
                    out_state.registers.insert(dest.index, ValueState::Data);
                }
                successors.push(EdgeTarget::Pc(pc + 1));
            }

            Opcode::Not | Opcode::Sr => {
                if let Some(Operand::Register(dest)) = inst.operands.first() {
                    out_state.registers.insert(dest.index, ValueState::Data);
                }
                successors.push(EdgeTarget::Pc(pc + 1));
            }

            Opcode::In => {
                if let Some(Operand::Register(dest)) = inst.operands.first() {
                    out_state.registers.insert(dest.index, ValueState::Data);
                }
                successors.push(EdgeTarget::Pc(pc + 1));
            }

            Opcode::Out => {
                successors.push(EdgeTarget::Pc(pc + 1));
            }

            Opcode::Bz => {
                if let Some(Operand::LabelRef(label)) = inst.operands.get(1) {
                    if let Some(&target) = self.cfg.labels.get(&label.name) {
                        successors.push(EdgeTarget::Pc(target));
                    }
                }
                successors.push(EdgeTarget::Pc(pc + 1));
            }

            Opcode::Bal => {
                if let Some(Operand::Register(link)) = inst.operands.first() {
                    out_state
                        .registers
                        .insert(link.index, ValueState::ReturnAddr);
                }

                match inst.operands.get(1) {
                    Some(Operand::LabelRef(label)) => {
                        // call-return approximation: the call target and the
                        // fall-through continuation are both explored
                        if let Some(&target) = self.cfg.labels.get(&label.name) {
                            successors.push(EdgeTarget::Pc(target));
                            successors.push(EdgeTarget::Pc(pc + 1));
                        }
                    }
                    Some(Operand::Address(addr)) => {
                        // the pre-instruction state decides what the return
                        // register held, even when it doubles as link register
                        match in_state.register(addr.base.index) {
                            ValueState::Uninit => self.issues.push(DataflowIssue {
                                pc,
                                code: "C001".to_string(),
                                message: format!(
                                    "Return jump using uninitialized register ${}",
                                    addr.base.index
                                ),
                                severity: Severity::Error,
                                instruction_text: inst.text.clone(),
                            }),
                            ValueState::Data => self.issues.push(DataflowIssue {
                                pc,
                                code: "C002".to_string(),
                                message: format!(
                                    "Return jump using data value in ${} instead of return address",
                                    addr.base.index
                                ),
                                severity: Severity::Error,
                                instruction_text: inst.text.clone(),
                            }),
                            ValueState::Unknown => self.issues.push(DataflowIssue {
                                pc,
                                code: "C003".to_string(),
                                message: format!(
                                    "Return jump using potentially invalid return address in ${}",
                                    addr.base.index
                                ),
                                severity: Severity::Warning,
                                instruction_text: inst.text.clone(),
                            }),
                            ValueState::ReturnAddr => {}
                        }
                        successors.push(EdgeTarget::Indirect);
                    }
                    _ => {}
                }
            }

            Opcode::Hlt => {}
        }

        (out_state, successors)
    }
}

/// Slot key for an address operand: stack-pointer relative, static segment
/// (base register 0), or untrackable.
fn stack_slot_key(addr: &AddressOperand, state: &AbstractState) -> Option<i32> {
    let offset = signed8(addr.offset);
    if addr.base.index == STACK_POINTER_REG {
        Some(state.sp_offset + offset)
    } else if addr.base.index == 0 {
        Some(STATIC_SEGMENT_BASE + offset)
    } else {
        None
    }
}
