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

//! Control-flow graph construction over the IR, plus the graph algorithms the
//! static checker needs: forward reachability, strongly connected components
//! (Tarjan, ascending-PC iteration for deterministic output) and
//! infinite-loop detection.

use crate::ast::{IRProgram, InstructionIR, Opcode, Operand};
use crate::constants::ENTRY_LABEL;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    Fallthrough,
    BranchTaken,
    BranchNotTaken,
    Call,
    Return,
    Unconditional,
}

/// Target of a CFG edge. Indirect jumps (BAL through an address operand)
/// cannot be resolved statically and carry no PC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeTarget {
    Pc(usize),
    Indirect,
}

impl EdgeTarget {
    pub fn pc(&self) -> Option<usize> {
        match self {
            EdgeTarget::Pc(pc) => Some(*pc),
            EdgeTarget::Indirect => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CfgEdge {
    pub source: usize,
    pub target: EdgeTarget,
    pub kind: EdgeKind,
}

#[derive(Debug, Clone, Default)]
pub struct BasicBlock {
    pub start_pc: usize,
    /// Inclusive.
    pub end_pc: usize,
    pub instructions: Vec<InstructionIR>,
    pub successors: Vec<usize>,
    pub predecessors: Vec<usize>,
    pub is_entry: bool,
    pub is_exit: bool,
    /// Labels pinned at `start_pc`.
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Cfg {
    /// Blocks keyed by start PC, ascending.
    pub blocks: BTreeMap<usize, BasicBlock>,
    pub edges: Vec<CfgEdge>,
    pub entry_pc: usize,
    pub exit_pcs: BTreeSet<usize>,
    pub labels: BTreeMap<String, usize>,
    pub reverse_labels: BTreeMap<usize, Vec<String>>,
}

impl Cfg {
    pub fn block_at(&self, pc: usize) -> Option<&BasicBlock> {
        self.blocks
            .values()
            .find(|b| b.start_pc <= pc && pc <= b.end_pc)
    }

    pub fn successors_of(&self, pc: usize) -> Vec<EdgeTarget> {
        self.edges
            .iter()
            .filter(|e| e.source == pc)
            .map(|e| e.target)
            .collect()
    }

    pub fn predecessors_of(&self, pc: usize) -> Vec<usize> {
        self.edges
            .iter()
            .filter(|e| e.target == EdgeTarget::Pc(pc))
            .map(|e| e.source)
            .collect()
    }
}

pub fn build_cfg(ir: &IRProgram) -> Cfg {
    let instructions = &ir.instructions;
    let labels = ir.labels.clone();

    let mut reverse_labels: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    for (name, &pc) in &labels {
        reverse_labels.entry(pc).or_default().push(name.clone());
    }

    if instructions.is_empty() {
        return Cfg {
            labels,
            reverse_labels,
            ..Cfg::default()
        };
    }

    let len = instructions.len();

    // Block boundaries: PC 0, every in-range label target, every branch/call
    // target, and the PC after each terminator.
    let mut block_starts: BTreeSet<usize> = BTreeSet::new();
    block_starts.insert(0);
    for inst in instructions {
        match inst.opcode {
            Opcode::Bz | Opcode::Bal => {
                if let Some(Operand::LabelRef(label)) = inst.operands.get(1) {
                    if let Some(&target) = labels.get(&label.name) {
                        block_starts.insert(target);
                    }
                }
                block_starts.insert(inst.pc + 1);
            }
            Opcode::Hlt => {
                if inst.pc + 1 < len {
                    block_starts.insert(inst.pc + 1);
                }
            }
            _ => {}
        }
    }
    for &pc in labels.values() {
        if pc < len {
            block_starts.insert(pc);
        }
    }

    let starts: Vec<usize> = block_starts.into_iter().filter(|&pc| pc < len).collect();

    let mut blocks: BTreeMap<usize, BasicBlock> = BTreeMap::new();
    for (i, &start_pc) in starts.iter().enumerate() {
        let end_pc = match starts.get(i + 1) {
            Some(&next) => next - 1,
            None => len - 1,
        };
        blocks.insert(
            start_pc,
            BasicBlock {
                start_pc,
                end_pc,
                instructions: instructions[start_pc..=end_pc].to_vec(),
                successors: Vec::new(),
                predecessors: Vec::new(),
                is_entry: false,
                is_exit: false,
                labels: reverse_labels.get(&start_pc).cloned().unwrap_or_default(),
            },
        );
    }

    // Edges come from each block's last instruction.
    let mut edges: Vec<CfgEdge> = Vec::new();
    let mut exit_pcs: BTreeSet<usize> = BTreeSet::new();
    for block in blocks.values() {
        let Some(last) = block.instructions.last() else {
            continue;
        };
        let last_pc = last.pc;
        match last.opcode {
            Opcode::Hlt => {
                exit_pcs.insert(last_pc);
            }
            Opcode::Bz => {
                if let Some(Operand::LabelRef(label)) = last.operands.get(1) {
                    if let Some(&target) = labels.get(&label.name) {
                        edges.push(CfgEdge {
                            source: last_pc,
                            target: EdgeTarget::Pc(target),
                            kind: EdgeKind::BranchTaken,
                        });
                    }
                }
                if last_pc + 1 < len {
                    edges.push(CfgEdge {
                        source: last_pc,
                        target: EdgeTarget::Pc(last_pc + 1),
                        kind: EdgeKind::BranchNotTaken,
                    });
                }
            }
            Opcode::Bal => match last.operands.get(1) {
                Some(Operand::LabelRef(label)) => {
                    if let Some(&target) = labels.get(&label.name) {
                        edges.push(CfgEdge {
                            source: last_pc,
                            target: EdgeTarget::Pc(target),
                            kind: EdgeKind::Call,
                        });
                    }
                    if last_pc + 1 < len {
                        edges.push(CfgEdge {
                            source: last_pc,
                            target: EdgeTarget::Pc(last_pc + 1),
                            kind: EdgeKind::Fallthrough,
                        });
                    }
                }
                Some(Operand::Address(_)) => {
                    edges.push(CfgEdge {
                        source: last_pc,
                        target: EdgeTarget::Indirect,
                        kind: EdgeKind::Return,
                    });
                }
                _ => {}
            },
            _ => {
                if last_pc + 1 < len {
                    edges.push(CfgEdge {
                        source: last_pc,
                        target: EdgeTarget::Pc(last_pc + 1),
                        kind: EdgeKind::Fallthrough,
                    });
                }
            }
        }
    }

    for block in blocks.values_mut() {
        if let Some(last) = block.instructions.last() {
            if exit_pcs.contains(&last.pc) {
                block.is_exit = true;
            }
        }
    }

    // Predecessor and successor lists, derived from the resolved edges.
    let ranges: Vec<(usize, usize)> = blocks.values().map(|b| (b.start_pc, b.end_pc)).collect();
    for edge in &edges {
        let Some(target) = edge.target.pc() else {
            continue;
        };
        if let Some(block) = blocks.get_mut(&target) {
            block.predecessors.push(edge.source);
        }
        let source_start = ranges
            .iter()
            .find(|&&(start, end)| start <= edge.source && edge.source <= end)
            .map(|&(start, _)| start);
        if let Some(start) = source_start {
            if let Some(block) = blocks.get_mut(&start) {
                if !block.successors.contains(&target) {
                    block.successors.push(target);
                }
            }
        }
    }

    let entry_pc = labels.get(ENTRY_LABEL).copied().unwrap_or(0);
    if let Some(block) = blocks.get_mut(&entry_pc) {
        block.is_entry = true;
    }

    Cfg {
        blocks,
        edges,
        entry_pc,
        exit_pcs,
        labels,
        reverse_labels,
    }
}

/// Forward closure from `start_pc` over resolved edges, expanding through
/// whole blocks.
pub fn find_reachable_pcs(cfg: &Cfg, start_pc: usize) -> BTreeSet<usize> {
    let mut reachable: BTreeSet<usize> = BTreeSet::new();
    let mut worklist = vec![start_pc];

    while let Some(pc) = worklist.pop() {
        if reachable.contains(&pc) {
            continue;
        }
        reachable.insert(pc);

        if let Some(block) = cfg.block_at(pc) {
            for block_pc in block.start_pc..=block.end_pc {
                reachable.insert(block_pc);
            }
            for &succ in &block.successors {
                if !reachable.contains(&succ) {
                    worklist.push(succ);
                }
            }
        }
    }

    reachable
}

/// Instruction-level successor map: resolved CFG edges plus the implicit
/// fall-through between consecutive instructions of a block. The SCC
/// algorithms need the intra-block edges so that a loop spanning a
/// multi-instruction block still closes into one component.
fn instruction_successors(cfg: &Cfg) -> HashMap<usize, Vec<usize>> {
    let mut successors: HashMap<usize, Vec<usize>> = HashMap::new();
    for block in cfg.blocks.values() {
        for pc in block.start_pc..block.end_pc {
            successors.entry(pc).or_default().push(pc + 1);
        }
    }
    for edge in &cfg.edges {
        if let EdgeTarget::Pc(target) = edge.target {
            successors.entry(edge.source).or_default().push(target);
        }
    }
    successors
}

/// Tarjan's algorithm. PCs are visited in ascending order so the component
/// list is deterministic.
pub fn find_strongly_connected_components(cfg: &Cfg) -> Vec<BTreeSet<usize>> {
    let mut all_pcs: Vec<usize> = cfg
        .blocks
        .values()
        .flat_map(|b| b.instructions.iter().map(|inst| inst.pc))
        .collect();
    all_pcs.sort_unstable();

    let mut tarjan = Tarjan {
        successors: instruction_successors(cfg),
        index_counter: 0,
        stack: Vec::new(),
        indices: HashMap::new(),
        lowlinks: HashMap::new(),
        on_stack: HashSet::new(),
        sccs: Vec::new(),
    };
    for pc in all_pcs {
        if !tarjan.indices.contains_key(&pc) {
            tarjan.strongconnect(pc);
        }
    }
    tarjan.sccs
}

struct Tarjan {
    successors: HashMap<usize, Vec<usize>>,
    index_counter: usize,
    stack: Vec<usize>,
    indices: HashMap<usize, usize>,
    lowlinks: HashMap<usize, usize>,
    on_stack: HashSet<usize>,
    sccs: Vec<BTreeSet<usize>>,
}

impl Tarjan {
    fn strongconnect(&mut self, v: usize) {
        self.indices.insert(v, self.index_counter);
        self.lowlinks.insert(v, self.index_counter);
        self.index_counter += 1;
        self.stack.push(v);
        self.on_stack.insert(v);

        let succs = self.successors.get(&v).cloned().unwrap_or_default();
        for w in succs {
            if !self.indices.contains_key(&w) {
                self.strongconnect(w);
                let low = self.lowlinks[&v].min(self.lowlinks[&w]);
                self.lowlinks.insert(v, low);
            } else if self.on_stack.contains(&w) {
                let low = self.lowlinks[&v].min(self.indices[&w]);
                self.lowlinks.insert(v, low);
            }
        }

        if self.lowlinks[&v] == self.indices[&v] {
            let mut scc = BTreeSet::new();
            loop {
                let w = self.stack.pop().expect("component root is on the stack");
                self.on_stack.remove(&w);
                scc.insert(w);
                if w == v {
                    break;
                }
            }
            self.sccs.push(scc);
        }
    }
}

/// An SCC is an infinite loop iff it contains no exit PC and no edge leaves
/// it. Single-node components count only with a real self-loop.
pub fn find_infinite_loop_sccs(cfg: &Cfg) -> Vec<BTreeSet<usize>> {
    let successors = instruction_successors(cfg);
    let mut infinite: Vec<BTreeSet<usize>> = Vec::new();

    for scc in find_strongly_connected_components(cfg) {
        if scc.len() <= 1 {
            let Some(&pc) = scc.iter().next() else {
                continue;
            };
            let has_self_loop = cfg
                .edges
                .iter()
                .any(|e| e.source == pc && e.target == EdgeTarget::Pc(pc));
            if !has_self_loop {
                continue;
            }
        }

        let has_exit = scc.iter().any(|pc| cfg.exit_pcs.contains(pc));
        let has_external_edge = scc.iter().any(|pc| {
            successors
                .get(pc)
                .map(|succs| succs.iter().any(|target| !scc.contains(target)))
                .unwrap_or(false)
        });

        if !has_exit && !has_external_edge {
            infinite.push(scc);
        }
    }

    infinite
}
