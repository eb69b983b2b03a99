use crate::instruction::{Instruction, InstructionKind, ScanContext};
use crate::tags::TagStore;
use serde::Serialize;
use std::collections::BTreeMap;

/// One row of ladder logic: a straight chain of instructions with no
/// parallel branches.
#[derive(Debug, Clone, PartialEq)]
pub struct Rung {
    pub id: i64,
    pub comment: String,
    pub instructions: Vec<Instruction>,
}

impl Rung {
    pub fn new(id: i64, instructions: Vec<Instruction>) -> Self {
        Self {
            id,
            comment: String::new(),
            instructions,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    /// Evaluate the rung left to right starting from an energized power
    /// rail. Returns the power leaving the last instruction.
    pub fn evaluate(&self, store: &TagStore, ctx: &ScanContext) -> bool {
        self.instructions
            .iter()
            .fold(true, |power, instruction| {
                instruction.evaluate(store, power, ctx)
            })
    }

    pub fn mnemonics(&self) -> Vec<&'static str> {
        self.instructions.iter().map(|i| i.kind().as_str()).collect()
    }
}

/// Ordered rungs plus the tag store they share. Topology is fixed once
/// built; only tag values change from cycle to cycle.
#[derive(Debug, Clone)]
pub struct Program {
    name: String,
    scan_time_ms: Option<u64>,
    rungs: Vec<Rung>,
    store: TagStore,
}

impl Program {
    pub fn new(name: impl Into<String>, rungs: Vec<Rung>, store: TagStore) -> Self {
        Self {
            name: name.into(),
            scan_time_ms: None,
            rungs,
            store,
        }
    }

    pub fn with_scan_time(mut self, scan_time_ms: Option<u64>) -> Self {
        self.scan_time_ms = scan_time_ms;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Scan period requested by the program description, if any.
    pub fn scan_time_ms(&self) -> Option<u64> {
        self.scan_time_ms
    }

    pub fn rungs(&self) -> &[Rung] {
        &self.rungs
    }

    pub fn store(&self) -> &TagStore {
        &self.store
    }

    /// Run every rung once, in order. All rungs always run.
    pub fn execute(&self, ctx: &ScanContext) {
        for rung in &self.rungs {
            rung.evaluate(&self.store, ctx);
        }
    }

    pub fn instruction_count(&self) -> usize {
        self.rungs.iter().map(|r| r.instructions.len()).sum()
    }

    pub fn kind_counts(&self) -> BTreeMap<InstructionKind, usize> {
        let mut counts = BTreeMap::new();
        for instruction in self.rungs.iter().flat_map(|r| &r.instructions) {
            *counts.entry(instruction.kind()).or_insert(0) += 1;
        }
        counts
    }

    /// Shift every timer's last-evaluation timestamp to `now_ms` so that
    /// time spent outside a scan does not count toward any accumulator.
    pub fn rebase_timers(&self, now_ms: f64) {
        for instruction in self.rungs.iter().flat_map(|r| &r.instructions) {
            if let Instruction::TimerOnDelay(t) | Instruction::TimerOffDelay(t) = instruction {
                t.rebase(&self.store, now_ms);
            }
        }
    }

    pub fn summary(&self) -> ProgramSummary {
        ProgramSummary {
            name: self.name.clone(),
            scan_time_ms: self.scan_time_ms,
            rung_count: self.rungs.len(),
            instruction_count: self.instruction_count(),
            rungs: self
                .rungs
                .iter()
                .map(|r| RungSummary {
                    id: r.id,
                    comment: r.comment.clone(),
                    instructions: r.instructions.iter().map(|i| i.to_string()).collect(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgramSummary {
    pub name: String,
    pub scan_time_ms: Option<u64>,
    pub rung_count: usize,
    pub instruction_count: usize,
    pub rungs: Vec<RungSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RungSummary {
    pub id: i64,
    pub comment: String,
    pub instructions: Vec<String>,
}
