//! Ladder instruction set.
//!
//! Every instruction maps (tag store, incoming rung power) to outgoing rung
//! power. Side effects are limited to the instruction's own tags. Timer,
//! counter and one-shot memory is kept in auxiliary tags next to the primary
//! tag (`TMR.ACC`, `TMR.DN`, ...) and never in the instruction itself, so a
//! store snapshot captures everything.

use crate::error::LadderError;
use crate::tags::TagStore;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// InstructionKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InstructionKind {
    Xic,
    Xio,
    Ote,
    Otl,
    Otu,
    Osr,
    Ton,
    Tof,
    Ctu,
    Ctd,
}

impl InstructionKind {
    pub fn all() -> &'static [InstructionKind] {
        &[
            InstructionKind::Xic,
            InstructionKind::Xio,
            InstructionKind::Ote,
            InstructionKind::Otl,
            InstructionKind::Otu,
            InstructionKind::Osr,
            InstructionKind::Ton,
            InstructionKind::Tof,
            InstructionKind::Ctu,
            InstructionKind::Ctd,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InstructionKind::Xic => "XIC",
            InstructionKind::Xio => "XIO",
            InstructionKind::Ote => "OTE",
            InstructionKind::Otl => "OTL",
            InstructionKind::Otu => "OTU",
            InstructionKind::Osr => "OSR",
            InstructionKind::Ton => "TON",
            InstructionKind::Tof => "TOF",
            InstructionKind::Ctu => "CTU",
            InstructionKind::Ctd => "CTD",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            InstructionKind::Xic => "examine if closed",
            InstructionKind::Xio => "examine if open",
            InstructionKind::Ote => "output energize",
            InstructionKind::Otl => "output latch",
            InstructionKind::Otu => "output unlatch",
            InstructionKind::Osr => "one-shot rising",
            InstructionKind::Ton => "timer on delay",
            InstructionKind::Tof => "timer off delay",
            InstructionKind::Ctu => "count up",
            InstructionKind::Ctd => "count down",
        }
    }

    /// True for instructions that write their primary tag or its
    /// auxiliaries. Only the examine instructions are read-only.
    pub fn writes_tag(self) -> bool {
        !matches!(self, InstructionKind::Xic | InstructionKind::Xio)
    }

    pub fn needs_preset(self) -> bool {
        matches!(
            self,
            InstructionKind::Ton
                | InstructionKind::Tof
                | InstructionKind::Ctu
                | InstructionKind::Ctd
        )
    }
}

impl fmt::Display for InstructionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for InstructionKind {
    type Err = LadderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "XIC" => Ok(InstructionKind::Xic),
            "XIO" => Ok(InstructionKind::Xio),
            "OTE" => Ok(InstructionKind::Ote),
            "OTL" => Ok(InstructionKind::Otl),
            "OTU" => Ok(InstructionKind::Otu),
            "OSR" => Ok(InstructionKind::Osr),
            "TON" => Ok(InstructionKind::Ton),
            "TOF" => Ok(InstructionKind::Tof),
            "CTU" => Ok(InstructionKind::Ctu),
            "CTD" => Ok(InstructionKind::Ctd),
            _ => Err(LadderError::UnknownInstruction(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Auxiliary tag names
// ---------------------------------------------------------------------------

/// Names of a timer's auxiliary tags, derived once from the primary tag.
#[derive(Debug, Clone, PartialEq)]
pub struct TimerTags {
    /// Accumulated milliseconds.
    pub acc: String,
    /// Preset in milliseconds, mirrored for monitors.
    pub pre: String,
    pub dn: String,
    pub tt: String,
    /// Rung power seen at the previous evaluation.
    pub en: String,
    /// Clock reading at the previous evaluation.
    pub ts: String,
}

impl TimerTags {
    pub fn new(base: &str) -> Self {
        Self {
            acc: format!("{base}.ACC"),
            pre: format!("{base}.PRE"),
            dn: format!("{base}.DN"),
            tt: format!("{base}.TT"),
            en: format!("{base}.EN"),
            ts: format!("{base}.TS"),
        }
    }
}

/// Names of a counter's auxiliary tags.
#[derive(Debug, Clone, PartialEq)]
pub struct CounterTags {
    pub acc: String,
    pub pre: String,
    pub dn: String,
    /// Prior rung power for count-up edge detection.
    pub cu: String,
    /// Prior rung power for count-down edge detection.
    pub cd: String,
}

impl CounterTags {
    pub fn new(base: &str) -> Self {
        Self {
            acc: format!("{base}.ACC"),
            pre: format!("{base}.PRE"),
            dn: format!("{base}.DN"),
            cu: format!("{base}.CU"),
            cd: format!("{base}.CD"),
        }
    }
}

pub fn one_shot_storage(base: &str) -> String {
    format!("{base}.SB")
}

// ---------------------------------------------------------------------------
// Instruction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Timer {
    pub tag: String,
    pub preset_ms: f64,
    pub tags: TimerTags,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Counter {
    pub tag: String,
    pub preset: i64,
    /// While this tag reads true the counter is held in its reset state.
    pub reset_tag: Option<String>,
    pub tags: CounterTags,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    ExamineClosed(String),
    ExamineOpen(String),
    Energize(String),
    Latch(String),
    Unlatch(String),
    OneShotRising { tag: String, storage: String },
    TimerOnDelay(Timer),
    TimerOffDelay(Timer),
    CountUp(Counter),
    CountDown(Counter),
}

/// Per-scan evaluation context shared by every instruction in the scan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanContext {
    /// Clock reading captured once at the start of the logic pass.
    pub now_ms: f64,
}

impl ScanContext {
    pub fn at(now_ms: f64) -> Self {
        Self { now_ms }
    }
}

impl Instruction {
    pub fn examine_closed(tag: impl Into<String>) -> Self {
        Instruction::ExamineClosed(tag.into())
    }

    pub fn examine_open(tag: impl Into<String>) -> Self {
        Instruction::ExamineOpen(tag.into())
    }

    pub fn energize(tag: impl Into<String>) -> Self {
        Instruction::Energize(tag.into())
    }

    pub fn latch(tag: impl Into<String>) -> Self {
        Instruction::Latch(tag.into())
    }

    pub fn unlatch(tag: impl Into<String>) -> Self {
        Instruction::Unlatch(tag.into())
    }

    pub fn one_shot_rising(tag: impl Into<String>) -> Self {
        let tag = tag.into();
        let storage = one_shot_storage(&tag);
        Instruction::OneShotRising { tag, storage }
    }

    pub fn timer_on_delay(tag: impl Into<String>, preset_ms: f64) -> Self {
        Instruction::TimerOnDelay(Timer::new(tag.into(), preset_ms))
    }

    pub fn timer_off_delay(tag: impl Into<String>, preset_ms: f64) -> Self {
        Instruction::TimerOffDelay(Timer::new(tag.into(), preset_ms))
    }

    pub fn count_up(tag: impl Into<String>, preset: i64, reset_tag: Option<String>) -> Self {
        Instruction::CountUp(Counter::new(tag.into(), preset, reset_tag))
    }

    pub fn count_down(tag: impl Into<String>, preset: i64, reset_tag: Option<String>) -> Self {
        Instruction::CountDown(Counter::new(tag.into(), preset, reset_tag))
    }

    pub fn kind(&self) -> InstructionKind {
        match self {
            Instruction::ExamineClosed(_) => InstructionKind::Xic,
            Instruction::ExamineOpen(_) => InstructionKind::Xio,
            Instruction::Energize(_) => InstructionKind::Ote,
            Instruction::Latch(_) => InstructionKind::Otl,
            Instruction::Unlatch(_) => InstructionKind::Otu,
            Instruction::OneShotRising { .. } => InstructionKind::Osr,
            Instruction::TimerOnDelay(_) => InstructionKind::Ton,
            Instruction::TimerOffDelay(_) => InstructionKind::Tof,
            Instruction::CountUp(_) => InstructionKind::Ctu,
            Instruction::CountDown(_) => InstructionKind::Ctd,
        }
    }

    /// The primary tag this instruction is bound to.
    pub fn tag(&self) -> &str {
        match self {
            Instruction::ExamineClosed(tag)
            | Instruction::ExamineOpen(tag)
            | Instruction::Energize(tag)
            | Instruction::Latch(tag)
            | Instruction::Unlatch(tag)
            | Instruction::OneShotRising { tag, .. } => tag,
            Instruction::TimerOnDelay(t) | Instruction::TimerOffDelay(t) => &t.tag,
            Instruction::CountUp(c) | Instruction::CountDown(c) => &c.tag,
        }
    }

    /// Evaluate against `store` with `power` arriving from the left.
    /// Returns the power passed to the next instruction on the rung.
    pub fn evaluate(&self, store: &TagStore, power: bool, ctx: &ScanContext) -> bool {
        match self {
            Instruction::ExamineClosed(tag) => power && store.get_bool(tag, false),
            Instruction::ExamineOpen(tag) => power && !store.get_bool(tag, false),
            Instruction::Energize(tag) => {
                store.set(tag, power);
                power
            }
            Instruction::Latch(tag) => {
                if power {
                    store.set(tag, true);
                }
                power
            }
            Instruction::Unlatch(tag) => {
                if power {
                    store.set(tag, false);
                }
                power
            }
            Instruction::OneShotRising { tag, storage } => {
                let prior = store.get_bool(storage, false);
                store.set(tag, power && !prior);
                store.set(storage, power);
                power
            }
            Instruction::TimerOnDelay(t) => {
                t.on_delay(store, power, ctx.now_ms);
                power
            }
            Instruction::TimerOffDelay(t) => {
                t.off_delay(store, power, ctx.now_ms);
                power
            }
            Instruction::CountUp(c) => {
                c.count_up(store, power);
                power
            }
            Instruction::CountDown(c) => {
                c.count_down(store, power);
                power
            }
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::TimerOnDelay(t) | Instruction::TimerOffDelay(t) => {
                write!(f, "{}({}, {}ms)", self.kind(), t.tag, t.preset_ms)
            }
            Instruction::CountUp(c) | Instruction::CountDown(c) => match &c.reset_tag {
                Some(reset) => write!(
                    f,
                    "{}({}, {}, reset={})",
                    self.kind(),
                    c.tag,
                    c.preset,
                    reset
                ),
                None => write!(f, "{}({}, {})", self.kind(), c.tag, c.preset),
            },
            _ => write!(f, "{}({})", self.kind(), self.tag()),
        }
    }
}

// ---------------------------------------------------------------------------
// Timers
// ---------------------------------------------------------------------------

impl Timer {
    pub fn new(tag: String, preset_ms: f64) -> Self {
        let tags = TimerTags::new(&tag);
        Self {
            tag,
            preset_ms,
            tags,
        }
    }

    fn ensure_tags(&self, store: &TagStore, now_ms: f64) {
        if store.exists(&self.tags.acc) {
            return;
        }
        store.create_if_absent(&self.tags.acc, 0.0);
        store.create_if_absent(&self.tags.dn, false);
        store.create_if_absent(&self.tags.tt, false);
        store.create_if_absent(&self.tags.en, false);
        store.create_if_absent(&self.tags.ts, now_ms);
    }

    /// Milliseconds since the previous evaluation, or zero if the timer was
    /// not enabled at that evaluation.
    fn elapsed_since_last(&self, store: &TagStore, now_ms: f64) -> f64 {
        let last = store.get_real(&self.tags.ts, now_ms);
        (now_ms - last).max(0.0)
    }

    fn on_delay(&self, store: &TagStore, power: bool, now_ms: f64) {
        self.ensure_tags(store, now_ms);
        store.set(&self.tags.pre, self.preset_ms);

        if power {
            let was_enabled = store.get_bool(&self.tags.en, false);
            let mut acc = store.get_real(&self.tags.acc, 0.0);
            if was_enabled {
                acc += self.elapsed_since_last(store, now_ms);
            }
            let acc = acc.min(self.preset_ms);
            let done = acc >= self.preset_ms;
            store.set(&self.tags.acc, acc);
            store.set(&self.tags.dn, done);
            store.set(&self.tags.tt, !done);
        } else {
            store.set(&self.tags.acc, 0.0);
            store.set(&self.tags.dn, false);
            store.set(&self.tags.tt, false);
        }
        store.set(&self.tags.en, power);
        store.set(&self.tags.ts, now_ms);
    }

    fn off_delay(&self, store: &TagStore, power: bool, now_ms: f64) {
        self.ensure_tags(store, now_ms);
        store.set(&self.tags.pre, self.preset_ms);

        if power {
            store.set(&self.tags.acc, 0.0);
            store.set(&self.tags.dn, true);
            store.set(&self.tags.tt, false);
        } else if store.get_bool(&self.tags.dn, false) {
            let was_enabled = store.get_bool(&self.tags.en, false);
            let acc = if was_enabled {
                // Falling edge: timing starts now.
                0.0
            } else {
                store.get_real(&self.tags.acc, 0.0) + self.elapsed_since_last(store, now_ms)
            };
            let acc = acc.min(self.preset_ms);
            let expired = acc >= self.preset_ms;
            store.set(&self.tags.acc, acc);
            store.set(&self.tags.dn, !expired);
            store.set(&self.tags.tt, !expired);
        }
        store.set(&self.tags.en, power);
        store.set(&self.tags.ts, now_ms);
    }

    /// Forget the time spent between the previous evaluation and `now_ms`.
    /// Called when a scheduler starts so that time spent stopped does not
    /// accumulate.
    pub fn rebase(&self, store: &TagStore, now_ms: f64) {
        if store.exists(&self.tags.ts) {
            store.set(&self.tags.ts, now_ms);
        }
    }
}

// ---------------------------------------------------------------------------
// Counters
// ---------------------------------------------------------------------------

impl Counter {
    pub fn new(tag: String, preset: i64, reset_tag: Option<String>) -> Self {
        let tags = CounterTags::new(&tag);
        Self {
            tag,
            preset,
            reset_tag,
            tags,
        }
    }

    fn reset_requested(&self, store: &TagStore) -> bool {
        self.reset_tag
            .as_deref()
            .is_some_and(|reset| store.get_bool(reset, false))
    }

    fn count_up(&self, store: &TagStore, power: bool) {
        if !store.exists(&self.tags.acc) {
            store.create_if_absent(&self.tags.acc, 0_i64);
            store.create_if_absent(&self.tags.dn, false);
            store.create_if_absent(&self.tags.cu, false);
        }
        store.set(&self.tags.pre, self.preset);

        let prior = store.get_bool(&self.tags.cu, false);
        if self.reset_requested(store) {
            store.set(&self.tags.acc, 0_i64);
            store.set(&self.tags.dn, false);
        } else {
            let mut acc = store.get_int(&self.tags.acc, 0);
            if power && !prior {
                acc = acc.saturating_add(1);
                store.set(&self.tags.acc, acc);
            }
            store.set(&self.tags.dn, acc >= self.preset);
        }
        store.set(&self.tags.cu, power);
    }

    fn count_down(&self, store: &TagStore, power: bool) {
        if !store.exists(&self.tags.acc) {
            store.create_if_absent(&self.tags.acc, self.preset);
            store.create_if_absent(&self.tags.dn, self.preset <= 0);
            store.create_if_absent(&self.tags.cd, false);
        }
        store.set(&self.tags.pre, self.preset);

        let prior = store.get_bool(&self.tags.cd, false);
        let acc = if self.reset_requested(store) {
            store.set(&self.tags.acc, self.preset);
            self.preset
        } else {
            let mut acc = store.get_int(&self.tags.acc, self.preset);
            if power && !prior && acc > 0 {
                acc -= 1;
                store.set(&self.tags.acc, acc);
            }
            acc
        };
        store.set(&self.tags.dn, acc <= 0);
        store.set(&self.tags.cd, power);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
