//! Program description parsing.
//!
//! A description is decoded into plain serde structs first and then built
//! into a [`Program`]. Building is all-or-nothing: any error aborts the load
//! and no partial program is returned. Unknown instruction kinds are the one
//! lenient case; they are logged and dropped from their rung.

use crate::error::{LadderError, Result};
use crate::instruction::{Instruction, InstructionKind};
use crate::program::{Program, Rung};
use crate::tags::{is_system_tag, TagStore};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Description format
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptionFormat {
    Json,
    Yaml,
}

impl DescriptionFormat {
    /// `.yaml` and `.yml` are YAML; everything else is JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                DescriptionFormat::Yaml
            }
            _ => DescriptionFormat::Json,
        }
    }

    pub fn parse<T: DeserializeOwned>(self, text: &str) -> Result<T> {
        match self {
            DescriptionFormat::Json => Ok(serde_json::from_str(text)?),
            DescriptionFormat::Yaml => Ok(serde_yaml::from_str(text)?),
        }
    }
}

/// Read and decode a JSON or YAML file, choosing the format by extension.
pub fn read_description<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| LadderError::ProgramLoad(format!("{}: {e}", path.display())))?;
    DescriptionFormat::from_path(path).parse(&text)
}

// ---------------------------------------------------------------------------
// Raw description
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramDescription {
    #[serde(default = "default_program_name")]
    pub program_name: String,
    #[serde(default)]
    pub scan_time_ms: Option<u64>,
    #[serde(default)]
    pub rungs: Vec<RungDescription>,
}

fn default_program_name() -> String {
    "unnamed".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RungDescription {
    pub rung_id: i64,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub instructions: Vec<InstructionDescription>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstructionDescription {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub preset: Option<f64>,
    #[serde(default)]
    pub reset_tag: Option<String>,
}

// ---------------------------------------------------------------------------
// Tag name validation
// ---------------------------------------------------------------------------

static TAG_RE: OnceLock<Regex> = OnceLock::new();

fn tag_re() -> &'static Regex {
    TAG_RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z0-9_]+)*$").unwrap())
}

pub fn validate_tag_name(name: &str) -> Result<()> {
    if !tag_re().is_match(name) {
        return Err(LadderError::InvalidTagName(name.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Building
// ---------------------------------------------------------------------------

/// Load a program file into a fresh tag store.
pub fn load_program(path: &Path) -> Result<Program> {
    let description: ProgramDescription = read_description(path)?;
    build_program(description, TagStore::new())
}

pub fn parse_program(text: &str, format: DescriptionFormat) -> Result<Program> {
    let description: ProgramDescription = format.parse(text)?;
    build_program(description, TagStore::new())
}

pub fn build_program(description: ProgramDescription, store: TagStore) -> Result<Program> {
    let mut rungs = Vec::with_capacity(description.rungs.len());
    for rung in &description.rungs {
        let mut instructions = Vec::with_capacity(rung.instructions.len());
        for entry in &rung.instructions {
            if let Some(instruction) = build_instruction(rung.rung_id, entry)? {
                instructions.push(instruction);
            }
        }
        rungs.push(Rung::new(rung.rung_id, instructions).with_comment(rung.comment.clone()));
    }

    let program = Program::new(description.program_name, rungs, store)
        .with_scan_time(description.scan_time_ms);
    tracing::info!(
        program = program.name(),
        rungs = program.rungs().len(),
        instructions = program.instruction_count(),
        "loaded program"
    );
    Ok(program)
}

/// Returns `Ok(None)` for an unknown kind, which the caller drops.
fn build_instruction(rung: i64, entry: &InstructionDescription) -> Result<Option<Instruction>> {
    let raw_kind = entry.kind.as_deref().unwrap_or("");
    let kind = match raw_kind.parse::<InstructionKind>() {
        Ok(kind) => kind,
        Err(err) => {
            tracing::warn!(rung, "{err}; instruction omitted");
            return Ok(None);
        }
    };

    let missing = |field: &'static str| LadderError::MissingField {
        rung,
        kind: kind.to_string(),
        field,
    };

    let tag = entry.tag.clone().ok_or_else(|| missing("tag"))?;
    validate_tag_name(&tag)?;
    if kind.writes_tag() && is_system_tag(&tag) {
        return Err(LadderError::ReservedTag(tag));
    }

    let preset = if kind.needs_preset() {
        let preset = entry.preset.ok_or_else(|| missing("preset"))?;
        if !preset.is_finite() || preset < 0.0 {
            return Err(LadderError::InvalidPreset {
                kind: kind.to_string(),
                tag,
                preset,
            });
        }
        preset
    } else {
        0.0
    };

    let reset_tag = match &entry.reset_tag {
        Some(reset) => {
            validate_tag_name(reset)?;
            Some(reset.clone())
        }
        None => None,
    };

    let instruction = match kind {
        InstructionKind::Xic => Instruction::examine_closed(tag),
        InstructionKind::Xio => Instruction::examine_open(tag),
        InstructionKind::Ote => Instruction::energize(tag),
        InstructionKind::Otl => Instruction::latch(tag),
        InstructionKind::Otu => Instruction::unlatch(tag),
        InstructionKind::Osr => Instruction::one_shot_rising(tag),
        InstructionKind::Ton => Instruction::timer_on_delay(tag, preset),
        InstructionKind::Tof => Instruction::timer_off_delay(tag, preset),
        InstructionKind::Ctu => {
            let count = count_preset(kind, &tag, preset)?;
            Instruction::count_up(tag, count, reset_tag)
        }
        InstructionKind::Ctd => {
            let count = count_preset(kind, &tag, preset)?;
            Instruction::count_down(tag, count, reset_tag)
        }
    };
    Ok(Some(instruction))
}

fn count_preset(kind: InstructionKind, tag: &str, preset: f64) -> Result<i64> {
    if preset.fract() != 0.0 || preset > i64::MAX as f64 {
        return Err(LadderError::InvalidPreset {
            kind: kind.to_string(),
            tag: tag.to_string(),
            preset,
        });
    }
    Ok(preset as i64)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MOTOR: &str = r#"{
        "program_name": "Motor",
        "scan_time_ms": 50,
        "rungs": [
            {
                "rung_id": 0,
                "comment": "Start button logic",
                "instructions": [
                    {"type": "XIC", "tag": "START_BTN"},
                    {"type": "XIO", "tag": "STOP_BTN"},
                    {"type": "OTE", "tag": "MOTOR_RUN"}
                ]
            },
            {
                "rung_id": 1,
                "instructions": [
                    {"type": "XIC", "tag": "MOTOR_RUN"},
                    {"type": "TON", "tag": "RUN_TIMER", "preset": 2000},
                    {"type": "CTU", "tag": "STARTS", "preset": 5, "reset_tag": "STARTS_RST"}
                ]
            }
        ]
    }"#;

    #[test]
    fn valid_tag_names() {
        for name in ["START", "_x", "TIMER.DN", "a1.b_2.3", "_SYSTEM.RUNNING"] {
            validate_tag_name(name).unwrap_or_else(|_| panic!("expected valid: {name}"));
        }
    }

    #[test]
    fn invalid_tag_names() {
        for name in ["", "1ABC", "A..B", "A.", ".A", "A B", "A-B"] {
            assert!(validate_tag_name(name).is_err(), "expected invalid: {name}");
        }
    }

    #[test]
    fn parses_json_program() {
        let program = parse_program(MOTOR, DescriptionFormat::Json).unwrap();
        assert_eq!(program.name(), "Motor");
        assert_eq!(program.scan_time_ms(), Some(50));
        assert_eq!(program.rungs().len(), 2);
        assert_eq!(program.rungs()[0].comment, "Start button logic");
        assert_eq!(program.rungs()[0].mnemonics(), vec!["XIC", "XIO", "OTE"]);
        assert_eq!(
            program.rungs()[1].instructions[2],
            Instruction::count_up("STARTS", 5, Some("STARTS_RST".into()))
        );
    }

    #[test]
    fn parses_yaml_program() {
        let yaml = r#"
program_name: Lamp
rungs:
  - rung_id: 3
    instructions:
      - { type: XIC, tag: SWITCH }
      - { type: TOF, tag: LAMP_DELAY, preset: 250 }
"#;
        let program = parse_program(yaml, DescriptionFormat::Yaml).unwrap();
        assert_eq!(program.scan_time_ms(), None);
        assert_eq!(program.rungs()[0].id, 3);
        assert_eq!(
            program.rungs()[0].instructions[1],
            Instruction::timer_off_delay("LAMP_DELAY", 250.0)
        );
    }

    #[test]
    fn unknown_kind_is_dropped() {
        let json = r#"{"rungs": [{"rung_id": 0, "instructions": [
            {"type": "XIC", "tag": "A"},
            {"type": "JSR", "tag": "SUB"},
            {"tag": "NO_TYPE"},
            {"type": "OTE", "tag": "B"}
        ]}]}"#;
        let program = parse_program(json, DescriptionFormat::Json).unwrap();
        assert_eq!(program.name(), "unnamed");
        assert_eq!(program.rungs()[0].mnemonics(), vec!["XIC", "OTE"]);
    }

    #[test]
    fn missing_preset_fails_whole_load() {
        let json = r#"{"rungs": [
            {"rung_id": 0, "instructions": [{"type": "OTE", "tag": "OK"}]},
            {"rung_id": 1, "instructions": [{"type": "TON", "tag": "T"}]}
        ]}"#;
        let err = parse_program(json, DescriptionFormat::Json).unwrap_err();
        assert!(matches!(
            err,
            LadderError::MissingField { rung: 1, field: "preset", .. }
        ));
    }

    #[test]
    fn missing_tag_fails() {
        let json = r#"{"rungs": [{"rung_id": 0, "instructions": [{"type": "XIC"}]}]}"#;
        let err = parse_program(json, DescriptionFormat::Json).unwrap_err();
        assert!(matches!(err, LadderError::MissingField { field: "tag", .. }));
    }

    #[test]
    fn missing_rung_id_fails() {
        let json = r#"{"rungs": [{"instructions": []}]}"#;
        assert!(parse_program(json, DescriptionFormat::Json).is_err());
    }

    #[test]
    fn writes_to_system_tags_rejected() {
        let json = r#"{"rungs": [{"rung_id": 0, "instructions": [
            {"type": "OTE", "tag": "_SYSTEM.ERROR"}
        ]}]}"#;
        let err = parse_program(json, DescriptionFormat::Json).unwrap_err();
        assert!(matches!(err, LadderError::ReservedTag(_)));

        let reads = r#"{"rungs": [{"rung_id": 0, "instructions": [
            {"type": "XIC", "tag": "_SYSTEM.RUNNING"}, {"type": "OTE", "tag": "LAMP"}
        ]}]}"#;
        assert!(parse_program(reads, DescriptionFormat::Json).is_ok());
    }

    #[test]
    fn bad_presets_rejected() {
        for body in [
            r#"{"type": "TON", "tag": "T", "preset": -1}"#,
            r#"{"type": "CTU", "tag": "C", "preset": 2.5}"#,
        ] {
            let json = format!(r#"{{"rungs": [{{"rung_id": 0, "instructions": [{body}]}}]}}"#);
            let err = parse_program(&json, DescriptionFormat::Json).unwrap_err();
            assert!(matches!(err, LadderError::InvalidPreset { .. }), "{body}");
        }
    }

    #[test]
    fn malformed_text_is_an_error() {
        assert!(parse_program("{not json", DescriptionFormat::Json).is_err());
        assert!(parse_program("rungs: [", DescriptionFormat::Yaml).is_err());
    }

    #[test]
    fn load_program_by_extension() {
        let dir = TempDir::new().unwrap();
        let json_path = dir.path().join("motor.json");
        std::fs::write(&json_path, MOTOR).unwrap();
        assert_eq!(load_program(&json_path).unwrap().name(), "Motor");

        let yaml_path = dir.path().join("lamp.yml");
        std::fs::write(&yaml_path, "program_name: Lamp\nrungs: []\n").unwrap();
        assert_eq!(load_program(&yaml_path).unwrap().name(), "Lamp");

        let err = load_program(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, LadderError::ProgramLoad(_)));
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(DescriptionFormat::from_path(Path::new("a.YAML")), DescriptionFormat::Yaml);
        assert_eq!(DescriptionFormat::from_path(Path::new("a.yml")), DescriptionFormat::Yaml);
        assert_eq!(DescriptionFormat::from_path(Path::new("a.json")), DescriptionFormat::Json);
        assert_eq!(DescriptionFormat::from_path(Path::new("a")), DescriptionFormat::Json);
    }
}
