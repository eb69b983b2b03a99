use crate::output::{print_json, print_table};
use anyhow::Context;
use ladder_core::load_program;
use std::path::Path;

pub fn run(program: &Path, json: bool) -> anyhow::Result<()> {
    let program = load_program(program)
        .with_context(|| format!("failed to load program {}", program.display()))?;
    let summary = program.summary();

    if json {
        return print_json(&summary);
    }

    let period = match summary.scan_time_ms {
        Some(ms) => format!("{ms} ms"),
        None => "default".to_string(),
    };
    println!(
        "{}: {} rungs, {} instructions, scan period {}",
        summary.name, summary.rung_count, summary.instruction_count, period
    );
    println!();

    let rows = summary
        .rungs
        .iter()
        .map(|r| {
            vec![
                r.id.to_string(),
                r.instructions.len().to_string(),
                r.instructions.join(" "),
                r.comment.clone(),
            ]
        })
        .collect();
    print_table(&["RUNG", "COUNT", "LOGIC", "COMMENT"], rows);
    Ok(())
}
