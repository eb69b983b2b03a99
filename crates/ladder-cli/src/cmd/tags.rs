use crate::output::{print_json, print_table};
use anyhow::Context;
use ladder_core::snapshot::load_snapshot;
use std::path::Path;

pub fn run(snapshot: &Path, json: bool) -> anyhow::Result<()> {
    let snapshot = load_snapshot(snapshot)
        .with_context(|| format!("failed to read snapshot {}", snapshot.display()))?;

    if json {
        return print_json(&snapshot);
    }

    match &snapshot.program {
        Some(program) => println!(
            "{} tags from '{}', saved {}",
            snapshot.tags.len(),
            program,
            snapshot.saved_at.format("%Y-%m-%d %H:%M:%S UTC")
        ),
        None => println!(
            "{} tags, saved {}",
            snapshot.tags.len(),
            snapshot.saved_at.format("%Y-%m-%d %H:%M:%S UTC")
        ),
    }
    println!();

    let rows = snapshot
        .tags
        .iter()
        .map(|(name, value)| {
            vec![
                name.clone(),
                value.type_name().to_string(),
                value.to_string(),
            ]
        })
        .collect();
    print_table(&["TAG", "TYPE", "VALUE"], rows);
    Ok(())
}
