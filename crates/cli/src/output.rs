use crate::error::CliError;
use engine_core::progress::CursorStatus;
use engine_runtime::registry::SourceRegistry;
use model::summary::LoadSummary;

pub fn print_summary(summary: &LoadSummary, as_json: bool) -> Result<(), CliError> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    println!(
        "Load {} of '{}' ({}): {}{}",
        summary.load_id,
        summary.source,
        summary.partition,
        summary.status,
        if summary.dry_run { " [dry run]" } else { "" }
    );
    println!(
        "{:<24} {:<28} {:>8} {:>10} {:>10} {:>10}",
        "Resource", "Table", "Batches", "Extracted", "Loaded", "In table"
    );
    for resource in &summary.resources {
        let in_table = resource
            .table_rows
            .map(|rows| rows.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<24} {:<28} {:>8} {:>10} {:>10} {:>10}",
            resource.resource, resource.table, resource.batches, resource.rows_extracted, resource.rows_loaded, in_table
        );
        if let Some(err) = &resource.error {
            println!("  error: {err}");
        }
    }
    if let Some(ms) = summary.duration_ms() {
        println!("Total rows {} in {ms} ms", summary.total_rows());
    }
    Ok(())
}

pub fn print_cursors(source: &str, statuses: &[CursorStatus], as_json: bool) -> Result<(), CliError> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(statuses)?);
        return Ok(());
    }

    if statuses.is_empty() {
        println!("No cursors stored for '{source}'");
        return Ok(());
    }
    println!("Cursors for '{source}':");
    println!("-----------------------------");
    for status in statuses {
        println!("{:<16} {}", "Resource", status.resource);
        println!("{:<16} {}", "Partition", status.partition);
        println!("{:<16} {}", "Marker", status.summary);
        println!("{:<16} {}", "Load", status.load_id);
        println!("{:<16} {}", "Updated", status.updated_at.to_rfc3339());
        println!();
    }
    Ok(())
}

pub fn print_sources(registry: &SourceRegistry, as_json: bool) -> Result<(), CliError> {
    if as_json {
        let descriptors: Vec<_> = registry.descriptors().collect();
        println!("{}", serde_json::to_string_pretty(&descriptors)?);
        return Ok(());
    }

    for descriptor in registry.descriptors() {
        println!("{}", descriptor.name);
        for resource in &descriptor.resources {
            println!(
                "  {:<20} -> {:<28} {:<8} key=[{}]",
                resource.name,
                resource.table,
                resource.disposition.to_string(),
                resource.primary_key.join(", ")
            );
        }
    }
    Ok(())
}
