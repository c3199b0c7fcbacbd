use comfy_table::{presets::NOTHING, *};
use itertools::Itertools;

use epimerge::diagnostics::RunDiagnostics;
use epimerge::source_spec::SourceKind;
use epimerge::sources::{DataSource, KnownSource};

fn bordered_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_style(comfy_table::TableComponent::BottomBorder, '─')
        .set_style(comfy_table::TableComponent::MiddleHeaderIntersections, '─')
        .set_style(comfy_table::TableComponent::HeaderLines, '─')
        .set_style(comfy_table::TableComponent::BottomBorderIntersections, '─')
        .set_style(comfy_table::TableComponent::TopBorder, '─')
        .set_style(comfy_table::TableComponent::TopBorderIntersections, '─');
    table
}

pub fn display_sources(sources: &[KnownSource]) -> anyhow::Result<()> {
    let mut table = bordered_table();
    table.set_header(vec![
        Cell::new("Source").add_attribute(Attribute::Bold),
        Cell::new("Table").add_attribute(Attribute::Bold),
        Cell::new("Kind").add_attribute(Attribute::Bold),
        Cell::new("Mapped columns").add_attribute(Attribute::Bold),
    ]);
    for source in sources {
        for table_spec in source.table_specs() {
            let kind = match &table_spec.spec.kind {
                SourceKind::TimeSeries { cumulative: true } => {
                    "time series (cumulative)".to_string()
                }
                SourceKind::TimeSeries { cumulative: false } => "time series (daily)".to_string(),
                SourceKind::CaseLine { metric, .. } => format!("case line ({metric})"),
            };
            let columns = table_spec
                .spec
                .column_map
                .iter()
                .map(|(raw, canonical)| format!("{raw} -> {canonical}"))
                .join(", ");
            table.add_row(vec![
                source.name().to_string(),
                table_spec.table.clone(),
                kind,
                columns,
            ]);
        }
    }
    println!("\n{}", table);
    Ok(())
}

pub fn display_diagnostics(diagnostics: &RunDiagnostics) -> anyhow::Result<()> {
    let mut table = bordered_table();
    table.set_header(vec![
        Cell::new("Source").add_attribute(Attribute::Bold),
        Cell::new("Rows in").add_attribute(Attribute::Bold),
        Cell::new("Observations").add_attribute(Attribute::Bold),
        Cell::new("Bad dates").add_attribute(Attribute::Bold),
        Cell::new("Unresolved").add_attribute(Attribute::Bold),
    ]);
    for source in &diagnostics.sources {
        table.add_row(vec![
            source.source.clone(),
            source.rows_in.to_string(),
            source.observations.to_string(),
            source.unparseable_dates.to_string(),
            source.unresolved_locations.to_string(),
        ]);
    }
    println!("\n{}", table);
    for (name, error) in &diagnostics.failed_sources {
        println!("Source {name} was skipped: {error}");
    }
    Ok(())
}
