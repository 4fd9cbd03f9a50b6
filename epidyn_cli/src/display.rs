use comfy_table::{presets::NOTHING, *};
use epidyn::{
    dates::DateRange,
    frames::{ComparisonRow, MapFrame, RankedRegion, RegionSummary},
    geo::RegionCodes,
    metric::Metric,
};
use itertools::Itertools;

const MISSING: &str = "-";
const BAR_WIDTH: usize = 30;

fn format_value(value: Option<f64>) -> String {
    value.map_or_else(|| MISSING.to_string(), |v| format!("{v:.2}"))
}

fn new_table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_style(comfy_table::TableComponent::BottomBorder, '─')
        .set_style(comfy_table::TableComponent::BottomBorderIntersections, '─')
        .set_style(comfy_table::TableComponent::TopBorder, '─')
        .set_style(comfy_table::TableComponent::TopBorderIntersections, '─');
    if !header.is_empty() {
        table
            .set_header(
                header
                    .iter()
                    .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
                    .collect_vec(),
            )
            .set_style(comfy_table::TableComponent::MiddleHeaderIntersections, '─')
            .set_style(comfy_table::TableComponent::HeaderLines, '─');
    }
    table
}

/// A bar proportional to `value` relative to the largest magnitude in the ranking. Negative
/// values are drawn with a lighter shade.
fn bar(value: Option<f64>, max_abs: f64) -> String {
    match value {
        Some(v) if max_abs > 0.0 => {
            let len = ((v.abs() / max_abs) * BAR_WIDTH as f64).round() as usize;
            let glyph = if v < 0.0 { "░" } else { "█" };
            glyph.repeat(len)
        }
        _ => String::new(),
    }
}

pub fn display_regions(regions: &[String], codes: &RegionCodes) -> anyhow::Result<()> {
    let mut table = new_table(&["Region", "Code"]);
    for region in regions {
        table.add_row(vec![region.as_str(), codes.get(region).unwrap_or(MISSING)]);
    }
    println!("\n{}", table);
    Ok(())
}

pub fn display_summary(summary: &RegionSummary, metric: Metric) -> anyhow::Result<()> {
    let latest = match summary.latest_date {
        Some(date) => format!("{} (on {date})", format_value(summary.latest_value)),
        None => MISSING.to_string(),
    };
    let mut table = new_table(&[]);
    table
        .add_row(vec![
            Cell::new("Region").add_attribute(Attribute::Bold),
            summary.region.clone().into(),
        ])
        .add_row(vec![
            Cell::new("Metric").add_attribute(Attribute::Bold),
            metric.to_string().into(),
        ])
        .add_row(vec![
            Cell::new("Window").add_attribute(Attribute::Bold),
            summary.window.to_string().into(),
        ])
        .add_row(vec![
            Cell::new("Latest").add_attribute(Attribute::Bold),
            latest.into(),
        ])
        .add_row(vec![
            Cell::new("Average new per day").add_attribute(Attribute::Bold),
            format_value(summary.average_new).into(),
        ])
        .add_row(vec![
            Cell::new("Average acceleration").add_attribute(Attribute::Bold),
            format_value(summary.average_acceleration).into(),
        ]);
    if let Some(column) = table.column_mut(0) {
        column.set_cell_alignment(CellAlignment::Right);
    }
    println!("\n{}", table);
    Ok(())
}

pub fn display_ranking(
    ranking: &[RankedRegion],
    metric: Metric,
    range: &DateRange,
) -> anyhow::Result<()> {
    let max_abs = ranking
        .iter()
        .filter_map(|r| r.mean_acceleration)
        .map(f64::abs)
        .fold(0.0, f64::max);
    let mut table = new_table(&["Rank", "Region", "Mean acceleration", ""]);
    for ranked in ranking {
        table.add_row(vec![
            ranked.rank.to_string(),
            ranked.region.clone(),
            format_value(ranked.mean_acceleration),
            bar(ranked.mean_acceleration, max_abs),
        ]);
    }
    if let Some(column) = table.column_mut(2) {
        column.set_cell_alignment(CellAlignment::Right);
    }
    println!("\nMean acceleration of {metric} over {range}");
    println!("\n{}", table);
    Ok(())
}

pub fn display_map_frame(frame: &MapFrame) -> anyhow::Result<()> {
    let mut table = new_table(&["Region", "Code", "Acceleration"]);
    for cell in &frame.cells {
        table.add_row(vec![
            cell.region.clone(),
            cell.code.clone(),
            format_value(cell.value),
        ]);
    }
    println!(
        "\nSmoothed acceleration of {} on {} (colour scale {} from {} to {})",
        frame.metric,
        frame.date,
        frame.color_scale.name,
        frame.color_scale.low,
        frame.color_scale.high
    );
    println!("\n{}", table);
    if !frame.unmapped.is_empty() {
        println!("Not mapped: {}", frame.unmapped.join(", "));
    }
    Ok(())
}

pub fn display_comparison(rows: &[ComparisonRow]) -> anyhow::Result<()> {
    let mut table = new_table(&["Date", "Region", "Value", "New", "Acceleration"]);
    for row in rows {
        table.add_row(vec![
            row.date.to_string(),
            row.region.clone(),
            format_value(row.value),
            row.new.map_or_else(|| MISSING.to_string(), |v| format!("{v:.0}")),
            format_value(row.acceleration),
        ]);
    }
    println!("\n{}", table);
    Ok(())
}
