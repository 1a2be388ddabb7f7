use super::ui;
use super::view::{prefetch, report_annotations, resolve_request};
use crate::ViewOptions;
use crate::core::config::AppConfig;
use crate::core::series::SeriesId;
use crate::engine::insights::total_return;
use crate::present::time_points;
use crate::session::Session;
use anyhow::Result;
use chrono::NaiveDate;
use comfy_table::Cell;
use serde::Serialize;

/// Side-by-side comparison of the selected series in the requested mode.
pub async fn run(config: &AppConfig, session: &Session, options: &ViewOptions) -> Result<()> {
    let request = resolve_request(config, session, options)?;
    prefetch(session, &request).await?;
    let raw = session.dataset(&request).await?;
    let view = session.view(&request).await?;
    report_annotations(&view);
    let events = session.events(&request).await?;

    if options.json {
        return ui::print_json(&serde_json::json!({
            "points": time_points(&view),
            "events": events,
        }));
    }

    let (Some(first), Some(last)) = (view.dates().first(), view.dates().last()) else {
        println!("No data in the selected range.");
        return Ok(());
    };
    println!(
        "\n{} {}",
        ui::style_text("Comparison", ui::StyleType::Title),
        ui::style_text(
            &format!("{} | {} to {} | {} dates", view.mode(), first, last, view.len()),
            ui::StyleType::Subtle
        )
    );

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Series"),
        ui::header_cell("Type"),
        ui::header_cell("Source"),
        ui::header_cell("Start"),
        ui::header_cell("End"),
        ui::header_cell("Change"),
    ]);
    for column in view.columns() {
        let (kind, source) = match session.spec(&column.id) {
            Ok(spec) => {
                let (name, emoji) = spec.category.display_info();
                (format!("{emoji} {name}"), spec.source.to_string())
            }
            Err(_) => (String::new(), String::new()),
        };
        let mode = view.mode();
        table.add_row(vec![
            Cell::new(&column.id),
            Cell::new(kind),
            Cell::new(source),
            ui::format_optional_cell(column.first_valid(), |(_, v)| ui::format_value(v, mode)),
            ui::format_optional_cell(column.last_valid(), |(_, v)| ui::format_value(v, mode)),
            raw.column(&column.id)
                .and_then(total_return)
                .map_or_else(|| ui::na_cell(false), ui::change_cell),
        ]);
    }
    println!("{table}");

    if !events.is_empty() {
        println!("\n{}", ui::style_text("Events", ui::StyleType::TotalLabel));
        for event in &events {
            println!(
                "  {}  {}",
                ui::style_text(&event.date.to_string(), ui::StyleType::Subtle),
                event.label
            );
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct BandPoint<'a> {
    date: NaiveDate,
    series: &'a SeriesId,
    value: Option<f64>,
    middle: Option<f64>,
    upper: Option<f64>,
    lower: Option<f64>,
}

/// Moving average and Bollinger bands per selected series.
pub async fn run_overlay(
    config: &AppConfig,
    session: &Session,
    options: &ViewOptions,
    multiplier: Option<f64>,
) -> Result<()> {
    let request = resolve_request(config, session, options)?;
    let multiplier = multiplier.unwrap_or(session.settings().bollinger_multiplier);
    prefetch(session, &request).await?;
    let view = session.view(&request).await?;
    report_annotations(&view);
    let overlays = session.overlays(&request, multiplier).await?;

    if options.json {
        let points: Vec<BandPoint> = overlays
            .iter()
            .filter_map(|overlay| Some((overlay, view.column(&overlay.id)?)))
            .flat_map(|(overlay, column)| {
                view.dates().iter().enumerate().map(move |(i, date)| BandPoint {
                    date: *date,
                    series: &overlay.id,
                    value: column.values[i],
                    middle: overlay.bands.middle[i],
                    upper: overlay.bands.upper[i],
                    lower: overlay.bands.lower[i],
                })
            })
            .collect();
        return ui::print_json(&points);
    }

    println!(
        "\n{} {}",
        ui::style_text("Bollinger Bands", ui::StyleType::Title),
        ui::style_text(
            &format!("{} | window {} | ±{}σ", view.mode(), request.window, multiplier),
            ui::StyleType::Subtle
        )
    );
    let mode = view.mode();
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Series"),
        ui::header_cell("Latest"),
        ui::header_cell("SMA"),
        ui::header_cell("Upper"),
        ui::header_cell("Lower"),
        ui::header_cell("Position"),
    ]);
    for overlay in overlays.iter() {
        let Some(column) = view.column(&overlay.id) else {
            continue;
        };
        let last = view.len().checked_sub(1);
        let at = |values: &[Option<f64>]| last.and_then(|i| values[i]);
        let latest = at(&column.values);
        let (upper, lower) = (at(&overlay.bands.upper), at(&overlay.bands.lower));
        let position = match (latest, upper, lower) {
            (Some(v), Some(u), _) if v > u => "Above upper band",
            (Some(v), _, Some(l)) if v < l => "Below lower band",
            (Some(_), Some(_), Some(_)) => "Inside bands",
            _ => "N/A",
        };
        table.add_row(vec![
            Cell::new(&overlay.id),
            ui::format_optional_cell(latest, |v| ui::format_value(v, mode)),
            ui::format_optional_cell(at(&overlay.bands.middle), |v| ui::format_value(v, mode)),
            ui::format_optional_cell(upper, |v| ui::format_value(v, mode)),
            ui::format_optional_cell(lower, |v| ui::format_value(v, mode)),
            Cell::new(position),
        ]);
    }
    println!("{table}");
    Ok(())
}
