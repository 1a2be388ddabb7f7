use super::ui;
use super::view::{prefetch, report_annotations, resolve_request};
use crate::ViewOptions;
use crate::core::config::AppConfig;
use crate::core::series::SeriesId;
use crate::engine::correlation::monthly_returns;
use crate::engine::lag::LagRange;
use crate::engine::stats::mean;
use crate::present::{matrix_cells, sensitivity_table};
use crate::session::{AnalysisRequest, Session};
use anyhow::{Result, bail};
use comfy_table::{Attribute, Cell, CellAlignment};

/// The pair to analyze: explicit names, or the first two selected series.
fn pair_of(
    config: &AppConfig,
    request: &AnalysisRequest,
    pair: Option<(String, String)>,
) -> Result<(SeriesId, SeriesId)> {
    match pair {
        Some((a, b)) => Ok((
            config.series_spec(&a)?.id.clone(),
            config.series_spec(&b)?.id.clone(),
        )),
        None => match request.series.as_slice() {
            [a, b, ..] => Ok((a.clone(), b.clone())),
            _ => bail!("Select at least two series to correlate"),
        },
    }
}

/// Correlation matrix of monthly returns, the driver sensitivity map and regressions against
/// the first selected series.
pub async fn run_matrix(config: &AppConfig, session: &Session, options: &ViewOptions) -> Result<()> {
    let request = resolve_request(config, session, options)?;
    prefetch(session, &request).await?;
    let dataset = session.dataset(&request).await?;
    report_annotations(&dataset);
    let matrix = session.correlation_matrix(&request).await?;
    let sensitivity = session.sensitivity(&request).await?;

    let reference = request.series[0].clone();
    let mut regressions = Vec::new();
    if dataset.column(&reference).is_some() {
        for other in dataset.ids().into_iter().filter(|id| *id != reference) {
            let fit = session.regression(&request, &reference, &other).await?;
            regressions.push((other, fit));
        }
    }

    if options.json {
        let regressions: Vec<_> = regressions
            .iter()
            .map(|(y, fit)| serde_json::json!({ "x": reference, "y": y, "fit": fit }))
            .collect();
        return ui::print_json(&serde_json::json!({
            "matrix": matrix_cells(&matrix),
            "sensitivity": sensitivity_table(&sensitivity),
            "regressions": regressions,
        }));
    }

    println!(
        "\n{}",
        ui::style_text("Correlation of Monthly Returns", ui::StyleType::Title)
    );
    let mut table = ui::new_styled_table();
    let mut header = vec![ui::header_cell("")];
    header.extend(matrix.ids.iter().map(|id| ui::header_cell(id.as_str())));
    table.set_header(header);
    for (i, id) in matrix.ids.iter().enumerate() {
        let mut row = vec![Cell::new(id).add_attribute(Attribute::Bold)];
        row.extend(matrix.values[i].iter().map(|r| ui::correlation_cell(*r)));
        table.add_row(row);
    }
    println!("{table}");

    if !sensitivity.rows.is_empty() && !sensitivity.drivers.is_empty() {
        println!(
            "\n{}",
            ui::style_text("Sensitivity to Macro Drivers", ui::StyleType::Title)
        );
        let mut table = ui::new_styled_table();
        let mut header = vec![ui::header_cell("Asset")];
        header.extend(sensitivity.drivers.iter().map(|d| ui::header_cell(d.as_str())));
        table.set_header(header);
        for row in &sensitivity.rows {
            let mut cells = vec![Cell::new(&row.asset)];
            cells.extend(row.vector.iter().map(|r| ui::correlation_cell(*r)));
            table.add_row(cells);
        }
        println!("{table}");
    }

    if !regressions.is_empty() {
        println!(
            "\n{} {}",
            ui::style_text("Regression", ui::StyleType::Title),
            ui::style_text(&format!("monthly returns vs {reference}"), ui::StyleType::Subtle)
        );
        let mut table = ui::new_styled_table();
        table.set_header(vec![
            ui::header_cell("Series"),
            ui::header_cell("Beta"),
            ui::header_cell("R²"),
            ui::header_cell("Months"),
        ]);
        for (id, fit) in &regressions {
            table.add_row(vec![
                Cell::new(id),
                ui::format_optional_cell(fit.map(|f| f.beta), |v| format!("{v:.3}")),
                ui::format_optional_cell(fit.map(|f| f.r_squared), |v| format!("{v:.3}")),
                ui::format_optional_cell(fit.map(|f| f.n), |v| v.to_string()),
            ]);
        }
        println!("{table}");
    }
    Ok(())
}

/// Rolling correlation of one pair over the request's window.
pub async fn run_rolling(
    config: &AppConfig,
    session: &Session,
    options: &ViewOptions,
    pair: Option<(String, String)>,
) -> Result<()> {
    let request = resolve_request(config, session, options)?;
    let (a, b) = pair_of(config, &request, pair)?;
    let request = request.including(&[a.clone(), b.clone()]);
    prefetch(session, &request).await?;
    report_annotations(&*session.dataset(&request).await?);
    let rolling = session.rolling_correlation(&request, &a, &b).await?;

    if options.json {
        return ui::print_json(&*rolling);
    }

    println!(
        "\n{} {}",
        ui::style_text(&format!("Rolling Correlation: {a} vs {b}"), ui::StyleType::Title),
        ui::style_text(&format!("window {}", rolling.window), ui::StyleType::Subtle)
    );
    let values: Vec<f64> = rolling.points.iter().map(|(_, r)| *r).collect();
    let latest = rolling.points.last();
    let min = rolling
        .points
        .iter()
        .min_by(|x, y| x.1.total_cmp(&y.1));
    let max = rolling
        .points
        .iter()
        .max_by(|x, y| x.1.total_cmp(&y.1));

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Statistic"),
        ui::header_cell("Date"),
        ui::header_cell("Correlation"),
    ]);
    for (label, point) in [("Latest", latest), ("Lowest", min), ("Highest", max)] {
        table.add_row(vec![
            Cell::new(label),
            ui::format_optional_cell(point, |(d, _)| d.to_string()),
            ui::correlation_cell(point.map(|(_, r)| *r)),
        ]);
    }
    table.add_row(vec![
        Cell::new("Average"),
        Cell::new(format!("{} windows", values.len())).set_alignment(CellAlignment::Right),
        ui::correlation_cell(mean(&values)),
    ]);
    println!("{table}");
    Ok(())
}

/// Scans lead/lag offsets between one pair and reports the strongest alignment.
pub async fn run_lag(
    config: &AppConfig,
    session: &Session,
    options: &ViewOptions,
    pair: Option<(String, String)>,
    min: Option<i64>,
    max: Option<i64>,
) -> Result<()> {
    let request = resolve_request(config, session, options)?;
    let (a, b) = pair_of(config, &request, pair)?;
    let request = request.including(&[a.clone(), b.clone()]);
    prefetch(session, &request).await?;
    let dataset = session.dataset(&request.unshifted()).await?;
    report_annotations(&dataset);
    // Configured bounds shrink to the available history; explicit ones are checked as given
    let months = i64::try_from(monthly_returns(&dataset).len()).unwrap_or(i64::MAX);
    let defaults = session.settings().lag_range;
    let range = LagRange::new(
        min.unwrap_or(defaults.min.max(-months)),
        max.unwrap_or(defaults.max.min(months)),
    )?;
    let scan = session.lag_scan(&request, &a, &b, range).await?;

    if options.json {
        return ui::print_json(&*scan);
    }

    println!(
        "\n{} {}",
        ui::style_text(&format!("Lead/Lag Scan: {a} vs {b}"), ui::StyleType::Title),
        ui::style_text(
            &format!("monthly returns, k = {}..{} months", range.min, range.max),
            ui::StyleType::Subtle
        )
    );
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("k"),
        ui::header_cell("Correlation"),
        ui::header_cell("Months"),
    ]);
    let best_k = scan.best.map(|p| p.k);
    for point in &scan.results {
        let mut k = Cell::new(point.k).set_alignment(CellAlignment::Right);
        if Some(point.k) == best_k {
            k = k.add_attribute(Attribute::Bold);
        }
        table.add_row(vec![
            k,
            ui::correlation_cell(point.correlation),
            Cell::new(point.n).set_alignment(CellAlignment::Right),
        ]);
    }
    println!("{table}");

    match scan.best {
        Some(best) => println!(
            "{} {}",
            ui::style_text("Best lag:", ui::StyleType::TotalLabel),
            ui::style_text(
                &format!(
                    "k = {} ({} shifted {} month(s)), r = {:+.2}",
                    best.k,
                    b,
                    best.k,
                    best.correlation.unwrap_or_default()
                ),
                ui::StyleType::TotalValue
            )
        ),
        None => println!(
            "{}",
            ui::style_text("No lag produced a defined correlation.", ui::StyleType::Error)
        ),
    }
    Ok(())
}
