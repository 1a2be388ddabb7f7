use super::ui;
use super::view::{prefetch, report_annotations, resolve_request};
use crate::ViewOptions;
use crate::core::config::AppConfig;
use crate::engine::insights::{Leaderboard, PurchasingPower, RegimePhase, RegimeReport};
use crate::session::Session;
use anyhow::Result;
use chrono::NaiveDate;
use comfy_table::{Attribute, Cell, CellAlignment, Color};
use serde::Serialize;

#[derive(Serialize)]
struct InsightsReport<'a> {
    leaderboard: &'a Leaderboard,
    purchasing_power: Option<&'a PurchasingPower>,
    regimes: &'a RegimeReport,
}

fn print_leaderboard(board: &Leaderboard) {
    println!(
        "\n{} {}",
        ui::style_text("Real Return Leaderboard", ui::StyleType::Title),
        ui::style_text(
            &format!(
                "vs {} ({:+.2}%)",
                board.reference,
                board.reference_return * 100.0
            ),
            ui::StyleType::Subtle
        )
    );
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("#"),
        ui::header_cell("Asset"),
        ui::header_cell("Total Return"),
        ui::header_cell("Real Return"),
        ui::header_cell("CAGR"),
    ]);
    for (rank, entry) in board.entries.iter().enumerate() {
        let mut asset = Cell::new(&entry.asset);
        if entry.beat_reference {
            asset = asset.add_attribute(Attribute::Bold);
        }
        table.add_row(vec![
            Cell::new(rank + 1).set_alignment(CellAlignment::Right),
            asset,
            ui::change_cell(entry.total_return),
            ui::change_cell(entry.real_return),
            entry
                .cagr
                .map_or_else(|| ui::na_cell(false), ui::change_cell),
        ]);
    }
    println!("{table}");
}

fn print_purchasing_power(power: &PurchasingPower) {
    println!(
        "\n{} {}",
        ui::style_text("Purchasing Power", ui::StyleType::Title),
        ui::style_text(
            &format!("{:.2} held since {}", power.amount, power.base_date),
            ui::StyleType::Subtle
        )
    );
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Measured in"),
        ui::header_cell("Then"),
        ui::header_cell("Now"),
        ui::header_cell("Buys Today"),
        ui::header_cell("Change"),
    ]);
    for row in &power.rows {
        table.add_row(vec![
            Cell::new(&row.series),
            Cell::new(format!("{:.2}", row.start_value)).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.2}", row.end_value)).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.2}", row.current_value)).set_alignment(CellAlignment::Right),
            ui::change_cell(row.change),
        ]);
    }
    println!("{table}");
}

fn print_regimes(report: &RegimeReport) {
    println!(
        "\n{} {}",
        ui::style_text(&format!("Liquidity Regimes: {}", report.series), ui::StyleType::Title),
        ui::style_text(
            &format!(
                "growth over {} periods above {:.1}%",
                report.lookback,
                report.threshold * 100.0
            ),
            ui::StyleType::Subtle
        )
    );
    if report.spans.is_empty() {
        println!("No easy-money regimes in the selected range.");
    } else {
        let mut table = ui::new_styled_table();
        table.set_header(vec![
            ui::header_cell("Start"),
            ui::header_cell("End"),
            ui::header_cell("Days"),
        ]);
        for span in &report.spans {
            table.add_row(vec![
                Cell::new(span.start),
                Cell::new(span.end),
                Cell::new((span.end - span.start).num_days()).set_alignment(CellAlignment::Right),
            ]);
        }
        println!("{table}");
    }
    let color = match report.current {
        RegimePhase::EasyMoney => Color::Green,
        RegimePhase::Tightening => Color::Red,
    };
    let growth = report
        .current_growth
        .map_or("N/A".to_string(), |g| format!("{:+.2}%", g * 100.0));
    let mut table = ui::new_styled_table();
    table.add_row(vec![
        Cell::new("Current regime").add_attribute(Attribute::Bold),
        Cell::new(report.current).fg(color).add_attribute(Attribute::Bold),
        Cell::new(growth).set_alignment(CellAlignment::Right),
    ]);
    println!("{table}");
}

/// Leaderboard against a reference series, purchasing power of `amount` and liquidity regimes.
pub async fn run(
    config: &AppConfig,
    session: &Session,
    options: &ViewOptions,
    reference: Option<&str>,
    amount: f64,
    base_date: Option<NaiveDate>,
) -> Result<()> {
    let request = resolve_request(config, session, options)?;
    let reference = match reference {
        Some(name) => config.series_spec(name)?.id.clone(),
        None => session.settings().regime.series.clone(),
    };
    let request = request.unshifted().including(&[
        reference.clone(),
        session.settings().regime.series.clone(),
    ]);
    prefetch(session, &request).await?;
    let dataset = session.dataset(&request).await?;
    report_annotations(&dataset);

    let board = session.leaderboard(&request, &reference).await?;
    let power = match base_date.or_else(|| dataset.dates().first().copied()) {
        Some(date) => session.purchasing_power(&request, amount, date).await?,
        None => None,
    };
    let regimes = session.regimes(&request).await?;

    if options.json {
        return ui::print_json(&InsightsReport {
            leaderboard: &board,
            purchasing_power: power.as_ref(),
            regimes: &regimes,
        });
    }

    print_leaderboard(&board);
    if let Some(power) = &power {
        print_purchasing_power(power);
    }
    print_regimes(&regimes);
    Ok(())
}
