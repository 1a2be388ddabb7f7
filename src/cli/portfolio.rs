use super::ui;
use super::view::{prefetch, report_annotations, resolve_request};
use crate::ViewOptions;
use crate::core::config::AppConfig;
use crate::core::series::{Point, Series, SeriesId};
use crate::engine::insights::{cagr_over, total_return};
use crate::engine::portfolio::Basket;
use crate::session::{AnalysisRequest, Session};
use anyhow::{Context, Result, anyhow, bail};
use comfy_table::{Attribute, Cell, CellAlignment};
use serde::Serialize;
use tracing::info;

/// Parses `NAME=WEIGHT`, e.g. `Gold=60`.
fn parse_weight(config: &AppConfig, text: &str) -> Result<(SeriesId, f64)> {
    let (name, weight) = text
        .rsplit_once('=')
        .ok_or_else(|| anyhow!("Invalid weight '{}', expected NAME=WEIGHT", text))?;
    let weight: f64 = weight
        .trim()
        .parse()
        .with_context(|| format!("Invalid weight value in '{text}'"))?;
    Ok((config.series_spec(name)?.id.clone(), weight))
}

fn resolve_basket(
    config: &AppConfig,
    options: &ViewOptions,
    basket: Option<&str>,
    weights: &[String],
) -> Result<Basket> {
    if let Some(name) = basket {
        return Ok(config.basket(name)?);
    }
    if weights.is_empty() {
        bail!("Pass --basket NAME or at least one --weight NAME=WEIGHT");
    }
    let pairs = weights
        .iter()
        .map(|w| parse_weight(config, w))
        .collect::<Result<Vec<_>>>()?;
    let denominator = options
        .denominator
        .as_deref()
        .map(|d| config.series_spec(d).map(|s| s.id.clone()))
        .transpose()?;
    Ok(Basket::new(pairs, denominator)?)
}

#[derive(Serialize)]
struct PortfolioReport<'a> {
    name: &'a SeriesId,
    weights: &'a [(SeriesId, f64)],
    denominator: Option<&'a SeriesId>,
    total_return: Option<f64>,
    cagr: Option<f64>,
    points: &'a [Point],
}

fn composite_stats(series: &Series) -> (Option<f64>, Option<f64>) {
    let (Some(first), Some(last)) = (series.points().first(), series.points().last()) else {
        return (None, None);
    };
    let total = (first.value != 0.0).then(|| last.value / first.value - 1.0);
    let days = (last.date - first.date).num_days();
    (total, cagr_over(first.value, last.value, days))
}

/// Simulates a weighted basket and compares it with its members.
pub async fn run(
    config: &AppConfig,
    session: &Session,
    options: &ViewOptions,
    basket: Option<&str>,
    weights: &[String],
) -> Result<()> {
    let basket = resolve_basket(config, options, basket, weights)?;
    let mut view = options.clone();
    if view.series.is_empty() && view.story.is_none() {
        view.series = basket.assets().iter().map(|id| id.to_string()).collect();
    }
    let request = resolve_request(config, session, &view)?;
    let members = AnalysisRequest {
        series: basket.assets(),
        denominator: basket.denominator().cloned(),
        shift: 0,
        ..request.clone()
    };
    prefetch(session, &members).await?;
    let dataset = session.dataset(&members).await?;
    report_annotations(&dataset);

    let composite = session.portfolio(&request, &basket).await?;
    let (total, cagr) = composite_stats(&composite);
    info!(basket = %basket.name(), points = composite.len(), "Simulated portfolio");

    if options.json {
        return ui::print_json(&PortfolioReport {
            name: basket.name(),
            weights: basket.weights(),
            denominator: basket.denominator(),
            total_return: total,
            cagr,
            points: composite.points(),
        });
    }

    let subtitle = match basket.denominator() {
        Some(d) => format!("priced in {d}"),
        None => "Index=100".to_string(),
    };
    println!(
        "\n{} {}",
        ui::style_text(&format!("Portfolio: {}", basket.name()), ui::StyleType::Title),
        ui::style_text(&subtitle, ui::StyleType::Subtle)
    );

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Asset"),
        ui::header_cell("Weight"),
        ui::header_cell("Return"),
    ]);
    for (asset, weight) in basket.weights() {
        table.add_row(vec![
            Cell::new(asset),
            Cell::new(format!("{:.1}%", weight * 100.0)).set_alignment(CellAlignment::Right),
            dataset
                .column(asset)
                .and_then(total_return)
                .map_or_else(|| ui::na_cell(true), ui::change_cell),
        ]);
    }
    table.add_row(vec![
        Cell::new("Portfolio").add_attribute(Attribute::Bold),
        Cell::new("100.0%").set_alignment(CellAlignment::Right),
        total.map_or_else(|| ui::na_cell(false), ui::change_cell),
    ]);
    println!("{table}");

    if let (Some(first), Some(last)) = (composite.first_date(), composite.last_date()) {
        println!(
            "{} {}",
            ui::style_text(&format!("{first} to {last}, CAGR:"), ui::StyleType::TotalLabel),
            ui::style_text(
                &cagr.map_or("N/A".to_string(), |c| format!("{:.2}%", c * 100.0)),
                ui::StyleType::TotalValue
            )
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AppConfig {
        serde_yaml::from_str(
            r#"
series:
  - { name: Gold, symbol: "GC=F", source: yahoo, category: asset, frequency: daily }
  - { name: "S&P 500", symbol: "^GSPC", source: yahoo, category: asset, frequency: daily }
baskets:
  - name: "60/40"
    weights: { "S&P 500": 60, Gold: 40 }
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_parse_weight() {
        let config = config();
        assert_eq!(
            parse_weight(&config, "gc=f=25").unwrap(),
            (SeriesId::from("Gold"), 25.0)
        );
        assert!(parse_weight(&config, "Gold").is_err());
        assert!(parse_weight(&config, "Gold=lots").is_err());
        assert!(parse_weight(&config, "Platinum=1").is_err());
    }

    #[test]
    fn test_resolve_basket() {
        let config = config();
        let options = ViewOptions::default();
        let named = resolve_basket(&config, &options, Some("60/40"), &[]).unwrap();
        assert_eq!(named.name(), &SeriesId::from("60/40"));

        let adhoc = resolve_basket(
            &config,
            &options,
            None,
            &["Gold=1".to_string(), "S&P 500=3".to_string()],
        )
        .unwrap();
        assert_eq!(
            adhoc.weights(),
            &[(SeriesId::from("Gold"), 0.25), (SeriesId::from("S&P 500"), 0.75)]
        );

        assert!(resolve_basket(&config, &options, None, &[]).is_err());
    }
}
