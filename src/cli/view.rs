//! Turns command-line view options into an analysis request.

use super::ui;
use crate::ViewOptions;
use crate::core::config::AppConfig;
use crate::core::series::SeriesId;
use crate::engine::dataset::AlignedDataset;
use crate::session::{AnalysisRequest, Session};
use anyhow::{Result, bail};
use tracing::warn;

fn resolve_id(config: &AppConfig, name: &str) -> Result<SeriesId> {
    Ok(config.series_spec(name)?.id.clone())
}

/// Builds the request: story presets first, then explicit flags on top.
pub fn resolve_request(
    config: &AppConfig,
    session: &Session,
    options: &ViewOptions,
) -> Result<AnalysisRequest> {
    let mut request = session.request(Vec::new());

    if let Some(name) = &options.story {
        let story = config.story(name)?;
        request.series = story
            .series()
            .iter()
            .map(|id| config.canonical_id(id))
            .collect();
        if let Some(range) = story.range {
            request.range = range;
        }
        if let Some(mode) = story.mode {
            request.mode = mode;
        }
        request.denominator = story.denominator.as_ref().map(|d| config.canonical_id(d));
    }

    if !options.series.is_empty() {
        request.series = options
            .series
            .iter()
            .map(|name| resolve_id(config, name))
            .collect::<Result<_>>()?;
    }
    if request.series.is_empty() {
        bail!("No series selected; pass --series or --story");
    }

    if let Some(range) = options.range {
        request.range = range;
    }
    if let Some(mode) = options.mode {
        request.mode = mode;
    }
    if let Some(window) = options.window {
        request.window = window;
    }
    if let Some(denominator) = &options.denominator {
        request.denominator = Some(resolve_id(config, denominator)?);
    }
    request.shift = options.shift;
    Ok(request)
}

/// Loads every series the request needs, with a progress bar.
pub async fn prefetch(session: &Session, request: &AnalysisRequest) -> Result<()> {
    let ids = request.including(request.denominator.as_slice()).series;
    let pb = ui::new_progress_bar(ids.len() as u64, true);
    pb.set_message("Loading series");
    let loaded = session
        .prefetch(&ids, |spec| {
            pb.set_message(spec.id.to_string());
            pb.inc(1);
        })
        .await?;
    pb.finish_and_clear();
    if loaded < ids.len() {
        warn!(loaded, requested = ids.len(), "Some series failed to load");
    }
    Ok(())
}

/// Prints dataset annotations (failed fetches, clipped values) to stderr.
pub fn report_annotations(dataset: &AlignedDataset) {
    for annotation in dataset.annotations() {
        eprintln!(
            "{}",
            ui::style_text(&format!("⚠ {annotation}"), ui::StyleType::Error)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::range::RangePreset;
    use crate::engine::normalize::NormalizationMode;

    const YAML: &str = r#"
series:
  - { name: "M2 Money Supply", symbol: M2SL, source: fred, category: macro, frequency: monthly }
  - { name: Gold, symbol: "GC=F", source: yahoo, category: asset, frequency: daily }
  - { name: Bitcoin, symbol: BTC-USD, source: yahoo, category: asset, frequency: daily }
stories:
  - name: "Money Printer (COVID)"
    references: ["M2 Money Supply"]
    assets: [Bitcoin, Gold]
    range: "2020-01-01..2024-01-01"
    mode: log
"#;

    fn setup() -> (AppConfig, Session) {
        let config: AppConfig = serde_yaml::from_str(YAML).unwrap();
        let session = Session::from_config(&config);
        (config, session)
    }

    #[test]
    fn test_story_then_flags() {
        let (config, session) = setup();
        let options = ViewOptions {
            story: Some("money printer (covid)".to_string()),
            window: Some(30),
            ..ViewOptions::default()
        };
        let request = resolve_request(&config, &session, &options).unwrap();
        assert_eq!(
            request.series,
            vec![
                SeriesId::from("M2 Money Supply"),
                SeriesId::from("Bitcoin"),
                SeriesId::from("Gold")
            ]
        );
        assert_eq!(request.mode, NormalizationMode::Log);
        assert!(matches!(request.range, RangePreset::Custom { .. }));
        assert_eq!(request.window, 30);

        let options = ViewOptions {
            series: vec!["gc=f".to_string()],
            mode: Some(NormalizationMode::Raw),
            ..options
        };
        let request = resolve_request(&config, &session, &options).unwrap();
        assert_eq!(request.series, vec![SeriesId::from("Gold")]);
        assert_eq!(request.mode, NormalizationMode::Raw);
    }

    #[test]
    fn test_empty_or_unknown_selection() {
        let (config, session) = setup();
        let err = resolve_request(&config, &session, &ViewOptions::default()).unwrap_err();
        assert!(err.to_string().contains("No series selected"));

        let options = ViewOptions {
            series: vec!["Platinum".to_string()],
            ..ViewOptions::default()
        };
        assert!(resolve_request(&config, &session, &options).is_err());
    }
}
