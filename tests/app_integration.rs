use std::fs;
use tracing::info;
use xasset::{AppCommand, ViewOptions};

mod test_utils {
    use chrono::{Datelike, Duration, NaiveDate, NaiveTime};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Monthly M2 observations for 2020-2023, growing 0.5% a month.
    pub fn fred_csv() -> String {
        let mut body = String::from("observation_date,M2SL\n");
        let mut value = 15_000.0;
        for year in 2020..2024 {
            for month in 1..=12 {
                body.push_str(&format!("{year}-{month:02}-01,{value:.1}\n"));
                value *= 1.005;
            }
        }
        body
    }

    /// Daily closes for 2020-2023 with a weekly wobble on top of a trend.
    pub fn yahoo_chart() -> String {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let mut timestamps = Vec::new();
        let mut closes = Vec::new();
        for day in 0..1461 {
            let date = start + Duration::days(day);
            timestamps.push(date.and_time(NaiveTime::MIN).and_utc().timestamp());
            let wobble = f64::from(date.weekday().num_days_from_monday()) * 10.0;
            closes.push(7_000.0 + day as f64 * 20.0 + wobble);
        }
        serde_json::json!({
            "chart": {
                "result": [{
                    "timestamp": timestamps,
                    "indicators": {
                        "quote": [{ "close": closes }],
                        "adjclose": [{ "adjclose": closes }]
                    }
                }],
                "error": null
            }
        })
        .to_string()
    }

    pub async fn create_mock_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/graph/fredgraph.csv"))
            .and(query_param("id", "M2SL"))
            .respond_with(ResponseTemplate::new(200).set_body_string(fred_csv()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/BTC-USD"))
            .respond_with(ResponseTemplate::new(200).set_body_string(yahoo_chart()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/SI-USD"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        server
    }

    pub fn config_yaml(base_url: &str) -> String {
        format!(
            r#"
providers:
  fred:
    base_url: {base_url}
  yahoo:
    base_url: {base_url}
  retries: 0
  retry_delay_ms: 1
series:
  - {{ name: "M2 Money Supply", symbol: M2SL, source: fred, category: macro, frequency: monthly }}
  - {{ name: Bitcoin, symbol: BTC-USD, source: yahoo, category: asset, frequency: daily }}
  - {{ name: Silver, symbol: SI-USD, source: yahoo, category: asset, frequency: daily }}
analysis:
  range: MAX
  drivers: [m2sl]
  regime:
    series: "m2 money supply"
    lookback: 12
    threshold: 0.05
baskets:
  - name: "All In"
    weights: {{ "btc-usd": 60, bitcoin: 40 }}
stories:
  - name: "Money Printer"
    references: [M2SL]
    assets: [bitcoin]
    range: "2020-06-01..2023-06-01"
    mode: log
"#
        )
    }
}

fn view(series: &[&str]) -> ViewOptions {
    ViewOptions {
        series: series.iter().map(|s| s.to_string()).collect(),
        ..ViewOptions::default()
    }
}

async fn run(command: AppCommand, config_path: &std::path::Path) -> anyhow::Result<()> {
    xasset::run_command(command, Some(config_path.to_str().unwrap())).await
}

#[test_log::test(tokio::test)]
async fn test_full_app_flow_with_mock() {
    let server = test_utils::create_mock_server().await;
    let config_file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
    fs::write(config_file.path(), test_utils::config_yaml(&server.uri()))
        .expect("Failed to write config file");
    let config_path = config_file.path();

    let commands = vec![
        AppCommand::Compare(view(&["M2 Money Supply", "Bitcoin"])),
        AppCommand::Correlate(view(&["M2SL", "btc-usd"])),
        AppCommand::Rolling {
            view: view(&["M2 Money Supply", "Bitcoin"]),
            pair: None,
        },
        AppCommand::Lag {
            view: view(&["M2 Money Supply", "Bitcoin"]),
            pair: None,
            min: Some(-3),
            max: Some(3),
        },
        AppCommand::Overlay {
            view: view(&["Bitcoin"]),
            multiplier: None,
        },
        AppCommand::Portfolio {
            view: ViewOptions::default(),
            basket: Some("All In".to_string()),
            weights: Vec::new(),
        },
        AppCommand::Leaderboard {
            view: view(&["Bitcoin"]),
            reference: None,
            amount: 10_000.0,
            base_date: None,
        },
        AppCommand::Compare(ViewOptions {
            story: Some("Money Printer".to_string()),
            json: true,
            ..ViewOptions::default()
        }),
    ];

    for command in commands {
        info!(?command, "Running command");
        let result = run(command.clone(), config_path).await;
        assert!(
            result.is_ok(),
            "{command:?} failed with: {:?}",
            result.err()
        );
    }
}

#[test_log::test(tokio::test)]
async fn test_export_writes_aligned_csv() {
    let server = test_utils::create_mock_server().await;
    let dir = tempfile::TempDir::new().unwrap();
    let config_path = dir.path().join("config.yaml");
    fs::write(&config_path, test_utils::config_yaml(&server.uri())).unwrap();
    let output = dir.path().join("out.csv");

    run(
        AppCommand::Export {
            view: ViewOptions {
                range: Some("2021-01-01..2021-12-31".parse().unwrap()),
                ..view(&["M2 Money Supply", "Bitcoin"])
            },
            output: Some(output.clone()),
        },
        &config_path,
    )
    .await
    .unwrap();

    let text = fs::read_to_string(&output).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("date,M2 Money Supply,Bitcoin"));
    let first: Vec<&str> = lines.next().unwrap().split(',').collect();
    assert_eq!(first[0], "2021-01-01");
    // Index=100 rebases both columns on the first date of the window
    assert_eq!(first[1], "100");
    assert_eq!(first[2], "100");
    // Daily grid for the whole year
    assert_eq!(text.lines().count(), 1 + 365);
    assert!(text.trim_end().ends_with(|c: char| c.is_ascii_digit()));
    assert!(text.contains("\n2021-12-31,"));
}

#[test_log::test(tokio::test)]
async fn test_failed_series_does_not_fail_the_view() {
    let server = test_utils::create_mock_server().await;
    let config_file = tempfile::NamedTempFile::new().unwrap();
    fs::write(config_file.path(), test_utils::config_yaml(&server.uri())).unwrap();

    let result = run(
        AppCommand::Compare(view(&["Bitcoin", "Silver"])),
        config_file.path(),
    )
    .await;
    assert!(result.is_ok(), "partial view failed: {:?}", result.err());

    // Nothing loads: the provider error surfaces
    let result = run(AppCommand::Compare(view(&["Silver"])), config_file.path()).await;
    assert!(result.is_err());
}

#[test_log::test(tokio::test)]
async fn test_unknown_series_and_missing_config() {
    let server = test_utils::create_mock_server().await;
    let config_file = tempfile::NamedTempFile::new().unwrap();
    fs::write(config_file.path(), test_utils::config_yaml(&server.uri())).unwrap();

    let err = run(AppCommand::Compare(view(&["Platinum"])), config_file.path())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Platinum"), "{err}");

    let dir = tempfile::TempDir::new().unwrap();
    let err = run(
        AppCommand::Compare(view(&["Bitcoin"])),
        &dir.path().join("missing.yaml"),
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}
