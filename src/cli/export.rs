use super::view::{prefetch, report_annotations, resolve_request};
use crate::ViewOptions;
use crate::core::config::AppConfig;
use crate::export::to_csv;
use crate::session::Session;
use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Writes the aligned view as CSV to `output`, or to stdout.
pub async fn run(
    config: &AppConfig,
    session: &Session,
    options: &ViewOptions,
    output: Option<&Path>,
) -> Result<()> {
    let request = resolve_request(config, session, options)?;
    prefetch(session, &request).await?;
    let view = session.view(&request).await?;
    report_annotations(&view);
    let bytes = to_csv(&view)?;

    match output {
        Some(path) => {
            std::fs::write(path, &bytes)
                .with_context(|| format!("Failed to write CSV to {}", path.display()))?;
            info!(path = %path.display(), rows = view.len(), "Exported dataset");
            println!("Exported {} rows to {}", view.len(), path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes)?;
            stdout.flush()?;
        }
    }
    Ok(())
}
