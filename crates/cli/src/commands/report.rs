//! Markdown benchmark report

use anyhow::Result;
use std::path::Path;

use crate::client::ExporterClient;
use crate::commands::summary::parse_since;
use crate::output::print_success;

pub async fn write_report(
    client: &ExporterClient,
    output: &Path,
    since: Option<String>,
) -> Result<()> {
    let since = since.as_deref().map(parse_since).transpose()?;
    let summary = client.snapshot().await?.summary(since);

    summary.write_markdown(output)?;
    print_success(&format!("Report written to {}", output.display()));

    Ok(())
}
