//! Per-function pod counts and scaling deltas

use anyhow::Result;
use tabled::Tabled;

use crate::client::ExporterClient;
use crate::output::{color_delta, or_dash, print_json, print_table, print_warning, OutputFormat};

/// Row for functions table
#[derive(Tabled)]
struct FunctionRow {
    #[tabled(rename = "Platform")]
    platform: String,
    #[tabled(rename = "Function")]
    function: String,
    #[tabled(rename = "Namespace")]
    namespace: String,
    #[tabled(rename = "Pods")]
    pods: i64,
    #[tabled(rename = "Scaled")]
    scaled: String,
}

pub async fn show_functions(
    client: &ExporterClient,
    platform: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let snapshot = client.snapshot().await?;

    let functions: Vec<_> = snapshot
        .functions
        .into_iter()
        .filter(|f| {
            platform
                .as_ref()
                .map(|p| f.platform.eq_ignore_ascii_case(p))
                .unwrap_or(true)
        })
        .collect();

    match format {
        OutputFormat::Json => print_json(&functions)?,
        OutputFormat::Table => {
            if functions.is_empty() {
                print_warning("No serverless functions found");
                return Ok(());
            }

            let rows: Vec<FunctionRow> = functions
                .iter()
                .map(|f| FunctionRow {
                    platform: f.platform.clone(),
                    function: f.function.clone(),
                    namespace: f.namespace.clone(),
                    pods: f.pods,
                    scaled: or_dash(f.scaled_difference, color_delta),
                })
                .collect();

            print_table(&rows);
        }
    }

    Ok(())
}
