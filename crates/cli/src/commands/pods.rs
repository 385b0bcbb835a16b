//! Per-pod boot duration and resource usage

use anyhow::Result;
use tabled::Tabled;

use crate::client::ExporterClient;
use crate::output::{
    format_bytes, format_cpu, format_seconds, or_dash, print_json, print_table, print_warning,
    OutputFormat,
};
use crate::report::PodEntry;

/// Row for pods table
#[derive(Tabled)]
struct PodRow {
    #[tabled(rename = "Namespace")]
    namespace: String,
    #[tabled(rename = "Pod")]
    pod: String,
    #[tabled(rename = "Function")]
    function: String,
    #[tabled(rename = "Boot")]
    boot: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Memory")]
    memory: String,
}

pub async fn show_pods(
    client: &ExporterClient,
    function: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let snapshot = client.snapshot().await?;

    let pods: Vec<&PodEntry> = match &function {
        Some(f) => snapshot.pods_of(f).collect(),
        None => snapshot.pods.iter().collect(),
    };

    match format {
        OutputFormat::Json => print_json(&pods)?,
        OutputFormat::Table => {
            if pods.is_empty() {
                print_warning("No function pods found");
                return Ok(());
            }

            let rows: Vec<PodRow> = pods
                .iter()
                .map(|p| PodRow {
                    namespace: p.namespace.clone(),
                    pod: p.pod.clone(),
                    function: p.function.clone(),
                    boot: or_dash(p.boot_seconds, format_seconds),
                    cpu: or_dash(p.cpu_millicores, format_cpu),
                    memory: or_dash(p.memory_bytes, format_bytes),
                })
                .collect();

            print_table(&rows);
        }
    }

    Ok(())
}
