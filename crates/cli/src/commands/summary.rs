//! Cluster-wide summary of a measurement window

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use colored::Colorize;

use crate::client::ExporterClient;
use crate::output::{
    color_delta, format_bytes, format_cpu, format_seconds, or_dash, print_info, print_json,
    OutputFormat,
};

/// Parse an RFC 3339 `--since` value into epoch seconds
pub fn parse_since(since: &str) -> Result<f64> {
    let parsed = DateTime::parse_from_rfc3339(since)
        .with_context(|| format!("Invalid --since timestamp: {}", since))?;
    Ok(parsed.timestamp_micros() as f64 / 1e6)
}

fn format_epoch(seconds: f64) -> String {
    Utc.timestamp_opt(seconds.trunc() as i64, 0)
        .single()
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| format!("{:.0}", seconds))
}

pub async fn show_summary(
    client: &ExporterClient,
    since: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let since = since.as_deref().map(parse_since).transpose()?;
    let summary = client.snapshot().await?.summary(since);

    match format {
        OutputFormat::Json => print_json(&summary)?,
        OutputFormat::Table => {
            println!("{}", "Serverless Summary".bold());
            println!("{}", "=".repeat(50));
            println!("Functions:              {}", summary.functions);
            println!("Pods:                   {}", summary.pods);
            println!(
                "Scaled difference:      {}",
                color_delta(summary.scaled_pods_difference)
            );
            println!();

            println!("{}", "Cluster Usage".bold());
            println!("{}", "-".repeat(50));
            println!(
                "CPU:                    {}",
                format_cpu(summary.cluster_cpu_millicores)
            );
            println!(
                "Memory:                 {}",
                format_bytes(summary.cluster_memory_bytes)
            );
            println!();

            println!("{}", "Cold Starts".bold());
            println!("{}", "-".repeat(50));
            println!(
                "Window start:           {}",
                or_dash(summary.benchmark_start, format_epoch)
            );
            println!("Cold starts:            {}", summary.cold_starts);
            println!(
                "Average:                {}",
                or_dash(summary.avg_cold_start_seconds, format_seconds).cyan()
            );

            if summary.benchmark_start.is_none() {
                println!();
                print_info("No window start known; pass --since to measure cold starts");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_since() {
        assert_eq!(parse_since("1970-01-01T00:16:40Z").unwrap(), 1000.0);
        assert_eq!(parse_since("1970-01-01T00:16:40.5Z").unwrap(), 1000.5);
        assert!(parse_since("yesterday").is_err());
    }

    #[test]
    fn test_format_epoch() {
        assert_eq!(format_epoch(1000.0), "1970-01-01T00:16:40+00:00");
    }
}
