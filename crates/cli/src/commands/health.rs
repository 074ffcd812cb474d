//! Health and readiness command

use anyhow::Result;
use colored::Colorize;
use serde_json::json;
use tabled::Tabled;

use crate::client::{ApiClient, HealthResponse, ReadinessResponse};
use crate::output::{color_status, format_unix_timestamp, print_json, print_warning, OutputFormat};

#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
    #[tabled(rename = "Updated")]
    updated: String,
}

/// Show overall health, readiness and per-component status
pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health: HealthResponse = client.probe("healthz").await?;
    let readiness: ReadinessResponse = client.probe("readyz").await?;

    match format {
        OutputFormat::Json => print_json(&json!({
            "health": health,
            "readiness": readiness,
        })),
        OutputFormat::Table => {
            println!("{}", "Rebalancer Health".bold());
            println!("{}", "=".repeat(50));
            println!("Status:  {}", color_status(&health.status));

            let ready = if readiness.ready { "ready" } else { "not ready" };
            println!("Ready:   {}", color_status(ready));
            if let Some(reason) = &readiness.reason {
                print_warning(reason);
            }
            println!();

            let mut names: Vec<&String> = health.components.keys().collect();
            names.sort();
            let rows: Vec<ComponentRow> = names
                .into_iter()
                .map(|name| {
                    let component = &health.components[name];
                    ComponentRow {
                        name: name.clone(),
                        status: color_status(&component.status),
                        message: component.message.clone().unwrap_or_default(),
                        updated: format_unix_timestamp(component.updated_at),
                    }
                })
                .collect();

            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
        }
    }

    Ok(())
}
