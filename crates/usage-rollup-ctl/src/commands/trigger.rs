use anyhow::Result;
use serde::Deserialize;
use serde_json::Value;

use super::window::parse_instant;
use crate::client::ApiClient;

const ADMIN_SECRET_HEADER: &str = "x-admin-secret";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TriggerResponse {
    week_start: String,
    week_end: String,
    written: u64,
    skipped: u64,
    #[serde(default)]
    stale: u64,
    failed: u64,
    #[serde(default)]
    unattempted: u64,
    truncated: bool,
}

pub async fn run(server: &str, secret: &str, at: Option<&str>) -> Result<()> {
    let client = ApiClient::new(server)?;

    let mut request = client.post("/v1/admin/aggregate-weekly").header(ADMIN_SECRET_HEADER, secret);
    if let Some(at) = at {
        // Validate locally before sending
        let at = parse_instant(at)?.to_rfc3339();
        request = request.query(&[("at", at)]);
    }

    let report: TriggerResponse = client.send(request).await?;

    println!("Weekly aggregation {} .. {}", report.week_start, report.week_end);
    println!("  written:     {}", report.written);
    println!("  skipped:     {}", report.skipped);
    if report.stale > 0 {
        println!("  stale:       {}", report.stale);
    }
    println!("  failed:      {}", report.failed);
    if report.truncated {
        println!("  truncated:   {} users not processed, re-run to finish", report.unattempted);
    }
    Ok(())
}

pub async fn health(server: &str) -> Result<()> {
    let client = ApiClient::new(server)?;
    let response = client.get("/health").send().await?;
    let status = response.status();
    let body: Value = response.json().await.unwrap_or(Value::Null);

    println!("Server: {}", status);
    if let Some(store) = body.get("store").and_then(Value::as_str) {
        println!("Store:  {}", store);
    }

    if !status.is_success() {
        anyhow::bail!("Server is not healthy");
    }
    Ok(())
}
