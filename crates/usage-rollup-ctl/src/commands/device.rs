use anyhow::{Context, Result};
use serde_json::Value;
use std::fs;
use std::path::Path;

use crate::client::ApiClient;

pub fn read_json(path: &Path) -> Result<Value> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse JSON in {:?}", path))
}

pub async fn push(server: &str, token: &str, file: &Path) -> Result<()> {
    let body = read_json(file)?;
    let client = ApiClient::new(server)?;

    let ack: Value =
        client.send(client.post("/v1/weekly-summaries").bearer_auth(token).json(&body)).await?;

    let week_start = ack.get("weekStart").and_then(Value::as_str).unwrap_or("?");
    if ack.get("applied").and_then(Value::as_bool) == Some(false) {
        println!("Push for week {} was skipped: the stored summary is newer", week_start);
    } else {
        println!("Pushed summary for week {}", week_start);
    }
    Ok(())
}

pub async fn upload(server: &str, token: &str, file: &Path) -> Result<()> {
    let body = read_json(file)?;
    let client = ApiClient::new(server)?;

    let ack: Value =
        client.send(client.put("/v1/daily-usage").bearer_auth(token).json(&body)).await?;

    println!("Recorded {} daily rows", ack.get("recorded").and_then(Value::as_u64).unwrap_or(0));
    Ok(())
}
