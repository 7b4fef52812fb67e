//! Ledger server binary
//!
//! Reads JSON lines on stdin. Each line is either a command or a record to
//! append:
//!
//! ```text
//! {"amt": 100, "op": "xfer"}                    append a record
//! {"append": {...}, "extra": {"btype": "1xfer"}} append with extra fields
//! {"get_range": [0, 10]}                         fetch blocks, following archives
//! {"archives": null}                             list archive units
//! {"tip": null}                                  certified tip
//! {"metrics": null}                              Prometheus text
//! ```

use anyhow::Context;
use ledger_engine::{archive::MemoryProvisioner, BlockRange, Config, Ledger, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing; stdout carries responses, so logs go to stderr
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());
    if std::env::var_os("LEDGER_LOG_JSON").is_some() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    tracing::info!("Starting ledger server");

    // Load configuration
    let config = match std::env::var("LEDGER_CONFIG") {
        Ok(path) => Config::from_file(&path).with_context(|| format!("loading {}", path))?,
        Err(_) => Config::from_env().context("reading LEDGER_* environment")?,
    };

    let provisioner = Arc::new(MemoryProvisioner::new(config.provisioner.budget));
    let ledger = Ledger::open(config, provisioner).await?;
    tracing::info!("Ledger opened successfully");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match handle_line(&ledger, &line).await {
                    Ok(output) => println!("{}", output),
                    Err(e) => {
                        tracing::warn!(error = %e, "Request failed");
                        println!("{}", serde_json::json!({ "error": e.to_string() }));
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    tracing::info!("Shutting down ledger server");
    ledger.wait_idle().await?;
    ledger.shutdown().await?;
    Ok(())
}

async fn handle_line(ledger: &Ledger, line: &str) -> anyhow::Result<String> {
    let json: serde_json::Value = serde_json::from_str(line).context("invalid JSON")?;

    if let Some(window) = json.get("get_range") {
        let (start, length): (u64, u64) = serde_json::from_value(window.clone())
            .context("get_range expects [start, length]")?;
        let blocks = ledger.resolve_range(vec![BlockRange::new(start, length)]).await?;
        return Ok(serde_json::to_string(&blocks)?);
    }
    if json.get("archives").is_some() {
        return Ok(serde_json::to_string(&ledger.get_archive_units(None).await?)?);
    }
    if json.get("tip").is_some() {
        return Ok(serde_json::to_string(&ledger.get_tip_certificate().await?)?);
    }
    if json.get("metrics").is_some() {
        return Ok(ledger.metrics().render()?);
    }

    let (record, extra) = match json.get("append") {
        Some(record) => (
            Value::try_from(record.clone())?,
            json.get("extra").cloned().map(Value::try_from).transpose()?,
        ),
        None => (Value::try_from(json)?, None),
    };
    let index = ledger.append(record, extra).await?;
    Ok(serde_json::json!({ "index": index }).to_string())
}
