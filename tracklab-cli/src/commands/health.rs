//! Health command handler

use anyhow::{Context, Result, bail};
use colored::*;

use crate::config::Config;

pub async fn handle_health_command(config: &Config) -> Result<()> {
    let client = config.client();
    let health = client
        .health()
        .await
        .with_context(|| format!("Backend at {} is unreachable", config.api_url))?;

    println!("{}", "Backend Health:".bold());
    println!("  Service:    {}", health.service.cyan());
    println!("  Status:     {}", availability(health.is_healthy(), &health.status));
    println!("  Database:   {}", service_state(health.database_available));
    println!("  ML service: {}", service_state(health.ml_service_available));

    if !health.is_healthy() {
        bail!("Backend reports status '{}'", health.status);
    }
    Ok(())
}

fn service_state(available: bool) -> ColoredString {
    if available {
        availability(true, "available")
    } else {
        availability(false, "unavailable")
    }
}

fn availability(ok: bool, text: &str) -> ColoredString {
    if ok { text.green() } else { text.red() }
}
