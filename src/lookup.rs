//! Public address lookup, done once at startup.

use std::time::Duration;

use tracing::{info, warn};

/// Reported when the address could not be resolved.
pub const UNKNOWN_ADDRESS: &str = "unknown";

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Fetch the host's public address from a plain-text echo service.
///
/// Never fails; problems are logged and yield [`UNKNOWN_ADDRESS`].
pub async fn public_ip(url: &str) -> String {
    match fetch(url).await {
        Ok(address) if !address.is_empty() => {
            info!("Public address: {}", address);
            address
        }
        Ok(_) => {
            warn!("Address service at {} returned an empty body", url);
            UNKNOWN_ADDRESS.to_string()
        }
        Err(e) => {
            warn!("Could not resolve public address from {}: {}", url, e);
            UNKNOWN_ADDRESS.to_string()
        }
    }
}

async fn fetch(url: &str) -> reqwest::Result<String> {
    let client = reqwest::Client::builder().timeout(LOOKUP_TIMEOUT).build()?;
    let body = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    Ok(body.trim().to_string())
}
