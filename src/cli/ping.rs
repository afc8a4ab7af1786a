//! Status check of the agent server's HTTP root.

use std::error::Error;
use std::time::Duration;

use tracing::debug;

use crate::api::StatusResponse;
use crate::utils::url::status_url_for;

pub async fn run_ping(endpoint: &str) -> Result<(), Box<dyn Error>> {
    let url = status_url_for(endpoint)?;
    debug!(%url, "Probing agent server");

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let response = match client.get(&url).send().await {
        Ok(response) => response,
        Err(err) => {
            eprintln!("❌ Agent server unreachable at {url}: {err}");
            std::process::exit(1);
        }
    };

    if !response.status().is_success() {
        eprintln!("❌ Agent server at {url} answered {}", response.status());
        std::process::exit(1);
    }

    let status: StatusResponse = response.json().await?;
    println!("✅ {url}: {}", status.message);
    Ok(())
}
