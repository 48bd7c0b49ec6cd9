//! Profile Refresh Example
//!
//! Fetches every facet of a user's profile from the directory and prints the
//! merged snapshot, including which facets failed.
//!
//! To run this example:
//! ```
//! PROFILE_DIRECTORY_ACCESS_TOKEN=your_token cargo run --example profile_refresh -- alice@contoso.com
//! ```

use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use profile_sdk::{
    config::{ConfigProviderExt, DEFAULT_PROVIDER},
    graph_client, AggregatorConfig, AggregatorState, FetchPolicy, FieldStatus, ProfileAggregator,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging; `log` records from the HTTP client are bridged in
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    let Some(user_id) = std::env::args().nth(1) else {
        eprintln!("Usage: profile_refresh <user id or userPrincipalName>");
        std::process::exit(2);
    };

    if DEFAULT_PROVIDER.get_string_or("directory_access_token", "").is_empty() {
        eprintln!("Please set PROFILE_DIRECTORY_ACCESS_TOKEN environment variable");
        std::process::exit(1);
    }

    let client = graph_client().build().context("building directory client")?;

    let config = AggregatorConfig::from_provider(&**DEFAULT_PROVIDER)?
        .with_facet_timeout(Duration::from_secs(10));
    let aggregator = ProfileAggregator::with_policy(client, FetchPolicy::from_config(&config));

    let mut states = aggregator.subscribe();
    let watcher = tokio::spawn(async move {
        while states.changed().await.is_ok() {
            match &*states.borrow_and_update() {
                AggregatorState::Refreshing { cycle, user_id } => println!("[cycle {}] refreshing {}", cycle, user_id),
                AggregatorState::Settled { cycle, .. } => println!("[cycle {}] settled", cycle),
                AggregatorState::Failed { cycle, error } => println!("[cycle {}] failed: {}", cycle, error),
                AggregatorState::Idle => println!("idle"),
            }
        }
    });

    let snapshot = aggregator.refresh(&user_id).await?;
    drop(aggregator);
    let _ = watcher.await;

    let user = snapshot.user();
    println!("\n{}", user.display_name);
    if let Some(title) = &user.job_title {
        println!("  Title:       {}", title);
    }
    if let Some(hired) = snapshot.hire_date() {
        println!("  Hired:       {}", hired);
    }
    if let Some(tags) = snapshot.tags() {
        println!("  Ask me:      {}", tags);
    }
    match snapshot.thumbnail() {
        Some(photo) => println!("  Photo:       {} bytes", photo.len()),
        None => println!("  Photo:       none"),
    }
    if let Some(manager) = snapshot.manager() {
        println!("  Manager:     {}", manager.display_name);
    }
    println!("  Reports:     {}", snapshot.direct_reports().len());
    println!("  Groups:      {}", snapshot.membership_groups().len());
    for file in snapshot.files().iter().take(5) {
        println!("  File:        {}", file.name);
    }

    println!("\nFacet status:");
    for (facet, status) in snapshot.field_status() {
        let marker = match status {
            FieldStatus::Ok => "ok",
            FieldStatus::Failed => "FAILED",
            FieldStatus::NotRequested => "-",
        };
        println!("  {:<18} {}", facet.to_string(), marker);
    }

    Ok(())
}
