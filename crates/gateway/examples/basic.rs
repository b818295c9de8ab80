//! Basic example: route a few notifications to Slack through the log sender.
//!
//! Run with: `cargo run -p herald-gateway --example basic`

use std::sync::Arc;

use herald_core::{Notification, NotificationTypeDefinition, NotificationTypeRegistry};
use herald_gateway::{GatewayBuilder, HeraldConfig};
use herald_provider::LogSender;
use herald_slack::SlackFormatter;
use serde_json::json;
use tracing_subscriber::EnvFilter;

const CONFIG: &str = r#"
[batch]
chunk_size = 2

[routing.endpoints.slack]
ci = "https://hooks.slack.com/services/T000/B000/CI"
ops = "https://hooks.slack.com/services/T000/B000/OPS"

[[routing.types."build.failed"]]
platform = "slack"
endpoint_key = "ci"

[[routing.default]]
platform = "slack"
endpoint_key = "ops"
"#;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = HeraldConfig::from_toml_str(CONFIG).expect("invalid config");
    let types = Arc::new(NotificationTypeRegistry::new());

    let gateway = GatewayBuilder::new()
        .config(config)
        .type_registry(Arc::clone(&types))
        .notification_type(
            NotificationTypeDefinition::new(
                "build.failed",
                "Build failed",
                "A pipeline run failed.",
                "ci",
            )
            .expect("invalid type"),
        )
        .notification_type(
            NotificationTypeDefinition::new(
                "deploy.finished",
                "Deploy finished",
                "A deployment completed.",
                "ops",
            )
            .expect("invalid type"),
        )
        .fallback_formatter("slack", Arc::new(SlackFormatter::new(types)))
        .sender(Arc::new(LogSender::new("slack")))
        .build()
        .expect("failed to build gateway");

    // Synchronous dispatch reports one result per target.
    let failed = Notification::builder("build.failed", "ci")
        .context(json!({ "message": "main #42 is red" }))
        .build()
        .expect("invalid notification");
    for report in gateway.dispatch(&failed).await {
        println!(
            "{} -> delivered: {} (attempts: {})",
            report.target.resource_key(),
            report.is_delivered(),
            report.attempts
        );
    }

    // Batches go through the execution pool in chunks.
    let batch = (1..=5)
        .map(|n| {
            Notification::builder("deploy.finished", "ops")
                .context(json!({ "message": format!("release {n} is live") }))
                .build()
                .expect("invalid notification")
        })
        .collect();
    let result = gateway.publish_all(batch).await.expect("publish failed");
    println!(
        "published {}/{} in {} chunks",
        result.published, result.total, result.chunks_completed
    );

    gateway.shutdown().await;

    let health = gateway.health().await.expect("health check failed");
    println!("health: {}", health.status);
}
