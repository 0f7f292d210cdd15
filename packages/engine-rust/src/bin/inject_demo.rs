//! Pushes a burst of inbound messages through a small environment and
//! reports how many ran on the inbound pool versus inline on the caller.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::Parser;
use relaybus_core::properties::INBOUND_ENDPOINT_NAME;
use relaybus_core::{InboundEndpoint, MediationError, Mediator, MessageContext, Sequence};
use relaybus_engine::{init_tracing, InMemoryConfiguration, LogFormat, MediationEnvironment};
use serde_json::json;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "inject-demo", about = "Inject inbound messages into a relaybus environment")]
struct Cli {
    /// Number of messages to inject.
    #[arg(long, default_value_t = 10)]
    messages: usize,

    /// Inbound pool maximum thread count.
    #[arg(long, default_value_t = 2, env = "RELAYBUS_INBOUND_MAX_THREADS")]
    max_threads: usize,

    /// Inbound pool queue length.
    #[arg(long, default_value_t = 1, env = "RELAYBUS_INBOUND_QLEN")]
    queue_length: usize,

    /// Mediate every message on the caller instead of the inbound pool.
    #[arg(long)]
    sequential: bool,

    /// Simulated per-message work in milliseconds.
    #[arg(long, default_value_t = 100)]
    work_ms: u64,

    #[arg(long, default_value = "info", env = "RELAYBUS_LOG")]
    log_level: String,

    #[arg(long)]
    json_logs: bool,
}

/// Records which thread mediated the message, then simulates work.
struct Tally {
    pool_prefix: String,
    pooled: Arc<AtomicUsize>,
    inline: Arc<AtomicUsize>,
    work: Duration,
}

#[async_trait]
impl Mediator for Tally {
    async fn mediate(&self, ctx: &mut MessageContext) -> Result<bool, MediationError> {
        let thread = std::thread::current().name().unwrap_or("unnamed").to_string();
        if thread.starts_with(&self.pool_prefix) {
            self.pooled.fetch_add(1, Ordering::SeqCst);
        } else {
            self.inline.fetch_add(1, Ordering::SeqCst);
        }
        info!(message_id = %ctx.message_id(), thread = %thread, "mediating order");
        tokio::time::sleep(self.work).await;
        ctx.set_property("processed_by", thread);
        Ok(true)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let format = if cli.json_logs { LogFormat::Json } else { LogFormat::Text };
    init_tracing(&cli.log_level, format)?;

    let config = InMemoryConfiguration::new()
        .with_property("relaybus.inbound.threads.core", "1")
        .with_property("relaybus.inbound.threads.max", cli.max_threads.to_string())
        .with_property("relaybus.inbound.threads.qlen", cli.queue_length.to_string());
    config.add_inbound_endpoint(InboundEndpoint {
        name: "orders-jms".to_string(),
        artifact_container: Some("demo-capp".to_string()),
        statistics_enabled: false,
    });

    let env = MediationEnvironment::builder(Arc::new(config)).build()?;
    env.set_initialized(true);

    let pooled = Arc::new(AtomicUsize::new(0));
    let inline = Arc::new(AtomicUsize::new(0));
    let sequence = Arc::new(Sequence::named(
        "orders",
        vec![Arc::new(Tally {
            pool_prefix: format!("{}-", env.inbound_pool().name()),
            pooled: Arc::clone(&pooled),
            inline: Arc::clone(&inline),
            work: Duration::from_millis(cli.work_ms),
        })],
    ));

    for n in 0..cli.messages {
        let mut ctx = env.create_message_context();
        ctx.set_property(INBOUND_ENDPOINT_NAME, "orders-jms");
        ctx.set_body(json!({ "order": n }));
        env.inject_inbound(ctx, Arc::clone(&sequence), cli.sequential)
            .await?;
    }

    while env.inbound_pool().pending() > 0 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    info!(
        pooled = pooled.load(Ordering::SeqCst),
        inline = inline.load(Ordering::SeqCst),
        "all messages mediated"
    );
    Ok(())
}
