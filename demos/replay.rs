use std::env;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::fs::File;
use tokio::time::Instant;
use tokio_util::codec::{FramedRead, FramedWrite};
use wallpad_gateway::bus::NoAdapterControl;
use wallpad_gateway::engine::TickOutcome;
use wallpad_gateway::protocol::HexFrameCodec;
use wallpad_gateway::{DeviceRegistry, Engine, GatewayConfig, Intent, Result};

/// Replays a hex bus capture through the engine
///
/// Usage: `cargo run --example replay [capture.txt] [schema.json]`
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let mut args = env::args().skip(1);
    let capture = args.next().unwrap_or_else(|| "demos/capture.txt".to_string());
    let registry = match args.next() {
        Some(path) => DeviceRegistry::from_json(&tokio::fs::read_to_string(path).await?)?,
        None => DeviceRegistry::builtin()?,
    };

    let config = GatewayConfig::default();
    println!("Replaying {}", capture);
    println!("- Settle threshold: {:?}", config.settle_threshold);
    println!("- Max attempts: {}", config.max_attempts);

    let (engine, mut channels) = Engine::new(config, registry, Arc::new(NoAdapterControl))?;
    let discovery = engine.start_discovery()?;

    let mut reader = FramedRead::new(File::open(&capture).await?, HexFrameCodec::new());
    let mut candidates = 0;
    while let Some(candidate) = reader.next().await {
        engine.handle_inbound(&candidate?).await;
        candidates += 1;
    }
    println!("\n{} candidate frames read", candidates);

    println!("\nDecoded state:");
    while let Ok(update) = channels.states.try_recv() {
        println!("- {} {} = {}", update.instance, update.field, update.value);
    }

    // Queue a command and drive the scheduler once the bus has settled.
    let intent = Intent::new("Light1", "power", "OFF");
    engine.submit_intent(&intent).await?;
    tokio::time::sleep(engine.config().settle_threshold * 2).await;

    let mut writer = FramedWrite::new(tokio::io::stdout(), HexFrameCodec::new());
    println!("\nOutbound for {} {} {}:", intent.instance, intent.action, intent.value);
    if let TickOutcome::Sent(drained) = engine.tick(Instant::now()).await {
        if let Some(frame) = channels.frames.recv().await {
            writer.send(frame).await?;
            println!(" (attempt {})", drained.attempt);
        }
    }

    discovery.stop();
    let inventory = discovery.wait().await?;
    println!("\nInventory:");
    println!("{}", serde_json::to_string_pretty(&inventory)?);

    let status = engine.status().await;
    println!("\nQueue depth: {}", status.queue_depth);
    Ok(())
}
