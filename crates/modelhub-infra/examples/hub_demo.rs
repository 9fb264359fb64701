//! End-to-end hub demo: register providers from environment API keys,
//! then route one chat call and one streaming call.
//!
//! ```sh
//! ANTHROPIC_API_KEY=... OPENAI_API_KEY=... cargo run --example hub_demo
//! ```
//!
//! Set `RUST_LOG=debug` to watch routing decisions and provider calls.

use std::sync::Arc;

use futures_util::StreamExt;

use modelhub_core::hub::ModelHub;
use modelhub_infra::create_provider;
use modelhub_types::chat::{Message, ModelRequest};
use modelhub_types::config::HubConfig;
use modelhub_types::model::{ProviderConfig, ProviderType};
use modelhub_types::stream::ChunkPayload;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    modelhub_observe::tracing_setup::init_tracing(false)?;

    let hub = Arc::new(ModelHub::new(HubConfig::default()));
    hub.spawn_monitor();

    let mut registered = 0;
    for (env_key, id, provider_type) in [
        ("ANTHROPIC_API_KEY", "anthropic", ProviderType::Anthropic),
        ("OPENAI_API_KEY", "openai", ProviderType::OpenAi),
    ] {
        if let Ok(key) = std::env::var(env_key) {
            let config = ProviderConfig {
                id: id.to_string(),
                provider_type,
                api_key: Some(key),
                base_url: None,
                timeout_ms: 120_000,
                models: vec![],
            };
            let adapter = create_provider(&config)?;
            hub.register_provider(config, adapter).await?;
            registered += 1;
        }
    }
    if registered == 0 {
        eprintln!("set ANTHROPIC_API_KEY and/or OPENAI_API_KEY to run the demo");
        return Ok(());
    }

    // Print every hub event as it happens.
    let mut events = hub.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            println!("event: {}", serde_json::to_string(&event).unwrap_or_default());
        }
    });

    let request = ModelRequest::new(vec![Message::user(
        "Say hello in one short sentence.",
    )]);

    let decision = hub.select_model(&request)?;
    println!(
        "routed to {} on {} (confidence {:.2})",
        decision.selected_model, decision.provider_id, decision.confidence
    );

    let response = hub.chat(request.clone()).await?;
    println!("chat response: {}", response.content);

    print!("stream response: ");
    let mut stream = hub.stream(request);
    while let Some(chunk) = stream.next().await {
        if let ChunkPayload::Content { delta } = &chunk?.payload {
            print!("{delta}");
        }
    }
    println!();

    hub.shutdown().await;
    modelhub_observe::tracing_setup::shutdown_tracing();
    Ok(())
}
