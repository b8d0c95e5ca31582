use lambda_http::{run, service_fn, Error};
use search_enrichment::completion::{CompletionClient, OpenAiClient};
use search_enrichment::config::Config;
use search_enrichment::http_handler::search_context_handler;
use search_enrichment::init_tracing;
use search_enrichment::search_context::ContextExtractor;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing();

    // Configuration is read once per cold start
    let config = Config::from_env().map_err(|e| {
        tracing::error!("Invalid configuration: {}", e);
        Box::new(e) as Box<dyn std::error::Error + Send + Sync>
    })?;

    // Without a key the endpoint still answers, with passthrough contexts
    let client = OpenAiClient::from_config(&config.completion)?
        .map(|c| Arc::new(c) as Arc<dyn CompletionClient>);
    if client.is_none() {
        tracing::warn!("OPENAI_API_KEY not set, search context will be passthrough only");
    }

    let extractor = Arc::new(ContextExtractor::new(client));

    run(service_fn(move |event| {
        let extractor = extractor.clone();
        search_context_handler(extractor, event)
    }))
    .await
}
