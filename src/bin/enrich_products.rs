use lambda_http::{run, service_fn, Error};
use search_enrichment::completion::{CompletionClient, OpenAiClient};
use search_enrichment::config::Config;
use search_enrichment::enrichment::{EnrichService, EnrichSettings};
use search_enrichment::http_handler::enrich_products_handler;
use search_enrichment::init_tracing;
use search_enrichment::store::{FirestoreStore, ProductStore};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing();

    // Configuration is read once per cold start; a missing project id is fatal here
    let config = Config::from_env().map_err(|e| {
        tracing::error!("Invalid configuration: {}", e);
        Box::new(e) as Box<dyn std::error::Error + Send + Sync>
    })?;
    let store_config = config.require_store()?;

    // A missing completion key is reported per request as a 500
    let client = OpenAiClient::from_config(&config.completion)?
        .map(|c| Arc::new(c) as Arc<dyn CompletionClient>);
    if client.is_none() {
        tracing::warn!("OPENAI_API_KEY not set, enrichment requests will fail");
    }

    let store: Arc<dyn ProductStore> =
        Arc::new(FirestoreStore::new(store_config, reqwest::Client::new()));

    let service = Arc::new(EnrichService::new(
        client,
        store,
        EnrichSettings::new(config.time_budget),
    ));

    run(service_fn(move |event| {
        let service = service.clone();
        enrich_products_handler(service, event)
    }))
    .await
}
