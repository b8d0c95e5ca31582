use crate::enrichment::{EnrichRequest, EnrichService};
use crate::error::ServiceError;
use crate::search_context::ContextExtractor;
use chrono::Utc;
use lambda_http::http::{response::Builder, Method};
use lambda_http::{Body, Error, Request, Response};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Error response payload
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Lambda handler for the search-context endpoint.
///
/// Valid queries always get a 200: extraction failures are absorbed by
/// [`ContextExtractor`] and answered with a passthrough context.
pub async fn search_context_handler(
    extractor: Arc<ContextExtractor>,
    event: Request,
) -> Result<Response<Body>, Error> {
    if let Some(early) = dispatch_method(event.method()) {
        return Ok(early);
    }

    let query = match parse_query(event.body()) {
        Ok(query) => query,
        Err(e) => {
            warn!("Rejected search-context request: {}", e);
            return Ok(error_from_service_error(&e));
        }
    };

    info!(query_len = query.len(), "Extracting search context");
    let context = extractor.extract(&query, Utc::now()).await;

    json_response(200, &context)
}

/// Lambda handler for the product enrichment endpoint.
pub async fn enrich_products_handler(
    service: Arc<EnrichService>,
    event: Request,
) -> Result<Response<Body>, Error> {
    if let Some(early) = dispatch_method(event.method()) {
        return Ok(early);
    }

    let request = match parse_enrich_request(event.body()) {
        Ok(request) => request,
        Err(e) => {
            warn!("Rejected enrichment request: {}", e);
            return Ok(error_from_service_error(&e));
        }
    };

    match service.run(request).await {
        Ok(report) => json_response(200, &report),
        Err(e) => {
            if e.is_client_error() {
                warn!("Enrichment request failed: {}", e);
            } else {
                error!("Enrichment request failed: {}", e);
            }
            Ok(error_from_service_error(&e))
        }
    }
}

/// Answers preflight and wrong-method requests; `None` means carry on with POST.
fn dispatch_method(method: &Method) -> Option<Response<Body>> {
    match *method {
        Method::POST => None,
        Method::OPTIONS => Some(
            with_cors(Response::builder().status(200))
                .body(Body::Empty)
                .unwrap_or_else(fallback_response),
        ),
        _ => Some(error_response(405, "Method not allowed")),
    }
}

fn parse_query(body: &[u8]) -> Result<String, ServiceError> {
    if body.is_empty() {
        return Err(ServiceError::InvalidQuery);
    }

    let value: Value =
        serde_json::from_slice(body).map_err(|e| ServiceError::InvalidBody(e.to_string()))?;

    value
        .get("query")
        .and_then(Value::as_str)
        .filter(|q| !q.trim().is_empty())
        .map(str::to_string)
        .ok_or(ServiceError::InvalidQuery)
}

fn parse_enrich_request(body: &[u8]) -> Result<EnrichRequest, ServiceError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(EnrichRequest::default());
    }

    serde_json::from_slice(body).map_err(|e| ServiceError::InvalidBody(e.to_string()))
}

fn with_cors(builder: Builder) -> Builder {
    builder
        .header("access-control-allow-origin", "*")
        .header("access-control-allow-methods", "POST, OPTIONS")
        .header("access-control-allow-headers", "Content-Type")
}

fn json_response<T: Serialize>(status: u16, payload: &T) -> Result<Response<Body>, Error> {
    let body = serde_json::to_string(payload)?;

    let resp = with_cors(Response::builder().status(status))
        .header("content-type", "application/json")
        .body(body.into())
        .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)?;

    Ok(resp)
}

/// Helper function to create error responses from ServiceError
fn error_from_service_error(err: &ServiceError) -> Response<Body> {
    error_response(err.status_code(), &err.user_message())
}

/// Helper function to create error responses
fn error_response(status: u16, message: &str) -> Response<Body> {
    let body = serde_json::to_string(&ErrorResponse {
        error: message.to_string(),
    })
    .unwrap_or_else(|_| r#"{"error":"Unknown error"}"#.to_string());

    with_cors(Response::builder().status(status))
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap_or_else(fallback_response)
}

fn fallback_response(e: lambda_http::http::Error) -> Response<Body> {
    error!("Failed to build response: {}", e);
    let mut resp = Response::new(Body::from(r#"{"error":"Internal server error"}"#));
    *resp.status_mut() = lambda_http::http::StatusCode::INTERNAL_SERVER_ERROR;
    resp
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::CompletionClient;
    use crate::enrichment::EnrichSettings;
    use crate::pacing::Pacer;
    use crate::test_support::{products, MemoryStore, ScriptedClient};
    use std::time::Duration;

    fn request(method: &str, body: Body) -> Request {
        lambda_http::http::Request::builder()
            .method(method)
            .uri("/api/search")
            .body(body)
            .unwrap()
    }

    fn post(json: &str) -> Request {
        request("POST", Body::Text(json.to_string()))
    }

    fn body_json(resp: &Response<Body>) -> Value {
        serde_json::from_slice(resp.body()).unwrap()
    }

    fn extractor(client: Option<ScriptedClient>) -> Arc<ContextExtractor> {
        Arc::new(ContextExtractor::new(
            client.map(|c| Arc::new(c) as Arc<dyn CompletionClient>),
        ))
    }

    fn enrich_service(client: Option<ScriptedClient>, store: Arc<MemoryStore>) -> Arc<EnrichService> {
        Arc::new(EnrichService::new(
            client.map(|c| Arc::new(c) as Arc<dyn CompletionClient>),
            store,
            EnrichSettings {
                time_budget: Duration::from_secs(50),
                pacer: Pacer::unpaced(),
                concurrency: 3,
            },
        ))
    }

    #[tokio::test]
    async fn context_happy_path() {
        let client = ScriptedClient::replying(
            r#"{"destination":"Paris","occasion":"wedding","timePeriod":"nextMonth","season":null,"specificMonths":null,"contextExplanation":"Looking for wedding attire in Paris"}"#,
        );
        let resp = search_context_handler(
            extractor(Some(client)),
            post(r#"{"query":"wedding in Paris next month"}"#),
        )
        .await
        .unwrap();

        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers()["access-control-allow-origin"], "*");
        let body = body_json(&resp);
        assert_eq!(body["originalQuery"], "wedding in Paris next month");
        assert_eq!(body["destination"], "Paris");
        assert_eq!(body["timePeriod"], "nextMonth");
    }

    #[tokio::test]
    async fn context_degrades_on_every_failure_path() {
        let failing: Vec<Option<ScriptedClient>> = vec![
            None,
            Some(ScriptedClient::new(|_| {
                Err(ServiceError::CompletionStatus {
                    status: 500,
                    body: "boom".to_string(),
                })
            })),
            Some(ScriptedClient::replying("{not valid json")),
        ];

        for client in failing {
            let resp = search_context_handler(extractor(client), post(r#"{"query":"red dress"}"#))
                .await
                .unwrap();
            assert_eq!(resp.status(), 200);
            let body = body_json(&resp);
            assert_eq!(body["originalQuery"], "red dress");
            assert!(body["destination"].is_null());
            assert!(body["contextExplanation"].is_string());
        }
    }

    #[tokio::test]
    async fn context_echoes_query_untouched() {
        let resp = search_context_handler(extractor(None), post(r#"{"query":"  red dress "}"#))
            .await
            .unwrap();

        assert_eq!(resp.status(), 200);
        assert_eq!(body_json(&resp)["originalQuery"], "  red dress ");
    }

    #[tokio::test]
    async fn enrich_null_dry_run_means_unset() {
        let store = Arc::new(MemoryStore::new(products(2)));
        let client = ScriptedClient::replying(r#"{"keywords":["hat"]}"#);
        let resp = enrich_products_handler(
            enrich_service(Some(client), store.clone()),
            post(r#"{"dryRun":null,"batchSize":null}"#),
        )
        .await
        .unwrap();

        assert_eq!(resp.status(), 200);
        assert_eq!(body_json(&resp)["dryRun"], false);
        assert_eq!(store.writes().len(), 2);
    }

    #[tokio::test]
    async fn context_rejects_bad_queries() {
        for body in [
            Body::Empty,
            Body::Text("{}".to_string()),
            Body::Text(r#"{"query": ""}"#.to_string()),
            Body::Text(r#"{"query": "   "}"#.to_string()),
            Body::Text(r#"{"query": 42}"#.to_string()),
            Body::Text("not json".to_string()),
        ] {
            let resp = search_context_handler(extractor(None), request("POST", body))
                .await
                .unwrap();
            assert_eq!(resp.status(), 400);
            assert!(body_json(&resp)["error"].is_string());
        }
    }

    #[tokio::test]
    async fn method_dispatch_on_both_endpoints() {
        let resp = search_context_handler(extractor(None), request("GET", Body::Empty))
            .await
            .unwrap();
        assert_eq!(resp.status(), 405);

        let resp = search_context_handler(extractor(None), request("OPTIONS", Body::Empty))
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert!(resp.body().is_empty());
        assert_eq!(resp.headers()["access-control-allow-methods"], "POST, OPTIONS");

        let store = Arc::new(MemoryStore::new(products(1)));
        let resp = enrich_products_handler(enrich_service(None, store.clone()), request("PUT", Body::Empty))
            .await
            .unwrap();
        assert_eq!(resp.status(), 405);

        let resp = enrich_products_handler(enrich_service(None, store), request("OPTIONS", Body::Empty))
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert!(resp.body().is_empty());
    }

    #[tokio::test]
    async fn enrich_without_key_is_500() {
        let store = Arc::new(MemoryStore::new(products(2)));
        let resp = enrich_products_handler(enrich_service(None, store), post("{}"))
            .await
            .unwrap();

        assert_eq!(resp.status(), 500);
        assert_eq!(body_json(&resp)["error"], "OPENAI_API_KEY not configured");
    }

    #[tokio::test]
    async fn enrich_empty_body_uses_defaults() {
        let store = Arc::new(MemoryStore::new(products(4)));
        let client = ScriptedClient::replying(r#"{"keywords":["Hat"],"season":"SUMMER","bestFor":["OUTDOOR"]}"#);
        let resp = enrich_products_handler(
            enrich_service(Some(client), store.clone()),
            request("POST", Body::Empty),
        )
        .await
        .unwrap();

        assert_eq!(resp.status(), 200);
        let body = body_json(&resp);
        assert_eq!(body["total"], 4);
        assert_eq!(body["processed"], 4);
        assert_eq!(body["updated"], 4);
        assert_eq!(body["partial"], false);
        assert!(body["nextBatchStart"].is_null());
        assert_eq!(body["results"][0]["metadata"]["bestFor"][0], "OUTDOOR");
        assert_eq!(store.writes().len(), 4);
    }

    #[tokio::test]
    async fn enrich_unknown_product_is_404() {
        let store = Arc::new(MemoryStore::new(products(2)));
        let client = ScriptedClient::replying("{}");
        let resp = enrich_products_handler(
            enrich_service(Some(client), store),
            post(r#"{"productId":"nope","dryRun":true}"#),
        )
        .await
        .unwrap();

        assert_eq!(resp.status(), 404);
    }

    #[tokio::test]
    async fn enrich_malformed_body_is_400() {
        let store = Arc::new(MemoryStore::new(products(2)));
        let resp = enrich_products_handler(
            enrich_service(Some(ScriptedClient::replying("{}")), store.clone()),
            post(r#"{"batchSize":"ten"}"#),
        )
        .await
        .unwrap();

        assert_eq!(resp.status(), 400);
        assert_eq!(store.list_calls(), 0);
    }
}
