//! Product records in the document store.
//!
//! [`ProductStore`] is the seam the enrichment service talks to;
//! [`FirestoreStore`] implements it over the Firestore REST API (also works
//! against the local emulator when no access token is configured).

use crate::config::StoreConfig;
use crate::error::{Result, ServiceError};
use crate::metadata::ProductMetadata;
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

/// Documents requested per list page
const LIST_PAGE_SIZE: u32 = 300;

/// Server-assigned timestamp field set on every metadata write
pub const UPDATED_AT_FIELD: &str = "metadataUpdatedAt";

/// Product fields the tagging prompt needs
#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: String,
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Every product in the collection, in store order
    async fn list_products(&self) -> Result<Vec<Product>>;

    /// A single product, or `None` if the id does not exist
    async fn get_product(&self, id: &str) -> Result<Option<Product>>;

    /// Merges `metadata` into an existing product and stamps the update time
    async fn update_metadata(&self, id: &str, metadata: &ProductMetadata) -> Result<()>;
}

#[derive(Deserialize)]
struct Document {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    documents: Vec<Document>,
    next_page_token: Option<String>,
}

impl Document {
    fn into_product(self) -> Product {
        let id = self
            .name
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        let text = |key: &str| {
            self.fields
                .get(key)
                .and_then(|v| v.get("stringValue"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        Product {
            name: text("name"),
            description: text("description"),
            category: text("category"),
            id,
        }
    }
}

fn string_value(s: &str) -> Value {
    json!({ "stringValue": s })
}

fn string_array_value<'a>(items: impl IntoIterator<Item = &'a str>) -> Value {
    let values: Vec<Value> = items.into_iter().map(string_value).collect();
    json!({ "arrayValue": { "values": values } })
}

/// Firestore `commit` body updating only the metadata fields of an existing document.
fn metadata_commit_body(document_name: &str, metadata: &ProductMetadata) -> Value {
    json!({
        "writes": [{
            "update": {
                "name": document_name,
                "fields": {
                    "keywords": string_array_value(metadata.keywords.iter().map(String::as_str)),
                    "season": string_value(metadata.season.as_str()),
                    "bestFor": string_array_value(metadata.best_for.iter().map(|b| b.as_str())),
                }
            },
            "updateMask": { "fieldPaths": ["keywords", "season", "bestFor"] },
            "updateTransforms": [{
                "fieldPath": UPDATED_AT_FIELD,
                "setToServerValue": "REQUEST_TIME"
            }],
            "currentDocument": { "exists": true }
        }]
    })
}

/// Firestore REST client for the products collection
pub struct FirestoreStore {
    http_client: reqwest::Client,
    base_url: String,
    project_id: String,
    collection: String,
    access_token: Option<String>,
}

impl FirestoreStore {
    pub fn new(config: &StoreConfig, http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            base_url: config.base_url.clone(),
            project_id: config.project_id.clone(),
            collection: config.collection.clone(),
            access_token: config.access_token.clone(),
        }
    }

    fn database(&self) -> String {
        format!("projects/{}/databases/(default)", self.project_id)
    }

    /// Resource name used inside request bodies
    fn document_name(&self, id: &str) -> String {
        format!("{}/documents/{}/{}", self.database(), self.collection, id)
    }

    /// `{base}/projects/{p}/databases/(default)/<tail...>`, each tail segment percent-encoded
    fn database_url(&self, tail: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url).map_err(|e| {
            ServiceError::Config(format!("invalid FIRESTORE_BASE_URL {:?}: {}", self.base_url, e))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                ServiceError::Config(format!(
                    "FIRESTORE_BASE_URL {:?} cannot carry a path",
                    self.base_url
                ))
            })?
            .pop_if_empty()
            .extend(["projects", self.project_id.as_str(), "databases", "(default)"])
            .extend(tail);
        Ok(url)
    }

    fn collection_url(&self) -> Result<Url> {
        self.database_url(&["documents", self.collection.as_str()])
    }

    fn document_url(&self, id: &str) -> Result<Url> {
        self.database_url(&["documents", self.collection.as_str(), id])
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.access_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ServiceError::StoreStatus {
            status: status.as_u16(),
            body,
        })
    }
}

/// Ids are single path segments and never dot segments
fn is_valid_document_id(id: &str) -> bool {
    !id.is_empty() && id != "." && id != ".." && !id.contains('/')
}

#[async_trait]
impl ProductStore for FirestoreStore {
    async fn list_products(&self) -> Result<Vec<Product>> {
        let url = self.collection_url()?;
        let mut products = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![("pageSize", LIST_PAGE_SIZE.to_string())];
            if let Some(token) = &page_token {
                query.push(("pageToken", token.clone()));
            }

            let response = self
                .authorize(self.http_client.get(url.clone()).query(&query))
                .send()
                .await?;
            let page: ListResponse = Self::check(response).await?.json().await?;

            products.extend(page.documents.into_iter().map(Document::into_product));
            debug!(fetched = products.len(), "Fetched product page");

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(products)
    }

    async fn get_product(&self, id: &str) -> Result<Option<Product>> {
        if !is_valid_document_id(id) {
            return Ok(None);
        }

        let url = self.document_url(id)?;
        let response = self.authorize(self.http_client.get(url)).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let doc: Document = Self::check(response).await?.json().await?;
        Ok(Some(doc.into_product()))
    }

    async fn update_metadata(&self, id: &str, metadata: &ProductMetadata) -> Result<()> {
        if !is_valid_document_id(id) {
            return Err(ServiceError::ProductNotFound(id.to_string()));
        }

        let url = self.database_url(&["documents:commit"])?;
        let body = metadata_commit_body(&self.document_name(id), metadata);

        let response = self
            .authorize(self.http_client.post(url).json(&body))
            .send()
            .await?;
        Self::check(response).await?;

        Ok(())
    }
}
