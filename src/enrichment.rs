//! Batch enrichment of product records with AI-generated tags.
//!
//! Products are processed in fixed-size batches. Inside a batch, up to
//! [`CONCURRENCY`] completion calls run at once; the [`Pacer`] spaces out
//! sub-batches and batches to stay under the completion API's rate limits.
//! After each inter-batch pause the [`Deadline`] is consulted, so no batch
//! starts once the time budget is spent. The run then stops with
//! `partial: true` and a `nextBatchStart` offset the caller can pass back as
//! `skip`.
//!
//! The resume offset indexes the collection as listed at call time. If
//! products are added or removed between calls, resuming may skip or repeat
//! items.

use crate::completion::CompletionClient;
use crate::error::{Result, ServiceError};
use crate::metadata::{generate_metadata, ProductMetadata};
use crate::pacing::{Deadline, Pacer};
use crate::store::{Product, ProductStore};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Products per batch when the caller does not say
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Completion calls in flight at once
pub const CONCURRENCY: usize = 3;

const SUB_BATCH_DELAY: Duration = Duration::from_millis(1000);
const BATCH_DELAY: Duration = Duration::from_millis(2000);

/// Incoming enrichment request; every field is optional
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichRequest {
    pub batch_size: Option<usize>,
    pub dry_run: Option<bool>,
    pub product_id: Option<String>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductError {
    pub product_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnrichedProduct {
    pub id: String,
    pub name: String,
    pub metadata: ProductMetadata,
}

/// Summary returned to the caller
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichReport {
    pub success: bool,
    pub dry_run: bool,
    /// Products selected for this call (after skip/limit)
    pub total: usize,
    /// Products whose metadata was generated (and written, unless dry run)
    pub processed: usize,
    /// Store writes performed
    pub updated: usize,
    pub errors: Vec<ProductError>,
    pub partial: bool,
    /// Value to pass as `skip` to continue a partial run
    pub next_batch_start: Option<usize>,
    pub elapsed_ms: u64,
    pub results: Vec<EnrichedProduct>,
}

impl EnrichReport {
    fn new(dry_run: bool, total: usize) -> Self {
        Self {
            success: true,
            dry_run,
            total,
            processed: 0,
            updated: 0,
            errors: Vec::new(),
            partial: false,
            next_batch_start: None,
            elapsed_ms: 0,
            results: Vec::new(),
        }
    }

    fn record(&mut self, outcome: ProductOutcome) {
        match outcome {
            ProductOutcome::Enriched { product, written } => {
                self.processed += 1;
                if written {
                    self.updated += 1;
                }
                self.results.push(product);
            }
            ProductOutcome::Failed(error) => self.errors.push(error),
        }
    }

    /// Products attempted so far, successful or not
    pub fn attempted(&self) -> usize {
        self.processed + self.errors.len()
    }
}

enum ProductOutcome {
    Enriched {
        product: EnrichedProduct,
        written: bool,
    },
    Failed(ProductError),
}

/// Tunables for a run
#[derive(Debug, Clone, Copy)]
pub struct EnrichSettings {
    pub time_budget: Duration,
    pub pacer: Pacer,
    pub concurrency: usize,
}

impl EnrichSettings {
    pub fn new(time_budget: Duration) -> Self {
        Self {
            time_budget,
            pacer: Pacer::new(SUB_BATCH_DELAY, BATCH_DELAY),
            concurrency: CONCURRENCY,
        }
    }
}

pub struct EnrichService {
    completion: Option<Arc<dyn CompletionClient>>,
    store: Arc<dyn ProductStore>,
    settings: EnrichSettings,
}

impl EnrichService {
    pub fn new(
        completion: Option<Arc<dyn CompletionClient>>,
        store: Arc<dyn ProductStore>,
        settings: EnrichSettings,
    ) -> Self {
        Self {
            completion,
            store,
            settings,
        }
    }

    /// Runs one enrichment request.
    ///
    /// Whole-request failures (missing key, unknown product, store listing)
    /// are errors; per-product failures land in [`EnrichReport::errors`].
    pub async fn run(&self, request: EnrichRequest) -> Result<EnrichReport> {
        let client = self
            .completion
            .clone()
            .ok_or(ServiceError::MissingApiKey)?;
        let deadline = Deadline::start(self.settings.time_budget);

        let target = request
            .product_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty());

        let dry_run = request.dry_run.unwrap_or(false);

        let mut report = match target {
            Some(id) => self.run_single(client.as_ref(), id, dry_run).await?,
            None => {
                self.run_batches(client.as_ref(), &request, dry_run, &deadline)
                    .await?
            }
        };

        report.elapsed_ms = deadline.elapsed().as_millis() as u64;
        info!(
            total = report.total,
            processed = report.processed,
            updated = report.updated,
            errors = report.errors.len(),
            partial = report.partial,
            dry_run = report.dry_run,
            elapsed_ms = report.elapsed_ms,
            "Enrichment finished"
        );

        Ok(report)
    }

    async fn run_single(
        &self,
        client: &dyn CompletionClient,
        id: &str,
        dry_run: bool,
    ) -> Result<EnrichReport> {
        let product = self
            .store
            .get_product(id)
            .await?
            .ok_or_else(|| ServiceError::ProductNotFound(id.to_string()))?;

        let mut report = EnrichReport::new(dry_run, 1);
        report.record(self.process(client, &product, dry_run).await);
        Ok(report)
    }

    async fn run_batches(
        &self,
        client: &dyn CompletionClient,
        request: &EnrichRequest,
        dry_run: bool,
        deadline: &Deadline,
    ) -> Result<EnrichReport> {
        let skip = request.skip.unwrap_or(0);
        let batch_size = request.batch_size.unwrap_or(DEFAULT_BATCH_SIZE).max(1);
        let concurrency = self.settings.concurrency.max(1);

        let candidates: Vec<Product> = self
            .store
            .list_products()
            .await?
            .into_iter()
            .skip(skip)
            .take(request.limit.unwrap_or(usize::MAX))
            .collect();

        info!(
            total = candidates.len(),
            skip,
            batch_size,
            dry_run,
            "Starting enrichment"
        );

        let mut report = EnrichReport::new(dry_run, candidates.len());

        for (batch_index, batch) in candidates.chunks(batch_size).enumerate() {
            let offset = batch_index * batch_size;

            if batch_index > 0 {
                self.settings.pacer.after_batch().await;
            }

            if deadline.is_exceeded() {
                warn!(
                    elapsed_ms = deadline.elapsed().as_millis() as u64,
                    next_batch_start = skip + offset,
                    "Time budget exhausted, stopping early"
                );
                report.partial = true;
                report.next_batch_start = Some(skip + offset);
                break;
            }

            debug!(batch = batch_index + 1, size = batch.len(), "Processing batch");

            for (sub_index, sub_batch) in batch.chunks(concurrency).enumerate() {
                if sub_index > 0 {
                    self.settings.pacer.after_sub_batch().await;
                }

                let outcomes = join_all(
                    sub_batch
                        .iter()
                        .map(|product| self.process(client, product, dry_run)),
                )
                .await;

                for outcome in outcomes {
                    report.record(outcome);
                }
            }
        }

        Ok(report)
    }

    /// Generates and (unless `dry_run`) writes metadata for one product.
    async fn process(
        &self,
        client: &dyn CompletionClient,
        product: &Product,
        dry_run: bool,
    ) -> ProductOutcome {
        let result = async {
            let metadata = generate_metadata(client, product).await?;
            if !dry_run {
                self.store.update_metadata(&product.id, &metadata).await?;
            }
            Ok::<_, ServiceError>(metadata)
        }
        .await;

        match result {
            Ok(metadata) => {
                debug!(
                    product_id = %product.id,
                    keywords = metadata.keywords.len(),
                    "Product enriched"
                );
                ProductOutcome::Enriched {
                    product: EnrichedProduct {
                        id: product.id.clone(),
                        name: product.name.clone(),
                        metadata,
                    },
                    written: !dry_run,
                }
            }
            Err(e) => {
                warn!(product_id = %product.id, error = %e, "Product enrichment failed");
                ProductOutcome::Failed(ProductError {
                    product_id: product.id.clone(),
                    error: e.user_message(),
                })
            }
        }
    }
}
