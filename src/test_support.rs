//! In-memory collaborators shared by unit tests

use crate::completion::{CompletionClient, CompletionRequest};
use crate::error::{Result, ServiceError};
use crate::metadata::ProductMetadata;
use crate::store::{Product, ProductStore};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::{sleep, Instant};

type Reply = Box<dyn FnMut(&CompletionRequest) -> Result<String> + Send>;

/// Completion client answering from a closure and recording user prompts
pub(crate) struct ScriptedClient {
    reply: Mutex<Reply>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedClient {
    pub(crate) fn new<F>(f: F) -> Self
    where
        F: FnMut(&CompletionRequest) -> Result<String> + Send + 'static,
    {
        Self {
            reply: Mutex::new(Box::new(f)),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn replying(text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |_| Ok(text.clone()))
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        self.prompts.lock().unwrap().push(request.user.clone());
        let mut reply = self.reply.lock().unwrap();
        (*reply)(&request)
    }
}

pub(crate) fn product(id: &str) -> Product {
    Product {
        id: id.to_string(),
        name: format!("Product {}", id.trim_start_matches('p')),
        description: "A comfortable everyday item".to_string(),
        category: "Apparel".to_string(),
    }
}

/// `p0`, `p1`, ... named `Product 0`, `Product 1`, ...
pub(crate) fn products(n: usize) -> Vec<Product> {
    (0..n).map(|i| product(&format!("p{}", i))).collect()
}

/// Product store backed by a vector, recording every write
pub(crate) struct MemoryStore {
    products: Vec<Product>,
    writes: Mutex<Vec<(String, ProductMetadata)>>,
    failing_id: Option<String>,
    list_calls: AtomicUsize,
}

impl MemoryStore {
    pub(crate) fn new(products: Vec<Product>) -> Self {
        Self {
            products,
            writes: Mutex::new(Vec::new()),
            failing_id: None,
            list_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing_writes_for(mut self, id: &str) -> Self {
        self.failing_id = Some(id.to_string());
        self
    }

    pub(crate) fn writes(&self) -> Vec<(String, ProductMetadata)> {
        self.writes.lock().unwrap().clone()
    }

    pub(crate) fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProductStore for MemoryStore {
    async fn list_products(&self) -> Result<Vec<Product>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.products.clone())
    }

    async fn get_product(&self, id: &str) -> Result<Option<Product>> {
        Ok(self.products.iter().find(|p| p.id == id).cloned())
    }

    async fn update_metadata(&self, id: &str, metadata: &ProductMetadata) -> Result<()> {
        if self.failing_id.as_deref() == Some(id) {
            return Err(ServiceError::StoreStatus {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        self.writes
            .lock()
            .unwrap()
            .push((id.to_string(), metadata.clone()));
        Ok(())
    }
}

/// Completion client that takes `latency` per call and records when each call
/// started and how many were in flight at once
pub(crate) struct TimedClient {
    reply: String,
    latency: Duration,
    origin: Instant,
    starts: Mutex<Vec<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl TimedClient {
    pub(crate) fn new(reply: &str, latency: Duration) -> Self {
        Self {
            reply: reply.to_string(),
            latency,
            origin: Instant::now(),
            starts: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Call start times in whole seconds since the client was created
    pub(crate) fn start_secs(&self) -> Vec<u64> {
        self.starts.lock().unwrap().iter().map(Duration::as_secs).collect()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionClient for TimedClient {
    async fn complete(&self, _request: CompletionRequest) -> Result<String> {
        self.starts.lock().unwrap().push(self.origin.elapsed());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.latency.is_zero() {
            sleep(self.latency).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(self.reply.clone())
    }
}
