// src/batch.rs
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::dispatch::QueryDispatcher;
use crate::provider::ImageryProvider;
use crate::request::{IndexResponse, WireRequest};

#[derive(Deserialize, Serialize, Debug)]
pub struct BatchFile {
    #[serde(default)]
    pub global: GlobalParams,
    pub requests: Vec<WireRequest>,
}

/// Values applied to every request that does not set its own.
#[derive(Deserialize, Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct GlobalParams {
    pub cloud_tolerance: Option<i64>,
}

impl BatchFile {
    pub fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let mut batch: BatchFile = serde_json::from_str(&content)?;
        batch.apply_globals();
        Ok(batch)
    }

    fn apply_globals(&mut self) {
        if let Some(cloud) = self.global.cloud_tolerance {
            for request in &mut self.requests {
                request.cloud_tolerance.get_or_insert(cloud);
            }
        }
    }
}

fn describe(request: &WireRequest) -> String {
    format!(
        "{} {}..{}",
        request.index.as_deref().unwrap_or("?"),
        request.start_date.as_deref().unwrap_or("?"),
        request.end_date.as_deref().unwrap_or("?"),
    )
}

/// Runs every request concurrently; responses come back in input order.
pub async fn process_batch<P>(
    batch: BatchFile,
    dispatcher: Arc<QueryDispatcher<P>>,
    max_concurrency: usize,
    token: CancellationToken,
) -> Result<Vec<IndexResponse>>
where
    P: ImageryProvider + 'static,
{
    let total = batch.requests.len();
    eprintln!("Starting batch processing with {} requests...", total);

    let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));
    let (tx, rx) = flume::unbounded();
    let mut handles = Vec::with_capacity(total);

    for (i, request) in batch.requests.into_iter().enumerate() {
        let dispatcher = Arc::clone(&dispatcher);
        let semaphore = Arc::clone(&semaphore);
        let token = token.clone();
        let tx = tx.clone();
        handles.push(tokio::spawn(async move {
            let label = describe(&request);
            let response = match semaphore.acquire_owned().await {
                Ok(_permit) => dispatcher.handle_wire(request, &token).await,
                Err(e) => IndexResponse::Error {
                    error: e.to_string(),
                },
            };
            // receiver outlives every task
            let _ = tx.send((i, label, response));
        }));
    }
    drop(tx);

    let mut responses: Vec<Option<IndexResponse>> = vec![None; total];
    let mut done = 0;
    while let Ok((i, label, response)) = rx.recv_async().await {
        done += 1;
        let outcome = match &response {
            IndexResponse::Value { value: Some(v) } => format!("{v:.4}"),
            IndexResponse::Url { url: Some(url) } => url.clone(),
            IndexResponse::Value { value: None } | IndexResponse::Url { url: None } => {
                "no data".to_string()
            }
            IndexResponse::Error { error } => format!("error: {error}"),
        };
        eprintln!("[{}/{}] {} -> {}", done, total, label, outcome);
        responses[i] = Some(response);
    }

    for handle in handles {
        handle.await?;
    }

    eprintln!("Batch processing complete!");
    Ok(responses
        .into_iter()
        .map(|r| {
            r.unwrap_or_else(|| IndexResponse::Error {
                error: "request did not complete".to_string(),
            })
        })
        .collect())
}
