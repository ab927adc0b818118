// Synthetic load for exercising the pipeline from the command line
// Author: kelexine (https://github.com/kelexine)

use crate::cache::CacheKey;
use crate::cli::SimulateArgs;
use crate::concurrency::Priority;
use crate::error::GuardError;
use crate::pipeline::{GuardSnapshot, GuardedRequest, RequestPipeline};
use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Outcome of one simulation run.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub requests: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Final errors by kind.
    pub errors: BTreeMap<String, usize>,
    pub elapsed_ms: u128,
    pub stats: GuardSnapshot,
}

/// Issue `args.requests` guarded calls at once against a synthetic outbound
/// call, cycling priorities and cache keys. Cancelling `cancel` stops every
/// call still waiting or running.
pub async fn run_simulation(
    pipeline: &RequestPipeline,
    args: &SimulateArgs,
    cancel: &CancellationToken,
) -> SimulationReport {
    let started = Instant::now();
    let executions = AtomicUsize::new(0);
    let latency = Duration::from_millis(args.latency_ms);

    info!(
        "Simulating {} calls ({} distinct keys, failing every {} executions)",
        args.requests, args.distinct_keys, args.fail_every
    );

    let calls = (0..args.requests).map(|i| {
        let mut request = GuardedRequest::new("simulate")
            .with_priority(Priority::ALL[i % Priority::ALL.len()])
            .with_cancel(cancel.child_token());
        if args.distinct_keys > 0 {
            let key = CacheKey::builder("simulate")
                .content(format!("payload-{}", i % args.distinct_keys))
                .build();
            request = request.with_cache_key(key);
        }

        let executions = &executions;
        pipeline.execute_guarded(request, move |ctx| {
            let n = executions.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if args.fail_every > 0 && n % args.fail_every == 0 {
                    return Err(GuardError::Server {
                        status: Some(503),
                        message: format!("synthetic failure on execution {}", n),
                    });
                }
                ctx.scope
                    .read(async {
                        tokio::time::sleep(latency).await;
                        Ok(format!("result-{}", i))
                    })
                    .await
            }
        })
    });
    let results = join_all(calls).await;

    let mut errors = BTreeMap::new();
    let mut succeeded = 0;
    for result in &results {
        match result {
            Ok(_) => succeeded += 1,
            Err(e) => *errors.entry(e.kind().as_str().to_string()).or_insert(0) += 1,
        }
    }

    SimulationReport {
        requests: args.requests,
        succeeded,
        failed: results.len() - succeeded,
        errors,
        elapsed_ms: started.elapsed().as_millis(),
        stats: pipeline.snapshot(),
    }
}
