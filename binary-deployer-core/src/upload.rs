//! Ordered, fail-fast upload driver shared by all repository backends.
//!
//! Backends hand over "how to upload one binary" and the driver decides when
//! each upload starts. With a concurrency of one (the default) uploads run
//! strictly one after another in list order. With more, up to `concurrency`
//! uploads are in flight, and the outcome stays the one a sequential run would
//! report:
//!
//! - the reported failure is the one with the lowest index among all failures;
//! - after the first failure (or cancellation) no new upload starts, in-flight
//!   ones are drained;
//! - `succeeded` only counts uploads that completed before that point.

use std::future::Future;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::binary::Binary;
use crate::contract::DeployResult;
use crate::error::DeployError;

#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Maximum number of uploads in flight. Zero is treated as one.
    pub concurrency: usize,
    /// Raising this token stops the deployment like a failure would.
    pub cancel: CancellationToken,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            cancel: CancellationToken::new(),
        }
    }
}

/// Runs `upload` for each binary following the rules above.
pub async fn upload_in_order<'a, F, Fut>(
    binaries: &'a [Binary],
    options: &UploadOptions,
    upload: F,
) -> DeployResult
where
    F: Fn(&'a Binary) -> Fut,
    Fut: Future<Output = Result<(), DeployError>> + 'a,
{
    let concurrency = options.concurrency.max(1);
    let mut in_flight = FuturesUnordered::new();
    let mut next = 0;
    let mut succeeded = 0;
    let mut aborted = false;
    let mut first_failure: Option<(usize, DeployError)> = None;

    loop {
        while !aborted && in_flight.len() < concurrency && next < binaries.len() {
            let binary = &binaries[next];
            if options.cancel.is_cancelled() {
                warn!(next = binary.name(), "Deployment cancelled, not starting further uploads");
                record_failure(
                    &mut first_failure,
                    next,
                    DeployError::Cancelled {
                        binary: Some(binary.name().to_string()),
                    },
                );
                aborted = true;
                break;
            }

            let index = next;
            let cancel = options.cancel.clone();
            let attempt = upload(binary);
            in_flight.push(async move {
                let result = tokio::select! {
                    biased;
                    result = attempt => result,
                    _ = cancel.cancelled() => Err(DeployError::Cancelled {
                        binary: Some(binary.name().to_string()),
                    }),
                };
                (index, result)
            });
            next += 1;
        }

        match in_flight.next().await {
            None => break,
            Some((index, Ok(()))) => {
                if aborted {
                    debug!(name = binaries[index].name(), "Upload finished after abort, not counted");
                } else {
                    succeeded += 1;
                }
            }
            Some((index, Err(e))) => {
                error!(name = binaries[index].name(), index, error = %e, "Upload failed, stopping deployment");
                aborted = true;
                record_failure(&mut first_failure, index, e);
            }
        }
    }

    match first_failure {
        None => DeployResult::success(succeeded),
        Some((_, e)) => DeployResult::failed(succeeded, e),
    }
}

fn record_failure(slot: &mut Option<(usize, DeployError)>, index: usize, error: DeployError) {
    match slot {
        Some((existing, _)) if *existing <= index => {}
        _ => *slot = Some((index, error)),
    }
}
