use std::time::Instant;

use tracing::{error, info};

use crate::app::{ProgressEvent, ProgressSink};
use crate::domain::RequestCombination;
use crate::fetch::{FetchOutcome, FundFetcher};

/// What to do with the rest of a run once the gateway rejects the token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthPolicy {
    /// Report the failure and keep going.
    #[default]
    Continue,
    /// Skip every remaining combination.
    StopOnFirst,
}

impl AuthPolicy {
    pub fn from_flag(stop_on_auth_failure: bool) -> Self {
        if stop_on_auth_failure {
            AuthPolicy::StopOnFirst
        } else {
            AuthPolicy::Continue
        }
    }
}

/// Walks combinations strictly one after another; a combination (retries and
/// TLS fallback included) is finished before the next request is issued.
pub struct CombinationDriver<F: FundFetcher> {
    fetcher: F,
    policy: AuthPolicy,
}

impl<F: FundFetcher> CombinationDriver<F> {
    pub fn new(fetcher: F, policy: AuthPolicy) -> Self {
        Self { fetcher, policy }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn policy(&self) -> AuthPolicy {
        self.policy
    }

    pub fn run<I>(
        &self,
        combinations: I,
        sink: &dyn ProgressSink,
    ) -> Vec<(RequestCombination, FetchOutcome)>
    where
        I: IntoIterator<Item = RequestCombination>,
    {
        self.run_with(combinations, sink, |_, _| {})
    }

    /// Like [`run`](Self::run), calling `handler` as soon as each outcome is known.
    pub fn run_with<I, H>(
        &self,
        combinations: I,
        sink: &dyn ProgressSink,
        mut handler: H,
    ) -> Vec<(RequestCombination, FetchOutcome)>
    where
        I: IntoIterator<Item = RequestCombination>,
        H: FnMut(&RequestCombination, &FetchOutcome),
    {
        let combinations: Vec<_> = combinations.into_iter().collect();
        let total = combinations.len();
        let started = Instant::now();
        let mut results = Vec::with_capacity(total);
        info!(total, "processing combinations");

        let mut processed = 0usize;
        for combination in combinations {
            processed += 1;
            info!(processed, total, combination = %combination, "processing");
            sink.event(ProgressEvent {
                message: format!("[{processed}/{total}] {combination}"),
                elapsed: Some(started.elapsed()),
            });

            let outcome = self.fetcher.fetch(&combination);
            handler(&combination, &outcome);
            let stop = matches!(outcome, FetchOutcome::AuthFailure(_))
                && self.policy == AuthPolicy::StopOnFirst;
            results.push((combination, outcome));

            if stop {
                error!(
                    skipped = total - processed,
                    "authorization rejected; stopping run (stop_on_auth_failure)"
                );
                sink.event(ProgressEvent {
                    message: format!(
                        "stopped after {processed}/{total}: authorization rejected"
                    ),
                    elapsed: Some(started.elapsed()),
                });
                break;
            }
        }

        info!(
            processed,
            total,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "combinations finished"
        );
        results
    }
}
