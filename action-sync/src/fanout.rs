//! Run independent units of work concurrently and collect every outcome.
//!
//! Units share the calling task (no spawning), so they interleave on the
//! current thread while each awaits its own remote call. A failing unit never
//! cancels its siblings.

use futures_util::future::join_all;
use std::future::Future;

/// Await all units, returning their results in launch order
pub async fn run_isolated<I, F, T, E>(units: I) -> Vec<Result<T, E>>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, E>>,
{
    join_all(units).await
}

/// Split collected outcomes into (successes, failures) counts
pub fn tally<T, E>(outcomes: &[Result<T, E>]) -> (usize, usize) {
    let ok = outcomes.iter().filter(|r| r.is_ok()).count();
    (ok, outcomes.len() - ok)
}
