//! Concurrent execution of three independent fetches under an explicit
//! partial-failure policy.

use std::future::Future;

use tracing::warn;

use crate::error::{AggregateError, RequestError};

/// How a group of concurrent sub-operations reports failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orchestration {
    /// Every sub-operation runs to completion; failures are collected
    /// afterwards and reported together by name.
    AllSettled,
    /// The first failure is returned as-is and the sub-operations still in
    /// flight are dropped.
    FailFast,
}

impl Orchestration {
    /// Drives the three named futures concurrently on the current task.
    pub async fn run<A, B, C>(
        self,
        (name_a, a): (&'static str, impl Future<Output = Result<A, RequestError>>),
        (name_b, b): (&'static str, impl Future<Output = Result<B, RequestError>>),
        (name_c, c): (&'static str, impl Future<Output = Result<C, RequestError>>),
    ) -> Result<(A, B, C), AggregateError> {
        match self {
            Orchestration::AllSettled => {
                let (ra, rb, rc) = tokio::join!(a, b, c);

                let failed: Vec<&'static str> = [
                    (name_a, ra.is_err()),
                    (name_b, rb.is_err()),
                    (name_c, rc.is_err()),
                ]
                .into_iter()
                .filter_map(|(name, failed)| failed.then_some(name))
                .collect();

                match (ra, rb, rc) {
                    (Ok(a), Ok(b), Ok(c)) => Ok((a, b, c)),
                    _ => {
                        warn!(failed = ?failed, "sub-operations failed");
                        Err(AggregateError::Partial { failed })
                    }
                }
            }
            Orchestration::FailFast => tokio::try_join!(
                tagged(name_a, a),
                tagged(name_b, b),
                tagged(name_c, c)
            )
            .map_err(|(operation, source)| {
                warn!(operation, error = %source, "sub-operation failed, abandoning the rest");
                AggregateError::FailFast { operation, source }
            }),
        }
    }
}

async fn tagged<T>(
    name: &'static str,
    fut: impl Future<Output = Result<T, RequestError>>,
) -> Result<T, (&'static str, RequestError)> {
    fut.await.map_err(|e| (name, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::future::ready;

    fn fail(message: &str) -> Result<u32, RequestError> {
        Err(RequestError::status(500, message))
    }

    #[tokio::test]
    async fn test_all_settled_success() {
        let out = Orchestration::AllSettled
            .run(("a", ready(Ok(1))), ("b", ready(Ok("two"))), ("c", ready(Ok(3.0))))
            .await
            .unwrap();
        assert_eq!(out, (1, "two", 3.0));
    }

    #[tokio::test]
    async fn test_all_settled_reports_every_failure_in_order() {
        let err = Orchestration::AllSettled
            .run(
                ("overview", ready(fail("x"))),
                ("route punctuality", ready(Ok(2))),
                ("realtime summary", ready(fail("y"))),
            )
            .await
            .unwrap_err();
        assert_eq!(err.failed_operations(), vec!["overview", "realtime summary"]);
        assert_eq!(err.to_string(), "failed to fetch: overview, realtime summary");
    }

    #[tokio::test]
    async fn test_all_settled_runs_everything_despite_failure() {
        let finished = Cell::new(0);
        let slow_ok = async {
            tokio::task::yield_now().await;
            finished.set(finished.get() + 1);
            Ok(1)
        };
        let _ = Orchestration::AllSettled
            .run(("a", ready(fail("boom"))), ("b", slow_ok), ("c", ready(Ok(3))))
            .await;
        assert_eq!(finished.get(), 1);
    }

    #[tokio::test]
    async fn test_fail_fast_does_not_wait_for_pending() {
        let err = Orchestration::FailFast
            .run(
                ("vehicles", ready(fail("vehicles down"))),
                ("delays", std::future::pending::<Result<u32, RequestError>>()),
                ("summary", ready(Ok(1))),
            )
            .await
            .unwrap_err();
        match err {
            AggregateError::FailFast { operation, source } => {
                assert_eq!(operation, "vehicles");
                assert_eq!(source.to_string(), "vehicles down");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
