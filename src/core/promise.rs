//! Small combinators over fallible async tasks.
//!
//! A task is a zero-argument closure producing a future of `Result`.
//! Tasks are only invoked when the combinator gets to them, so a task
//! that is never reached is never started.

use std::future::Future;

use thiserror::Error;

/// Error returned by `first` and `FirstFactory`
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FirstError<E> {
    #[error("Must have at least one task for first()")]
    NoTasks,

    /// Every task failed; carries the error of the last one
    #[error("All tasks failed, last error: {0}")]
    AllFailed(E),
}

impl<E> FirstError<E> {
    /// The last task error, if any task ran
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::NoTasks => None,
            Self::AllFailed(error) => Some(error),
        }
    }
}

/// Run tasks one at a time, in order.
///
/// Resolves with all outputs or fails with the first error. Tasks after a
/// failing one are never invoked.
pub async fn sequence<T, E, F, Fut>(tasks: impl IntoIterator<Item = F>) -> Result<Vec<T>, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut collector = Vec::new();
    for task in tasks {
        collector.push(task().await?);
    }
    Ok(collector)
}

/// Run tasks concurrently on the current task.
///
/// Resolves with all outputs (in task order) or fails with any error.
pub async fn parallel<T, E, F, Fut>(tasks: impl IntoIterator<Item = F>) -> Result<Vec<T>, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    futures::future::try_join_all(tasks.into_iter().map(|task| task())).await
}

/// Run tasks one at a time until one succeeds.
///
/// Fails with the error of the *last* task when all of them fail, and
/// with `FirstError::NoTasks` when there is nothing to run.
pub async fn first<T, E, F, Fut>(tasks: impl IntoIterator<Item = F>) -> Result<T, FirstError<E>>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut last_error = None;
    for task in tasks {
        match task().await {
            Ok(value) => return Ok(value),
            Err(error) => last_error = Some(error),
        }
    }

    match last_error {
        Some(error) => Err(FirstError::AllFailed(error)),
        None => Err(FirstError::NoTasks),
    }
}

/// `first` over factories that all receive the same input
pub struct FirstFactory<F> {
    factories: Vec<F>,
}

impl<F> FirstFactory<F> {
    pub fn new(factories: impl IntoIterator<Item = F>) -> Self {
        Self {
            factories: factories.into_iter().collect(),
        }
    }

    /// Call the factories in order with `input` until one succeeds
    pub async fn call<I, T, E, Fut>(&self, input: I) -> Result<T, FirstError<E>>
    where
        I: Clone,
        F: Fn(I) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        first(self.factories.iter().map(|factory| {
            let input = input.clone();
            move || factory(input)
        }))
        .await
    }
}

/// Shorthand for `FirstFactory::new`
pub fn first_factory<F>(factories: impl IntoIterator<Item = F>) -> FirstFactory<F> {
    FirstFactory::new(factories)
}

/// Run a task and replace its error with the output of `to_error`
pub async fn map_error<T, E, E2, F, Fut, H>(task: F, to_error: H) -> Result<T, E2>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    H: FnOnce(E) -> E2,
{
    task().await.map_err(to_error)
}

/// Run a task and let `on_error` observe its error.
///
/// The original error is always returned; whatever `on_error` returns
/// (including its own errors) is discarded.
pub async fn tap_error<T, E, R, F, Fut, H>(task: F, on_error: H) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    H: FnOnce(&E) -> R,
{
    match task().await {
        Ok(value) => Ok(value),
        Err(error) => {
            let _ = on_error(&error);
            Err(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_parallel_preserves_order() {
        let tasks = (0..5).map(|i| move || async move { Ok::<_, String>(i * 2) });
        let results = parallel(tasks).await.unwrap();
        assert_eq!(results, vec![0, 2, 4, 6, 8]);
    }

    #[tokio::test]
    async fn test_parallel_fails_with_error() {
        let tasks = (0..3).map(|i| move || async move {
            if i == 1 {
                Err(format!("task {} failed", i))
            } else {
                Ok(i)
            }
        });
        assert_eq!(parallel(tasks).await, Err("task 1 failed".to_string()));
    }

    #[tokio::test]
    async fn test_first_with_no_tasks() {
        let tasks: Vec<fn() -> std::future::Ready<Result<u8, String>>> = vec![];
        assert_eq!(first(tasks).await, Err(FirstError::NoTasks));
    }

    #[test]
    fn test_first_error_into_inner() {
        assert_eq!(FirstError::AllFailed("e").into_inner(), Some("e"));
        assert_eq!(FirstError::<&str>::NoTasks.into_inner(), None);
    }
}
