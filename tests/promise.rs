//! Promise Combinator Integration Tests

use std::cell::RefCell;

use omniwire::core::promise::{first, first_factory, map_error, parallel, sequence, tap_error, FirstError};

#[tokio::test]
async fn test_sequence_runs_in_order() {
    let log = RefCell::new(Vec::new());
    let log = &log;

    let tasks = (0..4).map(|i| {
        move || async move {
            log.borrow_mut().push(i);
            Ok::<_, String>(i * 10)
        }
    });

    assert_eq!(sequence(tasks).await, Ok(vec![0, 10, 20, 30]));
    assert_eq!(*log.borrow(), vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn test_sequence_stops_at_first_error() {
    let log = RefCell::new(Vec::new());
    let log = &log;

    let tasks = (0..4).map(|i| {
        move || async move {
            log.borrow_mut().push(i);
            if i == 1 {
                Err(format!("task {} failed", i))
            } else {
                Ok(i)
            }
        }
    });

    assert_eq!(sequence(tasks).await, Err("task 1 failed".to_string()));

    // Tasks after the failing one are never started
    assert_eq!(*log.borrow(), vec![0, 1]);
}

#[tokio::test]
async fn test_sequence_of_nothing() {
    let tasks: Vec<fn() -> std::future::Ready<Result<u8, String>>> = vec![];
    assert_eq!(sequence(tasks).await, Ok(vec![]));
}

#[tokio::test]
async fn test_parallel_collects_in_task_order() {
    let tasks = (0..3).map(|i| {
        move || async move {
            tokio::time::sleep(std::time::Duration::from_millis(30 - i * 10)).await;
            Ok::<_, String>(i)
        }
    });

    assert_eq!(parallel(tasks).await, Ok(vec![0, 1, 2]));
}

#[tokio::test]
async fn test_first_returns_first_success() {
    let log = RefCell::new(Vec::new());
    let log = &log;

    let tasks = (0..4).map(|i| {
        move || async move {
            log.borrow_mut().push(i);
            if i < 2 {
                Err(format!("task {} failed", i))
            } else {
                Ok(i)
            }
        }
    });

    assert_eq!(first(tasks).await, Ok(2));
    assert_eq!(*log.borrow(), vec![0, 1, 2]);
}

#[tokio::test]
async fn test_first_fails_with_last_error() {
    let tasks = (0..3).map(|i| move || async move { Err::<u8, _>(format!("task {} failed", i)) });

    let error = first(tasks).await.unwrap_err();
    assert_eq!(error, FirstError::AllFailed("task 2 failed".to_string()));
    assert_eq!(error.into_inner(), Some("task 2 failed".to_string()));
}

#[tokio::test]
async fn test_first_without_tasks() {
    let tasks: Vec<fn() -> std::future::Ready<Result<u8, String>>> = vec![];
    let error = first(tasks).await.unwrap_err();

    assert_eq!(error, FirstError::NoTasks);
    assert_eq!(error.to_string(), "Must have at least one task for first()");
}

#[tokio::test]
async fn test_first_factory_passes_input() {
    let factories: Vec<Box<dyn Fn(u32) -> std::future::Ready<Result<u32, String>>>> = vec![
        Box::new(|x: u32| std::future::ready(Err(format!("{} rejected", x)))),
        Box::new(|x: u32| std::future::ready(Ok(x + 1))),
    ];

    assert_eq!(first_factory(factories).call(41).await, Ok(42));
}

#[tokio::test]
async fn test_map_error_replaces_error() {
    let result = map_error(|| async { Err::<(), _>(404) }, |code| format!("status {}", code)).await;
    assert_eq!(result, Err("status 404".to_string()));

    let ok = map_error(|| async { Ok::<_, u32>(1) }, |code| format!("status {}", code)).await;
    assert_eq!(ok, Ok(1));
}

#[tokio::test]
async fn test_tap_error_keeps_original_error() {
    let seen = RefCell::new(None);

    let result = tap_error(
        || async { Err::<(), _>("boom".to_string()) },
        |error: &String| {
            *seen.borrow_mut() = Some(error.clone());
            Err::<(), _>("handler failed")
        },
    )
    .await;

    assert_eq!(result, Err("boom".to_string()));
    assert_eq!(seen.borrow().as_deref(), Some("boom"));
}

#[test]
fn test_combinators_without_runtime() {
    use tokio_test::{assert_err, assert_ok, block_on};

    let ok = block_on(sequence((1..=2).map(|i| move || async move { Ok::<_, String>(i) })));
    assert_eq!(assert_ok!(ok), vec![1, 2]);

    let failed = block_on(map_error(|| async { Err::<u8, _>(7u32) }, |code| format!("code {}", code)));
    assert_eq!(assert_err!(failed), "code 7");
}
