use std::sync::{Arc, Mutex};

use sql_batch::prelude::*;
use sql_batch::test_utils::{Call, Response, ScriptedBackend};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn int_rows(values: &[i64]) -> Vec<Vec<RowValues>> {
    values.iter().map(|v| vec![RowValues::Int(*v)]).collect()
}

#[tokio::test]
async fn successful_batch_commits_once_with_aligned_results() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let mut backend = ScriptedBackend::new()
        .on("INSERT a", Response::Affected(1))
        .on("SELECT a", Response::rows(&["v"], int_rows(&[10])))
        .on("DELETE none", Response::Affected(0));

    let results = execute_batch(
        &mut backend,
        vec![
            Command::new("INSERT a").affect(1),
            Command::new("SELECT a").read_one(|row| row.get::<i64>(0)),
            Command::new("DELETE none").affect(-1),
        ],
    )
    .await?;

    assert_eq!(results.len(), 3);
    assert!(!results.is_set(0));
    assert_eq!(results.get::<i64>(1), Some(&10));
    assert!(!results.is_set(2));

    let journal = backend.journal();
    assert_eq!((journal.begins, journal.commits, journal.rollbacks), (1, 1, 0));
    assert_eq!(journal.calls.len(), 3);
    Ok(())
}

#[tokio::test]
async fn positive_affect_must_match_exactly() {
    for (actual, ok) in [(2_u64, true), (1, false), (3, false), (0, false)] {
        let mut backend = ScriptedBackend::new().on("UPDATE t", Response::Affected(actual));
        let outcome =
            execute_batch(&mut backend, vec![Command::new("UPDATE t").affect(2)]).await;
        assert_eq!(outcome.is_ok(), ok, "actual = {actual}");
        if let Err(failure) = outcome {
            match failure.error() {
                BatchError::RowCountMismatch {
                    index,
                    expected,
                    actual: got,
                    query,
                } => {
                    assert_eq!((*index, *expected, *got), (0, 2, actual));
                    assert_eq!(query, "UPDATE t");
                }
                other => panic!("unexpected error: {other}"),
            }
            assert_eq!(backend.journal().rollbacks, 1);
            assert_eq!(backend.journal().commits, 0);
        }
    }
}

#[tokio::test]
async fn negative_affect_expects_no_rows() {
    let mut backend = ScriptedBackend::new()
        .on("DELETE zero", Response::Affected(0))
        .on("DELETE one", Response::Affected(1));

    assert!(
        execute_batch(&mut backend, vec![Command::new("DELETE zero").affect(-7)])
            .await
            .is_ok()
    );

    let failure = execute_batch(&mut backend, vec![Command::new("DELETE one").affect(-1)])
        .await
        .unwrap_err();
    assert!(matches!(
        failure.error(),
        BatchError::RowCountMismatch {
            expected: 0,
            actual: 1,
            ..
        }
    ));
}

#[tokio::test]
async fn zero_affect_takes_the_read_path() -> Result<(), Box<dyn std::error::Error>> {
    // Scripted `execute` would report 5 rows, but a read command never calls it.
    let mut backend = ScriptedBackend::new().on("UPDATE many", Response::rows(&["x"], int_rows(&[1, 2, 3, 4, 5])));
    let results = execute_batch(&mut backend, vec![Command::new("UPDATE many")]).await?;
    assert!(!results.is_set(0));
    let journal = backend.journal();
    assert_eq!(journal.rows_visited, 5, "read path drains the cursor");
    assert_eq!(journal.cursors_released, 1);
    Ok(())
}

#[tokio::test]
async fn read_one_runs_once_and_skips_remaining_rows() -> Result<(), Box<dyn std::error::Error>> {
    let calls = Arc::new(Mutex::new(0_usize));
    let seen = Arc::clone(&calls);
    let mut backend = ScriptedBackend::new()
        .on("SELECT many", Response::rows(&["v"], int_rows(&[7, 8, 9])))
        .on("SELECT none", Response::rows(&["v"], Vec::new()));

    let results = execute_batch(
        &mut backend,
        vec![
            Command::new("SELECT many").read_one(move |row| {
                *seen.lock().unwrap() += 1;
                row.get::<i64>(0)
            }),
            Command::new("SELECT none").read_one(|row| row.get::<i64>(0)),
        ],
    )
    .await?;

    assert_eq!(*calls.lock().unwrap(), 1);
    assert_eq!(results.get::<i64>(0), Some(&7));
    assert!(!results.is_set(1), "empty row set leaves the slot unset");
    assert_eq!(backend.journal().rows_visited, 1);
    Ok(())
}

#[tokio::test]
async fn read_one_wins_over_read_all() -> Result<(), Box<dyn std::error::Error>> {
    let mut backend =
        ScriptedBackend::new().on("SELECT v", Response::rows(&["v"], int_rows(&[1, 2])));
    let results = execute_batch(
        &mut backend,
        vec![
            Command::new("SELECT v")
                .read_all(Vec::<i64>::new(), |_, _| {
                    Err(SqlBatchDbError::Other("read_all must not run".into()))
                })
                .read_one(|row| row.get::<i64>(0)),
        ],
    )
    .await?;
    assert_eq!(results.get::<i64>(0), Some(&1));
    Ok(())
}

#[tokio::test]
async fn read_all_folds_rows_in_order() -> Result<(), Box<dyn std::error::Error>> {
    let mut backend = ScriptedBackend::new()
        .on("SELECT v", Response::rows(&["v"], int_rows(&[3, 1, 2])))
        .on("SELECT empty", Response::rows(&["v"], Vec::new()));

    let results = execute_batch(
        &mut backend,
        vec![
            Command::new("SELECT v").read_all(String::from(">"), |mut acc, row| {
                acc.push_str(&row.get::<i64>(0)?.to_string());
                Ok(acc)
            }),
            Command::new("SELECT empty").read_all(42_i64, |acc, row| {
                Ok(acc + row.get::<i64>(0)?)
            }),
        ],
    )
    .await?;

    assert_eq!(results.get::<String>(0).map(String::as_str), Some(">312"));
    assert_eq!(results.get::<i64>(1), Some(&42), "zero rows keep the seed");
    Ok(())
}

#[tokio::test]
async fn resolver_sees_only_earlier_results() -> Result<(), Box<dyn std::error::Error>> {
    let mut backend = ScriptedBackend::new()
        .on("SELECT id", Response::rows(&["id"], int_rows(&[55])))
        .on("SELECT later", Response::rows(&["id"], int_rows(&[99])))
        .on("UPDATE t", Response::Affected(1));

    let observed = Arc::new(Mutex::new(Vec::new()));
    let record = Arc::clone(&observed);
    execute_batch(
        &mut backend,
        vec![
            Command::new("SELECT id").read_one(|row| row.get::<i64>(0)),
            Command::new("UPDATE t")
                .arg(RowValues::Text("ignored".into()))
                .args_resolver(move |results| {
                    let snapshot: Vec<bool> = (0..results.len()).map(|i| results.is_set(i)).collect();
                    record.lock().unwrap().extend(snapshot);
                    let id = results.get::<i64>(0).copied().unwrap_or_default();
                    Ok(vec![RowValues::Int(id)])
                })
                .affect(1),
            Command::new("SELECT later").read_one(|row| row.get::<i64>(0)),
        ],
    )
    .await?;

    assert_eq!(*observed.lock().unwrap(), vec![true, false, false]);
    assert_eq!(
        backend.journal().calls[1],
        Call {
            query: "UPDATE t".into(),
            args: vec![RowValues::Int(55)],
        }
    );
    Ok(())
}

#[tokio::test]
async fn failure_stops_later_commands_and_keeps_partial_results() {
    let mut backend = ScriptedBackend::new()
        .on("SELECT a", Response::rows(&["v"], int_rows(&[1])))
        .on("INSERT bad", Response::Fail("UNIQUE constraint failed".into()))
        .on("INSERT c", Response::Affected(1));

    let failure = execute_batch(
        &mut backend,
        vec![
            Command::new("SELECT a").read_one(|row| row.get::<i64>(0)),
            Command::new("INSERT bad").affect(1),
            Command::new("INSERT c").affect(1),
        ],
    )
    .await
    .unwrap_err();

    assert_eq!(failure.error().kind(), BatchErrorKind::Execution);
    assert_eq!(failure.error().command_index(), Some(1));
    assert!(failure.to_string().contains("UNIQUE constraint failed"));
    assert_eq!(failure.partial_results().get::<i64>(0), Some(&1));
    assert_eq!(failure.partial_results().len(), 3);

    let journal = backend.journal();
    assert_eq!(journal.calls.len(), 2, "INSERT c never runs");
    assert_eq!((journal.commits, journal.rollbacks), (0, 1));
}

#[tokio::test]
async fn resolver_error_aborts_before_execution() {
    let mut backend = ScriptedBackend::new().on("UPDATE t", Response::Affected(1));
    let failure = execute_batch(
        &mut backend,
        vec![Command::new("UPDATE t")
            .args_resolver(|_| Err(SqlBatchDbError::Other("no upstream id".into())))
            .affect(1)],
    )
    .await
    .unwrap_err();
    assert_eq!(failure.error().kind(), BatchErrorKind::Resolve);
    assert!(backend.journal().calls.is_empty());
    assert_eq!(backend.journal().rollbacks, 1);
}

#[tokio::test]
async fn decode_error_releases_cursor_and_rolls_back() {
    let mut backend = ScriptedBackend::new()
        .on("SELECT name", Response::rows(&["name"], vec![vec![RowValues::Null]]))
        .on("INSERT after", Response::Affected(1));
    let failure = execute_batch(
        &mut backend,
        vec![
            Command::new("SELECT name").read_one(|row| row.get::<String>(0)),
            Command::new("INSERT after").affect(1),
        ],
    )
    .await
    .unwrap_err();

    assert_eq!(failure.error().kind(), BatchErrorKind::Decode);
    assert!(!failure.partial_results().is_set(0));
    let journal = backend.journal();
    assert_eq!(journal.cursors_released, 1);
    assert_eq!(journal.calls.len(), 1);
    assert_eq!(journal.rollbacks, 1);
}

#[tokio::test]
async fn iteration_fault_is_reported_after_rows() {
    let mut backend = ScriptedBackend::new().on(
        "SELECT v",
        Response::rows(&["v"], int_rows(&[1, 2])).with_fault("connection reset"),
    );
    let failure = execute_batch(
        &mut backend,
        vec![Command::new("SELECT v").read_all(0_i64, |acc, row| Ok(acc + row.get::<i64>(0)?))],
    )
    .await
    .unwrap_err();

    assert_eq!(failure.error().kind(), BatchErrorKind::Iteration);
    assert!(!failure.partial_results().is_set(0));
    assert_eq!(backend.journal().rows_visited, 2);
    assert_eq!(backend.journal().cursors_released, 1);
}

#[tokio::test]
async fn release_fault_aborts_batch() {
    let mut backend = ScriptedBackend::new()
        .on(
            "SELECT v",
            Response::rows(&["v"], int_rows(&[1])).with_release_fault("close failed"),
        )
        .on("INSERT after", Response::Affected(1));
    let failure = execute_batch(
        &mut backend,
        vec![
            Command::new("SELECT v").read_one(|row| row.get::<i64>(0)),
            Command::new("INSERT after").affect(1),
        ],
    )
    .await
    .unwrap_err();
    assert_eq!(failure.error().kind(), BatchErrorKind::Release);
    assert_eq!(backend.journal().calls.len(), 1);
}

#[tokio::test]
async fn cursors_are_released_before_the_next_command() -> Result<(), Box<dyn std::error::Error>> {
    let mut backend = ScriptedBackend::new()
        .on("SELECT a", Response::rows(&["v"], int_rows(&[1, 2, 3])))
        .on("SELECT b", Response::rows(&["v"], int_rows(&[4])))
        .on("UPDATE c", Response::Affected(1));
    execute_batch(
        &mut backend,
        vec![
            Command::new("SELECT a").read_one(|row| row.get::<i64>(0)),
            Command::new("SELECT b"),
            Command::new("UPDATE c").affect(1),
        ],
    )
    .await?;
    let journal = backend.journal();
    assert_eq!(journal.cursors_opened, 2);
    assert_eq!(journal.cursors_released, 2);
    assert_eq!(journal.overlapping_cursor_calls, 0);
    Ok(())
}

#[tokio::test]
async fn commit_failure_is_distinct() {
    let mut backend = ScriptedBackend::new()
        .on("INSERT a", Response::Affected(1))
        .on("SELECT a", Response::rows(&["v"], int_rows(&[5])))
        .fail_commit("could not serialize access");

    let failure = execute_batch(
        &mut backend,
        vec![
            Command::new("INSERT a").affect(1),
            Command::new("SELECT a").read_one(|row| row.get::<i64>(0)),
        ],
    )
    .await
    .unwrap_err();

    assert!(matches!(failure.error(), BatchError::Commit(_)));
    assert_eq!(failure.error().command_index(), None);
    // Every command ran, so the results are complete even though nothing is durable.
    assert_eq!(failure.partial_results().get::<i64>(1), Some(&5));
    assert_eq!(backend.journal().commits, 0);
}

#[tokio::test]
async fn begin_failure_runs_nothing() {
    let mut backend = ScriptedBackend::new().fail_begin("pool exhausted");
    let failure = execute_batch(&mut backend, vec![Command::new("INSERT a").affect(1)])
        .await
        .unwrap_err();
    assert_eq!(failure.error().kind(), BatchErrorKind::Begin);
    assert_eq!(failure.partial_results().len(), 1);
    assert!(backend.journal().calls.is_empty());
}

#[tokio::test]
async fn rollback_failure_does_not_mask_command_error() {
    let mut backend = ScriptedBackend::new()
        .on("UPDATE t", Response::Affected(0))
        .fail_rollback("connection lost");
    let failure = execute_batch(&mut backend, vec![Command::new("UPDATE t").affect(1)])
        .await
        .unwrap_err();
    assert_eq!(failure.error().kind(), BatchErrorKind::RowCountMismatch);
    assert_eq!(backend.journal().dropped_open, 0);
}

#[tokio::test]
async fn panicking_reader_still_finalizes_transaction() {
    let backend = ScriptedBackend::new().on("SELECT v", Response::rows(&["v"], int_rows(&[1])));
    let mut task_backend = backend.clone();
    let handle = tokio::spawn(async move {
        execute_batch(
            &mut task_backend,
            vec![Command::new("SELECT v").read_one(|_| -> Result<i64, SqlBatchDbError> {
                panic!("reader exploded")
            })],
        )
        .await
        .map(|_| ())
        .map_err(|failure| failure.to_string())
    });
    let joined = handle.await;
    assert!(joined.is_err_and(|err| err.is_panic()));

    let journal = backend.journal();
    assert_eq!(journal.commits, 0);
    assert_eq!(journal.dropped_open, 1);
    assert_eq!(journal.rollbacks, 1);
}

#[tokio::test]
async fn handler_runs_successive_batches() -> Result<(), Box<dyn std::error::Error>> {
    let backend = ScriptedBackend::new().on("INSERT a", Response::Affected(1));
    let mut handler = BatchHandler::new(backend.clone());
    handler.batch(vec![Command::new("INSERT a").affect(1)]).await?;
    handler.batch(vec![Command::new("INSERT a").affect(1)]).await?;
    assert!(handler.batch(vec![Command::new("INSERT a").affect(2)]).await.is_err());

    let journal = backend.journal();
    assert_eq!((journal.begins, journal.commits, journal.rollbacks), (3, 2, 1));
    Ok(())
}

#[tokio::test]
async fn empty_batch_commits() -> Result<(), Box<dyn std::error::Error>> {
    let mut backend = ScriptedBackend::new();
    let results = execute_batch(&mut backend, Vec::new()).await?;
    assert!(results.is_empty());
    assert_eq!(backend.journal().commits, 1);
    Ok(())
}

#[tokio::test]
async fn only_read_one_opens_single_row_queries() -> Result<(), Box<dyn std::error::Error>> {
    let mut backend = ScriptedBackend::new()
        .on("SELECT one", Response::rows(&["v"], int_rows(&[4, 5])))
        .on("SELECT all", Response::rows(&["v"], int_rows(&[4, 5])))
        .on("SELECT drain", Response::rows(&["v"], int_rows(&[4, 5])));

    let results = execute_batch(
        &mut backend,
        vec![
            Command::new("SELECT one").read_one(|row| row.get::<i64>(0)),
            Command::new("SELECT all").read_all(0_i64, |acc, row| Ok(acc + row.get::<i64>(0)?)),
            Command::new("SELECT drain"),
        ],
    )
    .await?;

    assert_eq!(results.get::<i64>(0), Some(&4));
    assert_eq!(results.get::<i64>(1), Some(&9));
    let journal = backend.journal();
    assert_eq!(journal.single_row_queries, 1);
    assert_eq!(journal.cursors_opened, 3);
    Ok(())
}

#[tokio::test]
async fn failure_source_is_the_batch_error() {
    use std::error::Error as _;

    let mut backend = ScriptedBackend::new().on("UPDATE t", Response::Affected(0));
    let failure = execute_batch(&mut backend, vec![Command::new("UPDATE t").affect(1)])
        .await
        .unwrap_err();

    let source = failure.source().expect("failure carries its batch error");
    let error = source.downcast_ref::<BatchError>().expect("source is a BatchError");
    assert_eq!(error.kind(), BatchErrorKind::RowCountMismatch);
    assert_eq!(error.command_index(), Some(0));
}
