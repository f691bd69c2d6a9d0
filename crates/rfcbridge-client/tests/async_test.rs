//! Async Façade Tests
//!
//! Exercises `AsyncConnection` on the tokio runtime: shared clones, calls
//! serialised through the session mutex and the unit lifecycle.

use rfcbridge_client::{AsyncConnection, CallOptions};
use rfcbridge_common::{record, ConnectionConfig, ErrorGroup, Record, UnitCall, UnitPhase, Value};

mod common;
use common::{backend, init_tracing, params};

async fn open() -> AsyncConnection<rfcbridge_client::backend::MemoryBackend> {
    init_tracing();
    AsyncConnection::open(backend(), params(), ConnectionConfig::default())
        .await
        .expect("in-memory logon succeeds")
}

#[tokio::test]
async fn test_async_call() {
    let conn = open().await;
    let input = record! { "REQUTEXT" => "async" };
    let result = conn
        .call("STFC_CONNECTION", CallOptions::new(), input)
        .await
        .unwrap();
    assert_eq!(result.get("ECHOTEXT"), Some(&Value::from("async")));
    assert!(conn.alive().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_calls_through_clones() {
    let conn = open().await;
    let mut handles = Vec::new();
    for i in 0..8 {
        let conn = conn.clone();
        handles.push(tokio::spawn(async move {
            let text = format!("request {}", i);
            let input = record! { "REQUTEXT" => text.as_str() };
            let result = conn
                .call("STFC_CONNECTION", CallOptions::new(), input)
                .await?;
            assert_eq!(result.get("ECHOTEXT"), Some(&Value::from(text)));
            Ok::<_, rfcbridge_common::RfcError>(())
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let guard = conn.lock().await;
    assert_eq!(guard.backend().executions().len(), 8);
    assert_eq!(guard.backend().live_containers(), 0);
}

#[tokio::test]
async fn test_async_reopen_after_communication_failure() {
    let conn = open().await;
    let err = conn
        .call("Z_LINK_DOWN", CallOptions::new(), Record::new())
        .await
        .unwrap_err();
    assert_eq!(err.group(), Some(ErrorGroup::CommunicationFailure));
    assert!(!conn.alive().await);

    let err = conn.ping().await.unwrap_err();
    assert!(err.is_connection_fatal());

    conn.call("RFC_PING", CallOptions::new(), Record::new())
        .await
        .unwrap();
    assert!(conn.alive().await);
    conn.ping().await.unwrap();
}

#[tokio::test]
async fn test_async_unit_lifecycle() {
    let conn = open().await;
    let unit = conn.initialize_unit(true).await.unwrap();
    assert_eq!(unit.id.len(), 32);

    let calls = vec![UnitCall::new("RFC_PING", Record::new())];
    let unit = conn
        .fill_and_submit_unit(unit, calls, vec!["QUEUE".to_string()], None)
        .await
        .unwrap();
    assert_eq!(unit.queued, Some(true));

    let attributes = conn.get_connection_attributes().await.unwrap().unwrap();
    assert!(attributes.active_unit);

    conn.lock().await.backend_mut().process_queues();
    let unit = conn.confirm_unit(unit).await.unwrap();
    assert_eq!(unit.phase, UnitPhase::Confirmed);
}

#[tokio::test]
async fn test_async_close() {
    let conn = open().await;
    let desc = conn
        .get_function_description("STFC_STRUCTURE")
        .await
        .unwrap();
    assert_eq!(desc.parameters().len(), 4);

    conn.close().await.unwrap();
    assert!(!conn.alive().await);
    assert!(conn.get_connection_attributes().await.unwrap().is_none());

    conn.reopen().await.unwrap();
    assert!(conn.alive().await);
}
