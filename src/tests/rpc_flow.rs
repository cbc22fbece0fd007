use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::rpc::message::{
    RpcResponse, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR,
};
use crate::rpc::{ClientError, RpcClient, RpcServer, SearchService};
use crate::settings::SearchSettings;
use crate::vector::Mode;

use super::{borrow_rows, engine_fixture, uniform_rows, STUB_MODEL};

const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Serve an engine fixture on a loopback port. Returns the address, the
/// shutdown sender, and guards that must stay alive for the duration.
async fn serve(
    rows: &[(u64, &str, &str, &str)],
    chunk_size: usize,
) -> (
    String,
    watch::Sender<bool>,
    tempfile::TempDir,
    tokio::task::JoinHandle<std::io::Result<()>>,
) {
    let (dir, engine) = engine_fixture(rows);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let service = Arc::new(SearchService::new(
        engine,
        STUB_MODEL.to_string(),
        chunk_size,
        shutdown_tx.clone(),
    ));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let server_task = tokio::spawn(async move {
        RpcServer::new(service).serve(listener, shutdown_rx).await
    });

    (addr, shutdown_tx, dir, server_task)
}

fn client(addr: &str) -> RpcClient {
    RpcClient::new(addr.to_string(), CLIENT_TIMEOUT)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_status_over_the_wire() {
    let rows = [
        (1, "alice", "2022-01-01 10:00:00", "hello world"),
        (2, "bob", "2022-01-02 10:00:00", "second post"),
    ];
    let (addr, _shutdown, _dir, _task) = serve(&rows, 20_000).await;

    let status = client(&addr).get_status().await.unwrap();
    assert_eq!(status["status"], "running");
    assert_eq!(status["ready"], true);
    assert_eq!(status["model"], STUB_MODEL);
    assert_eq!(status["loaded_records"], 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_search_similar_over_the_wire() {
    let rows = [
        (1, "alice", "2022-01-01 10:00:00", "rust programming tips"),
        (2, "bob", "2022-01-02 10:00:00", "gardening advice"),
        (3, "alice", "2022-01-03 10:00:00", "more rust programming"),
    ];
    let (addr, _shutdown, _dir, _task) = serve(&rows, 20_000).await;

    let settings = SearchSettings {
        top_k: 2,
        ..Default::default()
    };
    let results = client(&addr)
        .search_similar("rust programming", &settings, Mode::Content, None)
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].rank, 1);
    assert!(results[0].score >= results[1].score);
    assert!(results.iter().all(|r| r.content.contains("rust")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unbounded_vector_search_streams_chunks() {
    let rows = uniform_rows(50);
    let (addr, _shutdown, _dir, _task) = serve(&borrow_rows(&rows), 20).await;

    // raw connection: verify the actual chunk envelopes
    let stream = tokio::net::TcpStream::connect(&addr).await.unwrap();
    let (read_half, mut write_half) = stream.into_split();
    write_half
        .write_all(
            b"{\"jsonrpc\":\"2.0\",\"id\":7,\"method\":\"vector_search\",\"params\":{\"query\":\"post\"}}\n",
        )
        .await
        .unwrap();

    let mut lines = BufReader::new(read_half).lines();
    let mut responses = Vec::new();
    loop {
        let line = lines.next_line().await.unwrap().unwrap();
        let response: RpcResponse = serde_json::from_str(&line).unwrap();
        let more = response.more.expect("streamed response must carry more");
        responses.push(response);
        if !more {
            break;
        }
    }

    // 50 results / chunk size 20 -> 3 chunks
    assert_eq!(responses.len(), 3);
    let mut total = 0;
    for (i, response) in responses.iter().enumerate() {
        assert_eq!(response.id, json!(7));
        let result = response.result.as_ref().unwrap();
        assert_eq!(result["chunk"], i as u64 + 1);
        assert_eq!(result["total_chunks"], 3);
        assert_eq!(result["start_rank"], (i * 20 + 1) as u64);
        assert_eq!(response.more, Some(i < 2));
        total += result["data"].as_array().unwrap().len();
    }
    assert_eq!(total, 50);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_client_reassembles_chunks() {
    let rows = uniform_rows(50);
    let (addr, _shutdown, _dir, _task) = serve(&borrow_rows(&rows), 20).await;

    let all = client(&addr)
        .vector_search("post", Mode::Content, None)
        .await
        .unwrap();
    assert_eq!(all.len(), 50);
    for pair in all.windows(2) {
        assert!(pair[0].1 >= pair[1].1);
    }

    // bounded query: same prefix, single message
    let five = client(&addr)
        .vector_search("post", Mode::Content, Some(5))
        .await
        .unwrap();
    assert_eq!(five, all[..5].to_vec());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_protocol_errors() {
    let rows = [(1, "a", "2022-01-01 10:00:00", "x")];
    let (addr, _shutdown, _dir, _task) = serve(&rows, 20_000).await;

    let stream = tokio::net::TcpStream::connect(&addr).await.unwrap();
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    // parse error
    write_half.write_all(b"this is not json\n").await.unwrap();
    let response: RpcResponse =
        serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
    assert_eq!(response.error.unwrap().code, PARSE_ERROR);

    // missing jsonrpc field
    write_half
        .write_all(b"{\"id\":1,\"method\":\"get_status\"}\n")
        .await
        .unwrap();
    let response: RpcResponse =
        serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
    assert_eq!(response.error.unwrap().code, INVALID_REQUEST);

    // unknown method: only the explicit table is reachable
    write_half
        .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"__import__\"}\n")
        .await
        .unwrap();
    let response: RpcResponse =
        serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
    assert_eq!(response.error.unwrap().code, METHOD_NOT_FOUND);

    // invalid params (query is required)
    write_half
        .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":3,\"method\":\"search_similar\",\"params\":{}}\n")
        .await
        .unwrap();
    let response: RpcResponse =
        serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
    let error = response.error.unwrap();
    assert_eq!(error.code, INVALID_PARAMS);
    assert_eq!(error.kind(), Some("validation"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_validation_error_over_the_wire() {
    let rows = [(1, "a", "2022-01-01 10:00:00", "x")];
    let (addr, _shutdown, _dir, _task) = serve(&rows, 20_000).await;

    let settings = SearchSettings {
        top_k: 150,
        ..Default::default()
    };
    let result = client(&addr)
        .search_similar("x", &settings, Mode::Content, None)
        .await;

    match result {
        Err(ClientError::Rpc(error)) => {
            assert_eq!(error.code, INVALID_PARAMS);
            assert_eq!(error.kind(), Some("validation"));
            assert!(error.message.contains("top_k"));
        }
        other => panic!("expected rpc error, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_server_shuts_down() {
    let rows = [(1, "a", "2022-01-01 10:00:00", "x")];
    let (addr, _shutdown, _dir, task) = serve(&rows, 20_000).await;

    let result = client(&addr).stop_server().await.unwrap();
    assert_eq!(result["status"], "stopping");

    // the accept loop must terminate
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("server did not stop")
        .unwrap()
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_client_distinguishes_not_running() {
    // bind a port, then free it: nothing is listening afterwards
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    let result = client(&addr).get_status().await;
    assert!(matches!(result, Err(ClientError::NotRunning)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_client_ignores_foreign_ids() {
    // a hand-rolled server that interleaves a stale response before the
    // real one
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();
        let line = lines.next_line().await.unwrap().unwrap();
        let request: Value = serde_json::from_str(&line).unwrap();
        let id = request["id"].clone();

        let stale = json!({"jsonrpc": "2.0", "id": 999_999, "result": {"stale": true}});
        let real = json!({"jsonrpc": "2.0", "id": id, "result": {"stale": false}});
        let payload = format!("{stale}\n{real}\n");
        write_half.write_all(payload.as_bytes()).await.unwrap();
    });

    let result = client(&addr).get_status().await.unwrap();
    assert_eq!(result["stale"], false);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_requests_are_independent() {
    let rows = uniform_rows(30);
    let (addr, _shutdown, _dir, _task) = serve(&borrow_rows(&rows), 10).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let addr = addr.clone();
        handles.push(tokio::spawn(async move {
            client(&addr)
                .vector_search("post", Mode::Content, None)
                .await
                .unwrap()
        }));
    }

    for handle in handles {
        let results = handle.await.unwrap();
        assert_eq!(results.len(), 30);
    }
}
