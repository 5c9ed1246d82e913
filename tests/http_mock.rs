//! End-to-end dispatch through the `reqwest` transport against a mock server.

use httpflex::request::RequiredFieldsValidator;
use httpflex::response::{FileWriteParser, JsonSchemaValidator, RawParser};
use httpflex::{
    BasicAuth, BearerAuth, Client, ClientBuilder, ErrorKind, FilePart, Method, Payload, RequestSpec,
    RetryPolicy,
};
use mockito::{Matcher, Server};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn posts_client(server: &Server) -> ClientBuilder {
    Client::builder()
        .identity("PostsClient")
        .base_url(server.url())
        .endpoint("/posts/{post_id}")
        .retry_policy(RetryPolicy::default().with_backoff(Duration::ZERO, 2.0))
}

#[tokio::test]
async fn test_single_get_produces_flat_envelope() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/posts/1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":1,"title":"x"}"#)
        .create_async()
        .await;

    let client = posts_client(&server).build().unwrap();
    let env = client
        .request(RequestSpec::from_value(json!({"post_id": 1})).unwrap())
        .await
        .unwrap();

    assert_eq!(
        env.to_json(),
        json!({"result": true, "code": 200, "message": "OK", "data": {"id": 1, "title": "x"}})
    );
    mock.assert_async().await;
}

#[tokio::test]
async fn test_leftover_params_become_query_string() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/posts/3")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("lang".into(), "en".into()),
            Matcher::UrlEncoded("tags".into(), "a".into()),
            Matcher::UrlEncoded("tags".into(), "b".into()),
        ]))
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;

    let client = posts_client(&server).build().unwrap();
    let env = client
        .request(
            RequestSpec::new()
                .param("post_id", 3)
                .param("lang", "en")
                .param("tags", json!(["a", "b"])),
        )
        .await
        .unwrap();
    assert!(env.result);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_post_sends_json_body_and_headers() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/posts")
        .match_header("x-api-key", "secret")
        .match_header("x-trace", "abc")
        .match_body(Matcher::Json(json!({"title": "hello", "user_id": 9})))
        .with_status(201)
        .with_body(r#"{"id":101}"#)
        .expect(2)
        .create_async()
        .await;

    let client = posts_client(&server)
        .header("X-Api-Key", "secret")
        .build()
        .unwrap();
    let create = RequestSpec::new()
        .endpoint("/posts")
        .method(Method::Post)
        .header("X-Trace", "abc")
        .param("title", "hello")
        .param("user_id", 9);

    for _ in 0..2 {
        let env = client.request(create.clone()).await.unwrap();
        assert_eq!(env.code, 201);
        assert_eq!(env.message, "Created");
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn test_retryable_status_is_retried_until_exhausted() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/posts/1")
        .with_status(503)
        .with_body("maintenance")
        .expect(4)
        .create_async()
        .await;

    let client = posts_client(&server).build().unwrap();
    let env = client.request(RequestSpec::new().param("post_id", 1)).await.unwrap();

    assert!(!env.result);
    assert_eq!(env.code, 503);
    assert_eq!(env.error_kind, Some(ErrorKind::Http));
    assert_eq!(env.details, Some(json!("maintenance")));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_batch_dedup_hits_server_once_per_unique_request() {
    let mut server = Server::new_async().await;
    let one = server
        .mock("GET", "/posts/1")
        .with_status(200)
        .with_body(r#"{"id":1}"#)
        .expect(1)
        .create_async()
        .await;
    let two = server
        .mock("GET", "/posts/2")
        .with_status(200)
        .with_body(r#"{"id":2}"#)
        .expect(1)
        .create_async()
        .await;

    let client = posts_client(&server).build().unwrap();
    let envs = client
        .request_batch([1, 1, 2].map(|id| RequestSpec::new().param("post_id", id)))
        .await;

    assert_eq!(envs.len(), 3);
    assert_eq!(envs[0], envs[1]);
    assert_eq!(envs[2].data, Payload::Json(json!({"id": 2})));
    one.assert_async().await;
    two.assert_async().await;
}

#[tokio::test]
async fn test_invalid_params_never_reach_the_server() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/posts")
        .with_status(200)
        .expect(0)
        .create_async()
        .await;

    let client = posts_client(&server)
        .endpoint("/posts")
        .request_validator(Arc::new(RequiredFieldsValidator::new(["user_id"])))
        .build()
        .unwrap();
    let env = client.request(RequestSpec::new().param("page", 1)).await.unwrap();

    assert_eq!(env.error_kind, Some(ErrorKind::RequestValidation));
    assert_eq!(env.details.as_ref().map(|d| d.get("user_id").is_some()), Some(true));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_schema_mismatch_fails_without_retry() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/posts/1")
        .with_status(200)
        .with_body(r#"{"id":"one"}"#)
        .expect(1)
        .create_async()
        .await;

    let schema = json!({
        "type": "object",
        "required": ["id"],
        "properties": {"id": {"type": "integer"}}
    });
    let client = posts_client(&server)
        .response_validator(Arc::new(JsonSchemaValidator::new(&schema).unwrap()))
        .build()
        .unwrap();
    let env = client.request(RequestSpec::new().param("post_id", 1)).await.unwrap();

    assert!(!env.result);
    assert_eq!(env.error_kind, Some(ErrorKind::ResponseValidation));
    mock.assert_async().await;

    // invalid responses are not cached either
    client.request(RequestSpec::new().param("post_id", 1)).await.unwrap();
    assert_eq!(client.cache_stats().sets, 0);
}

#[tokio::test]
async fn test_download_streams_body_to_file() {
    let mut server = Server::new_async().await;
    let body = "id,title\n1,x\n".repeat(512);
    let mock = server
        .mock("GET", "/exports/report.csv")
        .with_status(200)
        .with_header("content-type", "text/csv")
        .with_body(body.clone())
        .create_async()
        .await;

    let dir = std::env::temp_dir().join(format!("httpflex-{}", uuid::Uuid::new_v4().simple()));
    let client = posts_client(&server)
        .endpoint("/exports/{name}")
        .parser(Arc::new(FileWriteParser::new(&dir)))
        .build()
        .unwrap();

    let env = client
        .request(RequestSpec::new().param("name", "report.csv").filename("q3.csv"))
        .await
        .unwrap();
    mock.assert_async().await;

    let path = match env.data {
        Payload::File(ref p) => p.clone(),
        ref other => panic!("expected a file payload, got {:?}", other),
    };
    assert_eq!(path, dir.join("q3.csv"));
    assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), body);
    tokio::fs::remove_dir_all(&dir).await.unwrap();
}

#[tokio::test]
async fn test_files_are_sent_as_multipart() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/uploads")
        .match_header("content-type", Matcher::Regex("^multipart/form-data".into()))
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex("notes.txt".into()),
            Matcher::Regex("hello upload".into()),
            Matcher::Regex("quarterly".into()),
        ]))
        .with_status(200)
        .with_body(r#"{"stored":true}"#)
        .create_async()
        .await;

    let client = posts_client(&server).build().unwrap();
    let env = client
        .request(
            RequestSpec::new()
                .endpoint("/uploads")
                .method(Method::Post)
                .param("label", "quarterly")
                .file(FilePart::new("file", "notes.txt", "hello upload").with_mime("text/plain")),
        )
        .await
        .unwrap();

    assert!(env.result, "{:?}", env);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_unreachable_host_is_a_network_failure() {
    let client = Client::builder()
        .base_url("http://127.0.0.1:1")
        .endpoint("/posts/{post_id}")
        .retry_policy(RetryPolicy::disabled())
        .build()
        .unwrap();

    let env = client.request(RequestSpec::new().param("post_id", 1)).await.unwrap();
    assert!(!env.result);
    assert_eq!(env.code, -1);
    assert_eq!(env.error_kind, Some(ErrorKind::Network));
}

/// Serve one request with a body trickled out a byte at a time.
async fn trickle_server(body: &'static [u8], gap: Duration) -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        socket.set_nodelay(true).unwrap();
        let mut head = Vec::new();
        let mut buf = [0u8; 1024];
        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                return;
            }
            head.extend_from_slice(&buf[..n]);
        }
        let status = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: text/plain\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
            body.len()
        );
        socket.write_all(status.as_bytes()).await.unwrap();
        for byte in body {
            tokio::time::sleep(gap).await;
            socket.write_all(&[*byte]).await.unwrap();
        }
        socket.flush().await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_slow_download_outlives_request_timeout() {
    let base = trickle_server(b"0123456789", Duration::from_millis(80)).await;
    let dir = std::env::temp_dir().join(format!("httpflex-{}", uuid::Uuid::new_v4().simple()));
    let client = Client::builder()
        .base_url(base)
        .endpoint("/exports/{name}")
        .timeout(Duration::from_millis(300))
        .retry_policy(RetryPolicy::disabled())
        .parser(Arc::new(FileWriteParser::new(&dir)))
        .build()
        .unwrap();

    // ten bytes at 80 ms each take well over the 300 ms request timeout
    let env = client
        .request(RequestSpec::new().param("name", "slow.txt"))
        .await
        .unwrap();

    assert!(env.result, "{:?}", env);
    let path = dir.join("slow.txt");
    assert_eq!(env.data, Payload::File(path.clone()));
    assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "0123456789");
    tokio::fs::remove_dir_all(&dir).await.unwrap();
}

#[tokio::test]
async fn test_repeated_response_headers_are_kept() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/posts/1")
        .with_status(200)
        .with_header("set-cookie", "session=abc")
        .with_header("set-cookie", "theme=dark")
        .with_body("{}")
        .create_async()
        .await;

    let client = posts_client(&server)
        .parser(Arc::new(RawParser))
        .build()
        .unwrap();
    let env = client.request(RequestSpec::new().param("post_id", 1)).await.unwrap();
    mock.assert_async().await;

    match env.data {
        Payload::Raw(ref raw) => assert_eq!(raw.headers["set-cookie"], "session=abc, theme=dark"),
        ref other => panic!("expected a raw payload, got {:?}", other),
    }
}

#[tokio::test]
async fn test_basic_auth_sets_authorization_header() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/posts/1")
        .match_header("authorization", "Basic dXNlcjpwYXNz")
        .with_status(200)
        .with_body(r#"{"id":1}"#)
        .create_async()
        .await;

    let client = posts_client(&server)
        .authentication(Arc::new(BasicAuth::new("user", "pass")))
        .build()
        .unwrap();
    let env = client.request(RequestSpec::new().param("post_id", 1)).await.unwrap();

    assert!(env.result, "{:?}", env);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_bearer_auth_overrides_request_header() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/posts/2")
        .match_header("authorization", "Bearer t0k3n")
        .with_status(200)
        .with_body(r#"{"id":2}"#)
        .expect(2)
        .create_async()
        .await;

    let client = posts_client(&server)
        .authentication(Arc::new(BearerAuth::new("t0k3n")))
        .cache_enabled(false)
        .build()
        .unwrap();
    for spec in [
        RequestSpec::new().param("post_id", 2),
        RequestSpec::new().param("post_id", 2).header("authorization", "Bearer stale"),
    ] {
        assert!(client.request(spec).await.unwrap().result);
    }
    mock.assert_async().await;
}
