//! Custom envelope formatters on the success and failure paths.

mod common;

use common::{builder, ScriptedTransport};
use httpflex::response::FormatContext;
use httpflex::{Error, ErrorKind, RequestSpec, ResponseEnvelope, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn post(id: i64) -> RequestSpec {
    RequestSpec::new().param("post_id", id)
}

#[tokio::test]
async fn test_formatter_error_yields_formatting_failure() {
    let transport = Arc::new(ScriptedTransport::posts());
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let client = builder(transport.clone())
        .formatter(Arc::new(
            move |_env: ResponseEnvelope, _err: Option<&Error>, _ctx: &FormatContext| -> Result<ResponseEnvelope> {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(Error::configuration("template missing"))
            },
        ))
        .build()
        .unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    client.hooks().register_on_error("collect", move |_, err| {
        sink.lock().unwrap().push(err.kind());
        Ok(())
    });

    let env = client.request(post(1)).await.unwrap();

    assert!(!env.result);
    assert_eq!(env.code, -3);
    assert_eq!(env.error_kind, Some(ErrorKind::Formatting));
    assert!(env.message.contains("template missing"));
    // the failure envelope is not formatted a second time
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(*seen.lock().unwrap(), vec![ErrorKind::Formatting]);
    assert_eq!(transport.calls(), 1);
    assert_eq!(client.cache_stats().sets, 0);
}

#[tokio::test]
async fn test_formatter_rewrites_failed_envelopes() {
    let formatter = |mut env: ResponseEnvelope, err: Option<&Error>, ctx: &FormatContext| -> Result<ResponseEnvelope> {
        if err.is_some() {
            env.message = format!("lookup failed ({})", ctx.status.unwrap_or_default());
        }
        Ok(env)
    };

    let missing = Arc::new(ScriptedTransport::status(404));
    let client = builder(missing).formatter(Arc::new(formatter)).build().unwrap();
    let env = client.request(post(1)).await.unwrap();
    assert!(!env.result);
    assert_eq!(env.code, 404);
    assert_eq!(env.error_kind, Some(ErrorKind::Http));
    assert_eq!(env.message, "lookup failed (404)");

    let found = Arc::new(ScriptedTransport::posts());
    let client = builder(found).formatter(Arc::new(formatter)).build().unwrap();
    let env = client.request(post(1)).await.unwrap();
    assert!(env.result);
    assert_eq!(env.message, "OK");
}
