use indoc::{formatdoc, indoc};
use integration_tests::{TestServer, redis_available, unique_prefix};
use reqwest::Method;

use super::call;

#[tokio::test]
async fn unreachable_redis_falls_back_to_memory() {
    let config = indoc! {r#"
        [rate_limit.storage]
        type = "redis"
        url = "redis://127.0.0.1:1"
        response_timeout = "50ms"

        [rate_limit.storage.retry]
        attempts = 1

        [rate_limit.storage.pool]
        timeout_create = "50ms"
        timeout_wait = "50ms"
    "#};

    let server = TestServer::start(config).await;

    let mut statuses = Vec::new();

    for _ in 0..4 {
        let response = call(&server, Method::POST, "/api/thoughts", Some("abc"), "203.0.113.5").await;
        statuses.push((response["status"].as_u64().unwrap(), response["remaining"].clone()));
    }

    insta::assert_debug_snapshot!(statuses, @r#"
    [
        (
            201,
            String("2"),
        ),
        (
            201,
            String("1"),
        ),
        (
            201,
            String("0"),
        ),
        (
            429,
            String("0"),
        ),
    ]
    "#);
}

fn redis_config(prefix: &str) -> String {
    formatdoc! {r#"
        [rate_limit.storage]
        type = "redis"
        url = "redis://127.0.0.1:6379"
        key_prefix = "{prefix}"
    "#}
}

#[tokio::test]
async fn instances_share_redis_counters() {
    if !redis_available().await {
        eprintln!("Redis is not running on 127.0.0.1:6379, skipping");
        return;
    }

    let config = redis_config(&unique_prefix("shared"));

    let first = TestServer::start(&config).await;
    let second = TestServer::start(&config).await;

    let a = call(&first, Method::POST, "/api/thoughts", Some("abc"), "203.0.113.5").await;
    let b = call(&second, Method::POST, "/api/thoughts", Some("abc"), "203.0.113.5").await;
    let c = call(&first, Method::POST, "/api/thoughts", Some("abc"), "203.0.113.5").await;
    let d = call(&second, Method::POST, "/api/thoughts", Some("abc"), "203.0.113.5").await;

    assert_eq!(a["remaining"], "2");
    assert_eq!(b["remaining"], "1");
    assert_eq!(c["remaining"], "0");
    assert_eq!(d["status"], 429);
    assert_eq!(d["retry_after"], "300");
}

#[tokio::test]
async fn redis_block_is_not_extended_by_denied_attempts() {
    if !redis_available().await {
        eprintln!("Redis is not running on 127.0.0.1:6379, skipping");
        return;
    }

    let server = TestServer::start(&redis_config(&unique_prefix("block"))).await;

    for _ in 0..3 {
        let response = call(&server, Method::POST, "/api/thoughts", None, "198.51.100.20").await;
        assert_eq!(response["status"], 201);
    }

    let blocked = call(&server, Method::POST, "/api/thoughts", None, "198.51.100.20").await;
    assert_eq!(blocked["retry_after"], "300");

    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

    let still_blocked = call(&server, Method::POST, "/api/thoughts", None, "198.51.100.20").await;
    assert_eq!(still_blocked["status"], 429);
    assert_eq!(still_blocked["retry_after"], "299");
}
