use indoc::indoc;
use integration_tests::TestServer;
use reqwest::Method;
use serde_json::json;

use crate::header;

async fn forward(server: &TestServer, method: &str, uri: &str, ip: &str) -> reqwest::Response {
    server
        .client
        .request(Method::GET, "/admission")
        .header("x-forwarded-method", method)
        .header("x-forwarded-uri", uri)
        .header("x-forwarded-for", ip)
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn forward_auth_admits_then_rejects() {
    let server = TestServer::builder().application(axum::Router::new()).build("").await;

    let mut responses = Vec::new();

    for _ in 0..4 {
        let response = forward(&server, "POST", "/api/thoughts", "203.0.113.5").await;

        responses.push(json!({
            "status": response.status().as_u16(),
            "remaining": header(&response, "x-ratelimit-remaining"),
            "retry_after": header(&response, "retry-after"),
        }));
    }

    insta::assert_json_snapshot!(responses, @r#"
    [
      {
        "remaining": "2",
        "retry_after": null,
        "status": 204
      },
      {
        "remaining": "1",
        "retry_after": null,
        "status": 204
      },
      {
        "remaining": "0",
        "retry_after": null,
        "status": 204
      },
      {
        "remaining": "0",
        "retry_after": "300",
        "status": 429
      }
    ]
    "#);
}

#[tokio::test]
async fn forwarded_requests_are_classified() {
    let server = TestServer::start("").await;

    let search = forward(&server, "GET", "/api/thoughts?searchTerm=rust", "203.0.113.5").await;
    assert_eq!(header(&search, "x-ratelimit-limit").as_deref(), Some("30"));

    let like = forward(&server, "POST", "/api/posts/1/like", "203.0.113.5").await;
    assert_eq!(header(&like, "x-ratelimit-limit").as_deref(), Some("120"));
    assert_eq!(header(&like, "x-ratelimit-remaining").as_deref(), Some("119"));
}

#[tokio::test]
async fn forward_auth_shares_counters_with_the_layer() {
    let server = TestServer::start("").await;

    let response = forward(&server, "POST", "/api/thoughts", "203.0.113.5").await;
    assert_eq!(response.status(), 204);

    let response = server
        .client
        .request(Method::POST, "/api/thoughts")
        .header("x-forwarded-for", "203.0.113.5")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 201);
    assert_eq!(header(&response, "x-ratelimit-remaining").as_deref(), Some("1"));
}

#[tokio::test]
async fn missing_forwarded_headers() {
    let server = TestServer::start("").await;

    let response = server
        .client
        .request(Method::GET, "/admission")
        .header("x-forwarded-uri", "/api/thoughts")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);

    let body: serde_json::Value = response.json().await.unwrap();

    insta::assert_json_snapshot!(body, @r#"
    {
      "issues": [
        {
          "code": "admission/invalid-request",
          "message": "Missing x-forwarded-method header"
        }
      ]
    }
    "#);
}

#[tokio::test]
async fn disabled_rate_limiting_always_admits() {
    let config = indoc! {r#"
        [rate_limit]
        enabled = false
    "#};

    let server = TestServer::start(config).await;

    for _ in 0..5 {
        let response = forward(&server, "POST", "/api/thoughts", "203.0.113.5").await;

        assert_eq!(response.status(), 204);
        assert_eq!(header(&response, "x-ratelimit-limit"), None);
    }
}

#[tokio::test]
async fn admission_endpoint_can_be_disabled() {
    let config = indoc! {r#"
        [server.admission]
        enabled = false
    "#};

    let server = TestServer::start(config).await;

    let response = forward(&server, "POST", "/api/thoughts", "203.0.113.5").await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn path_spellings_share_the_thought_quota() {
    let server = TestServer::builder().application(axum::Router::new()).build("").await;

    let mut statuses = Vec::new();

    for uri in ["/api/thoughts", "/api/./thoughts", "//api/thoughts", "/api/x/../thoughts"] {
        let response = forward(&server, "POST", uri, "203.0.113.44").await;

        statuses.push((
            response.status().as_u16(),
            header(&response, "x-ratelimit-limit"),
        ));
    }

    insta::assert_debug_snapshot!(statuses, @r#"
    [
        (
            204,
            Some(
                "3",
            ),
        ),
        (
            204,
            Some(
                "3",
            ),
        ),
        (
            204,
            Some(
                "3",
            ),
        ),
        (
            429,
            Some(
                "3",
            ),
        ),
    ]
    "#);
}
