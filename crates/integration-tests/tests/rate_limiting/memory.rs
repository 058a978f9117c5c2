use indoc::indoc;
use integration_tests::TestServer;
use reqwest::Method;
use serde_json::json;

use super::call;

#[tokio::test]
async fn thought_submissions_are_blocked_after_three() {
    let server = TestServer::start("").await;

    let mut responses = Vec::new();

    for _ in 0..4 {
        responses.push(call(&server, Method::POST, "/api/thoughts", Some("abc"), "203.0.113.5").await);
    }

    insta::assert_json_snapshot!(responses, @r#"
    [
      {
        "limit": "3",
        "remaining": "2",
        "retry_after": null,
        "status": 201
      },
      {
        "limit": "3",
        "remaining": "1",
        "retry_after": null,
        "status": 201
      },
      {
        "limit": "3",
        "remaining": "0",
        "retry_after": null,
        "status": 201
      },
      {
        "limit": "3",
        "remaining": "0",
        "retry_after": "300",
        "status": 429
      }
    ]
    "#);
}

#[tokio::test]
async fn rejection_body() {
    let config = indoc! {r#"
        [rate_limit.tiers."mutate:content"]
        points = 1
        duration = "60s"
    "#};

    let server = TestServer::start(config).await;

    let request = || {
        server
            .client
            .request(Method::DELETE, "/api/posts/42")
            .header("x-forwarded-for", "198.51.100.7")
    };

    let response = request().send().await.unwrap();
    assert_eq!(response.status(), 200);

    let response = request().send().await.unwrap();
    assert_eq!(response.status(), 429);

    let body: serde_json::Value = response.json().await.unwrap();

    insta::assert_json_snapshot!(body, @r#"
    {
      "issues": [
        {
          "code": "ratelimit/exceeded",
          "message": "Rate limit exceeded. Please try again later."
        }
      ]
    }
    "#);
}

#[tokio::test]
async fn callers_are_isolated() {
    let config = indoc! {r#"
        [rate_limit.tiers."mutate:thought"]
        points = 1
        duration = "60s"
    "#};

    let server = TestServer::start(config).await;

    let first = call(&server, Method::POST, "/api/thoughts", Some("abc"), "203.0.113.5").await;
    assert_eq!(first["status"], 201);

    let again = call(&server, Method::POST, "/api/thoughts", Some("abc"), "203.0.113.5").await;
    assert_eq!(again["status"], 429);

    // same address, different identity
    let other_user = call(&server, Method::POST, "/api/thoughts", Some("xyz"), "203.0.113.5").await;
    assert_eq!(other_user["status"], 201);

    // same address, anonymous
    let anonymous = call(&server, Method::POST, "/api/thoughts", None, "203.0.113.5").await;
    assert_eq!(anonymous["status"], 201);

    // same identity, different address
    let other_address = call(&server, Method::POST, "/api/thoughts", Some("abc"), "203.0.113.6").await;
    assert_eq!(other_address["status"], 201);
}

#[tokio::test]
async fn search_uses_its_own_tier() {
    let server = TestServer::start("").await;

    let search = call(&server, Method::GET, "/api/thoughts?searchTerm=rust", None, "203.0.113.9").await;
    let listing = call(&server, Method::GET, "/api/thoughts", None, "203.0.113.9").await;
    let dedicated = call(&server, Method::GET, "/api/search?q=rust", None, "203.0.113.9").await;

    insta::assert_json_snapshot!(json!([search, listing, dedicated]), @r#"
    [
      {
        "limit": "30",
        "remaining": "29",
        "retry_after": null,
        "status": 200
      },
      {
        "limit": "120",
        "remaining": "119",
        "retry_after": null,
        "status": 200
      },
      {
        "limit": "30",
        "remaining": "28",
        "retry_after": null,
        "status": 200
      }
    ]
    "#);
}

#[tokio::test]
async fn likes_share_one_quota() {
    let server = TestServer::start("").await;

    let post = call(&server, Method::POST, "/api/posts/123/like", Some("abc"), "203.0.113.5").await;
    let reply = call(&server, Method::POST, "/api/threads/1/replies/2/like", Some("abc"), "203.0.113.5").await;

    assert_eq!(post["limit"], "120");
    assert_eq!(post["remaining"], "119");
    assert_eq!(reply["limit"], "120");
    assert_eq!(reply["remaining"], "118");
}

#[tokio::test]
async fn notification_updates() {
    let server = TestServer::start("").await;

    let update = call(&server, Method::PATCH, "/api/notifications/9", Some("abc"), "203.0.113.5").await;

    assert_eq!(update["status"], 200);
    assert_eq!(update["limit"], "60");
    assert_eq!(update["remaining"], "59");
}

#[tokio::test]
async fn handlers_charge_additional_tiers() {
    let server = TestServer::start("").await;

    let letter = || {
        server
            .client
            .request(Method::POST, "/api/letters")
            .header("x-user-id", "abc")
            .header("x-forwarded-for", "203.0.113.5")
    };

    let response = letter().send().await.unwrap();

    assert_eq!(response.status(), 201);
    assert_eq!(crate::header(&response, "x-ratelimit-limit").as_deref(), Some("20"));

    let body: serde_json::Value = response.json().await.unwrap();
    insta::assert_json_snapshot!(body, @r#"
    {
      "notifications_remaining": 59
    }
    "#);

    // the in-process admission charged the same caller as the layer did
    let update = call(&server, Method::PATCH, "/api/notifications/9", Some("abc"), "203.0.113.5").await;
    assert_eq!(update["remaining"], "58");
}

#[tokio::test]
async fn configured_quota_overrides_builtin() {
    let config = indoc! {r#"
        [rate_limit.tiers."get:standard"]
        points = 2
        duration = "60s"
    "#};

    let server = TestServer::start(config).await;

    let first = call(&server, Method::GET, "/api/posts/1", None, "192.0.2.10").await;
    let second = call(&server, Method::GET, "/api/posts/1", None, "192.0.2.10").await;
    let third = call(&server, Method::GET, "/api/posts/1", None, "192.0.2.10").await;

    assert_eq!(first["limit"], "2");
    assert_eq!(second["remaining"], "0");
    assert_eq!(third["status"], 429);
    assert_eq!(third["retry_after"], "60");
}

#[tokio::test]
async fn disabled_rate_limiting_admits_everything() {
    let config = indoc! {r#"
        [rate_limit]
        enabled = false
    "#};

    let server = TestServer::start(config).await;

    for _ in 0..5 {
        let response = call(&server, Method::POST, "/api/thoughts", Some("abc"), "203.0.113.5").await;

        assert_eq!(response["status"], 201);
        assert_eq!(response["limit"], serde_json::Value::Null);
    }

    let letter = server
        .client
        .request(Method::POST, "/api/letters")
        .send()
        .await
        .unwrap();

    assert_eq!(letter.status(), 201);
}
