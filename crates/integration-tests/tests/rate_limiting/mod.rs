mod memory;
mod redis;

use reqwest::Method;
use serde_json::{Value, json};

use integration_tests::TestServer;

use crate::header;

/// Sends a request as the given caller and summarizes the response.
pub(crate) async fn call(server: &TestServer, method: Method, path: &str, user: Option<&str>, ip: &str) -> Value {
    let mut request = server.client.request(method, path).header("x-forwarded-for", ip);

    if let Some(user) = user {
        request = request.header("x-user-id", user);
    }

    let response = request.send().await.unwrap();

    json!({
        "status": response.status().as_u16(),
        "limit": header(&response, "x-ratelimit-limit"),
        "remaining": header(&response, "x-ratelimit-remaining"),
        "retry_after": header(&response, "retry-after"),
    })
}
