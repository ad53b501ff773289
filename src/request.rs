use reqwest::Client;
use tokio::time::Instant;

use crate::{
    check,
    metric::RequestOutcome,
    scenario::{IterationContext, Step},
};

/// Perform one request/response cycle for a step and record its outcome.
///
/// The step's URL and body templates are rendered against the iteration
/// context, the request is sent with the client's configured timeout, and the
/// latency clock runs until the full body is read. Exactly one network call
/// happens per invocation.
///
/// This function never fails: transport errors (connection refused, timeout,
/// DNS) come back as an outcome with `error` set, no status, and every check
/// failed.
pub async fn execute(client: &Client, step: &Step, ctx: IterationContext) -> RequestOutcome {
    let url = step.url.render(ctx);
    let mut request = client.request(step.method.clone(), url);
    for (name, value) in &step.headers {
        request = request.header(name, value);
    }
    if let Some(body) = &step.body {
        request = request.body(body.render(ctx));
    }

    let start = Instant::now();
    let response = match request.send().await {
        Ok(response) => response,
        Err(error) => {
            return RequestOutcome {
                step: step.name.clone(),
                vu: ctx.vu,
                iteration: ctx.iteration,
                status: None,
                latency: start.elapsed(),
                error: Some(error.to_string()),
                checks: check::all_failed(&step.checks),
            };
        }
    };

    let status = response.status().as_u16();
    match response.bytes().await {
        Ok(body) => RequestOutcome {
            step: step.name.clone(),
            vu: ctx.vu,
            iteration: ctx.iteration,
            status: Some(status),
            latency: start.elapsed(),
            error: None,
            checks: check::evaluate(&step.checks, status, &body),
        },
        // The status arrived but the body didn't; keep the status, fail the checks.
        Err(error) => RequestOutcome {
            step: step.name.clone(),
            vu: ctx.vu,
            iteration: ctx.iteration,
            status: Some(status),
            latency: start.elapsed(),
            error: Some(error.to_string()),
            checks: check::all_failed(&step.checks),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::{Check, Predicate};
    use axum::{Json, Router, http::StatusCode, routing::post};
    use reqwest::Method;
    use serde_json::json;
    use std::time::Duration;

    async fn serve_create_endpoint() -> std::net::SocketAddr {
        let app = Router::new().route(
            "/api/post",
            post(|| async { (StatusCode::CREATED, Json(json!({"data": {"id": "x"}}))) }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn created_response_passes_its_checks() {
        let addr = serve_create_endpoint().await;
        let step = Step::builder()
            .name("create post")
            .method(Method::POST)
            .url(format!("http://{addr}/api/post"))
            .headers(vec![("content-type".into(), "application/json".into())])
            .body(r#"{"title":"title {{vu}}-{{iter}}"}"#)
            .checks(vec![
                Check::new("status is 201", Predicate::StatusIs(201)),
                Check::new("has id", Predicate::JsonPathExists("data.id".into())),
            ])
            .build();

        let client = Client::new();
        let outcome = execute(&client, &step, IterationContext { vu: 1, iteration: 0 }).await;

        assert_eq!(outcome.status, Some(201));
        assert_eq!(outcome.error, None);
        assert_eq!(outcome.checks["status is 201"], true);
        assert_eq!(outcome.checks["has id"], true);
        assert!(!outcome.is_failure());
    }

    #[tokio::test]
    async fn unreachable_endpoint_becomes_a_failed_outcome() {
        // Bind then drop, so the port is real but nothing listens on it.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap();
        let step = Step::builder()
            .name("probe")
            .url(format!("http://{addr}/"))
            .checks(vec![
                Check::new("status is 200", Predicate::StatusIs(200)),
                Check::new("has data", Predicate::JsonPathExists("data".into())),
            ])
            .build();

        let outcome = execute(&client, &step, IterationContext { vu: 1, iteration: 0 }).await;

        assert!(outcome.error.is_some());
        assert_eq!(outcome.status, None);
        assert_eq!(outcome.checks.len(), 2);
        assert!(outcome.checks.values().all(|pass| !pass));
        assert!(outcome.is_failure());
    }
}
