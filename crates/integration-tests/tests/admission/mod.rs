use indoc::indoc;
use integration_tests::{TestServer, Upload};
use reqwest::Response;

fn header<'a>(response: &'a Response, name: &str) -> &'a str {
    response
        .headers()
        .get(name)
        .map(|v| v.to_str().unwrap())
        .unwrap_or_else(|| panic!("missing {name} header"))
}

#[tokio::test]
async fn admitted_requests_report_remaining_capacity() {
    let config = indoc! {r#"
        [server.rate_limits]
        requests_per_second = 3
    "#};

    let server = TestServer::builder().build(config).await;

    let first = server.client.get_as("/predictions/count", "alice", "secret").await;

    // Unknown users are rejected by the handler, after admission.
    assert_eq!(first.status(), 401);
    assert_eq!(header(&first, "x-ratelimit-limit"), "3");
    assert_eq!(header(&first, "x-ratelimit-remaining"), "2");
    assert_eq!(header(&first, "x-ratelimit-reset"), "60");

    let second = server.client.get_as("/predictions/count", "alice", "secret").await;
    assert_eq!(header(&second, "x-ratelimit-remaining"), "1");
}

#[tokio::test]
async fn burst_over_limit_is_rejected() {
    let config = indoc! {r#"
        [server.rate_limits]
        requests_per_second = 2
    "#};

    let server = TestServer::builder().build(config).await;

    let mut statuses = Vec::new();
    let mut rejected = None;

    for _ in 0..4 {
        let response = server.client.get("/labels").await;
        statuses.push(response.status().as_u16());

        if response.status() == 429 && rejected.is_none() {
            rejected = Some(response);
        }
    }

    let admitted = statuses.iter().filter(|&&s| s == 401).count();
    let limited = statuses.iter().filter(|&&s| s == 429).count();

    assert!(admitted <= 2, "admitted more than the limit: {statuses:?}");
    assert!(limited >= 2, "expected rejections: {statuses:?}");

    let rejected = rejected.unwrap();

    assert_eq!(header(&rejected, "x-ratelimit-limit"), "2");
    assert_eq!(header(&rejected, "x-ratelimit-remaining"), "0");
    assert_eq!(header(&rejected, "x-ratelimit-reset"), "1");
    assert!(header(&rejected, "content-type").starts_with("text/plain"));

    insta::assert_snapshot!(rejected.text().await.unwrap(), @"Rate limit exceeded");
}

#[tokio::test]
async fn credentials_are_limited_separately() {
    let config = indoc! {r#"
        [server.rate_limits]
        requests_per_second = 1
    "#};

    let server = TestServer::builder().build(config).await;

    let alice = server.client.get_as("/labels", "alice", "secret").await;
    let bob = server.client.get_as("/labels", "bob", "secret").await;

    assert_eq!(alice.status(), 401);
    assert_eq!(bob.status(), 401);
}

#[tokio::test]
async fn uploads_have_their_own_window() {
    let config = indoc! {r#"
        [server.rate_limits]
        requests_per_second = 30
        uploads_per_minute = 2
    "#};

    let server = TestServer::builder().build(config).await;

    for _ in 0..2 {
        let response = server.client.upload(Upload::png(), None).await;
        assert_eq!(response.status(), 200);
    }

    let response = server.client.upload(Upload::png(), None).await;

    assert_eq!(response.status(), 429);
    assert_eq!(header(&response, "x-ratelimit-limit"), "2");
    assert_eq!(header(&response, "x-ratelimit-remaining"), "0");

    let reset: u64 = header(&response, "x-ratelimit-reset").parse().unwrap();
    assert!((1..=60).contains(&reset), "reset was {reset}");

    insta::assert_snapshot!(response.text().await.unwrap(), @"Upload quota exceeded (2/min)");

    // Standard routes are still admitted.
    assert_eq!(server.client.get("/labels").await.status(), 401);
    assert_eq!(server.detector.calls(), 2);
}

#[tokio::test]
async fn health_is_not_rate_limited() {
    let config = indoc! {r#"
        [server.rate_limits]
        requests_per_second = 1
    "#};

    let server = TestServer::builder().build(config).await;

    for _ in 0..3 {
        let response = server.client.get("/health").await;

        assert_eq!(response.status(), 200);
        assert!(response.headers().get("x-ratelimit-limit").is_none());
    }
}

#[tokio::test]
async fn disabled_gate_admits_everything() {
    let config = indoc! {r#"
        [server.rate_limits]
        enabled = false
        requests_per_second = 1
    "#};

    let server = TestServer::builder().build(config).await;

    for _ in 0..3 {
        let response = server.client.get("/labels").await;

        assert_eq!(response.status(), 401);
        assert!(response.headers().get("x-ratelimit-limit").is_none());
    }
}

#[tokio::test]
async fn only_posted_uploads_use_the_upload_window() {
    let config = indoc! {r#"
        [server.rate_limits]
        requests_per_second = 30
        uploads_per_minute = 1
    "#};

    let server = TestServer::builder().build(config).await;

    for _ in 0..2 {
        let response = server.client.get("/predict").await;

        assert_eq!(response.status(), 405);
        assert_eq!(header(&response, "x-ratelimit-limit"), "30");
    }

    let response = server.client.upload(Upload::png(), None).await;
    assert_eq!(response.status(), 200);

    let response = server.client.upload(Upload::png(), None).await;
    assert_eq!(response.status(), 429);
    assert_eq!(header(&response, "x-ratelimit-limit"), "1");
}

#[tokio::test]
async fn unknown_paths_pass_the_gate() {
    let config = indoc! {r#"
        [server.rate_limits]
        requests_per_second = 2
    "#};

    let server = TestServer::builder().build(config).await;

    let response = server.client.get("/nowhere").await;

    assert_eq!(response.status(), 404);
    assert_eq!(header(&response, "x-ratelimit-limit"), "2");
    assert_eq!(header(&response, "x-ratelimit-remaining"), "1");

    server.client.get("/nowhere").await;

    let response = server.client.get("/nowhere").await;
    assert_eq!(response.status(), 429);
}
