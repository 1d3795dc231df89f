use indoc::indoc;
use integration_tests::{TestServer, Upload};

use super::predict_as;

#[tokio::test]
async fn monthly_quota_stops_uploads() {
    let config = indoc! {r#"
        [quota]
        monthly_limit = 2
    "#};

    let server = TestServer::builder().build(config).await;

    predict_as(&server, "alice", "secret").await;
    predict_as(&server, "alice", "secret").await;

    let response = server.client.upload(Upload::png(), Some(("alice", "secret"))).await;

    assert_eq!(response.status(), 429);
    insta::assert_snapshot!(response.text().await.unwrap(), @r#"{"detail":"Monthly prediction quota exceeded"}"#);
    assert_eq!(server.detector.calls(), 2);

    // Other users and anonymous uploads are not affected.
    predict_as(&server, "bob", "hunter2").await;

    let response = server.client.upload(Upload::png(), None).await;
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn daily_quota_stops_uploads() {
    let config = indoc! {r#"
        [quota]
        daily_limit = 1
    "#};

    let server = TestServer::builder().build(config).await;

    predict_as(&server, "alice", "secret").await;

    let response = server.client.upload(Upload::png(), Some(("alice", "secret"))).await;

    assert_eq!(response.status(), 429);
    insta::assert_snapshot!(response.text().await.unwrap(), @r#"{"detail":"24h prediction quota exceeded"}"#);
}

#[tokio::test]
async fn quota_is_checked_before_credentials() {
    let config = indoc! {r#"
        [quota]
        monthly_limit = 1
    "#};

    let server = TestServer::builder().build(config).await;

    predict_as(&server, "alice", "secret").await;

    let response = server.client.upload(Upload::png(), Some(("alice", "wrong"))).await;

    assert_eq!(response.status(), 429);
}

#[tokio::test]
async fn deleted_predictions_free_quota() {
    let config = indoc! {r#"
        [quota]
        monthly_limit = 1
    "#};

    let server = TestServer::builder().build(config).await;

    let uid = predict_as(&server, "alice", "secret").await;

    let response = server.client.upload(Upload::png(), Some(("alice", "secret"))).await;
    assert_eq!(response.status(), 429);

    let response = server.client.delete_as(&format!("/prediction/{uid}"), "alice", "secret").await;
    assert_eq!(response.status(), 200);

    predict_as(&server, "alice", "secret").await;
}
