use integration_tests::{TestServer, Upload, detector::Behavior};
use serde_json::Value;

async fn server_with_history() -> (TestServer, Vec<String>) {
    let server = TestServer::builder().build("").await;

    let mut uids = Vec::new();

    for _ in 0..2 {
        let response = server.client.upload(Upload::png(), Some(("alice", "secret"))).await;
        assert_eq!(response.status(), 200);

        let body: Value = response.json().await.unwrap();
        uids.push(body["prediction_uid"].as_str().unwrap().to_string());
    }

    // Someone else's history must never show up.
    let response = server.client.upload(Upload::png(), Some(("bob", "hunter2"))).await;
    assert_eq!(response.status(), 200);

    (server, uids)
}

async fn get_json(server: &TestServer, path: &str) -> Value {
    let response = server.client.get_as(path, "alice", "secret").await;
    assert_eq!(response.status(), 200, "GET {path}");

    response.json().await.unwrap()
}

#[tokio::test]
async fn predictions_by_label() {
    let (server, uids) = server_with_history().await;

    let body = get_json(&server, "/predictions/label/dog").await;
    let found: Vec<&str> = body.as_array().unwrap().iter().map(|p| p["uid"].as_str().unwrap()).collect();

    assert_eq!(found, uids.iter().map(String::as_str).collect::<Vec<_>>());
    assert!(body[0]["timestamp"].is_string());

    let body = get_json(&server, "/predictions/label/person").await;
    insta::assert_snapshot!(body.to_string(), @"[]");

    let response = server.client.get_as("/predictions/label/unicorn", "alice", "secret").await;
    assert_eq!(response.status(), 404);
    insta::assert_snapshot!(response.text().await.unwrap(), @r#"{"detail":"Label not supported"}"#);
}

#[tokio::test]
async fn predictions_by_score() {
    let (server, uids) = server_with_history().await;

    let body = get_json(&server, "/predictions/score/0.8").await;
    let rows = body.as_array().unwrap();

    assert_eq!(rows.len(), 2);

    for (row, uid) in rows.iter().zip(&uids) {
        assert_eq!(row["uid"], uid.as_str());
        assert_eq!(row["score"], 0.9);
    }

    let body = get_json(&server, "/predictions/score/0").await;
    assert_eq!(body.as_array().unwrap().len(), 4);

    let response = server.client.get_as("/predictions/score/1.5", "alice", "secret").await;
    assert_eq!(response.status(), 400);
    insta::assert_snapshot!(response.text().await.unwrap(), @r#"{"detail":"Score must be between 0 and 1"}"#);
}

#[tokio::test]
async fn recent_count_and_labels() {
    let (server, _) = server_with_history().await;

    let body = get_json(&server, "/predictions/count").await;
    insta::assert_snapshot!(body.to_string(), @r#"{"count":2}"#);

    let body = get_json(&server, "/labels").await;
    insta::assert_snapshot!(body.to_string(), @r#"{"labels":["cat","dog"]}"#);
}

#[tokio::test]
async fn stats_over_recent_history() {
    let (server, _) = server_with_history().await;

    let body = get_json(&server, "/stats").await;

    insta::assert_snapshot!(serde_json::to_string_pretty(&body).unwrap(), @r#"
    {
      "average_confidence_score": 0.75,
      "most_common_labels": {
        "cat": 2,
        "dog": 2
      },
      "total_predictions": 2
    }
    "#);
}

#[tokio::test]
async fn stats_without_detections() {
    let server = TestServer::builder().detector(Behavior::Detect(Vec::new())).build("").await;

    let response = server.client.upload(Upload::png(), Some(("alice", "secret"))).await;
    assert_eq!(response.status(), 200);

    let body = get_json(&server, "/stats").await;

    insta::assert_snapshot!(body.to_string(), @r#"{"average_confidence_score":0.0,"most_common_labels":{},"total_predictions":1}"#);
}

#[tokio::test]
async fn history_requires_credentials() {
    let (server, _) = server_with_history().await;

    for path in ["/predictions/count", "/labels", "/stats", "/predictions/label/dog"] {
        let response = server.client.get(path).await;
        assert_eq!(response.status(), 401, "GET {path}");
    }
}
