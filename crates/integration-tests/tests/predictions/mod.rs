mod images;
mod quota;

use indoc::indoc;
use integration_tests::{
    JPEG_BYTES, PNG_BYTES, TestServer, Upload,
    detector::{ANNOTATED_IMAGE, Behavior},
};
use serde_json::Value;

/// Uploads a PNG as `user` and returns the new prediction uid.
pub(crate) async fn predict_as(server: &TestServer, user: &str, password: &str) -> String {
    let response = server.client.upload(Upload::png(), Some((user, password))).await;
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    body["prediction_uid"].as_str().unwrap().to_string()
}

fn uploaded_files(server: &TestServer, kind: &str) -> Vec<String> {
    let dir = server.upload_root.join(kind);

    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();

    names.sort();
    names
}

#[tokio::test]
async fn anonymous_upload_is_detected_and_stored() {
    let server = TestServer::builder().build("").await;

    let response = server.client.upload(Upload::png(), None).await;
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    let uid = body["prediction_uid"].as_str().unwrap();

    assert_eq!(body["detection_count"], 2);
    assert_eq!(body["labels"], serde_json::json!(["dog", "cat"]));
    assert!(body["time_took"].as_f64().unwrap() >= 0.0);

    let file_name = format!("{uid}.png");

    assert_eq!(uploaded_files(&server, "original"), vec![file_name.clone()]);
    assert_eq!(uploaded_files(&server, "predicted"), vec![file_name.clone()]);

    let original = std::fs::read(server.upload_root.join("original").join(&file_name)).unwrap();
    let predicted = std::fs::read(server.upload_root.join("predicted").join(&file_name)).unwrap();

    assert_eq!(original, *PNG_BYTES);
    assert_eq!(predicted, ANNOTATED_IMAGE);
}

#[tokio::test]
async fn jpeg_alias_media_type_is_accepted() {
    let server = TestServer::builder().build("").await;

    let upload = Upload {
        bytes: JPEG_BYTES.as_slice(),
        file_name: "holiday.JPEG",
        content_type: "image/jpg",
    };

    let response = server.client.upload(upload, None).await;
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    let uid = body["prediction_uid"].as_str().unwrap();

    assert_eq!(uploaded_files(&server, "original"), vec![format!("{uid}.jpeg")]);
}

#[tokio::test]
async fn unsupported_media_type_is_rejected() {
    let server = TestServer::builder().build("").await;

    let upload = Upload {
        bytes: b"GIF89a",
        file_name: "anim.gif",
        content_type: "image/gif",
    };

    let response = server.client.upload(upload, None).await;
    assert_eq!(response.status(), 415);
    insta::assert_snapshot!(response.text().await.unwrap(), @r#"{"detail":"Only JPEG/PNG supported"}"#);

    let upload = Upload {
        bytes: PNG_BYTES.as_slice(),
        file_name: "photo.txt",
        content_type: "image/png",
    };

    let response = server.client.upload(upload, None).await;
    assert_eq!(response.status(), 415);
    insta::assert_snapshot!(response.text().await.unwrap(), @r#"{"detail":"Only .jpg/.jpeg/.png files allowed"}"#);

    assert_eq!(server.detector.calls(), 0);
}

#[tokio::test]
async fn content_must_match_declared_format() {
    let server = TestServer::builder().build("").await;

    let upload = Upload {
        bytes: JPEG_BYTES.as_slice(),
        file_name: "photo.png",
        content_type: "image/png",
    };

    let response = server.client.upload(upload, None).await;
    assert_eq!(response.status(), 415);
    insta::assert_snapshot!(response.text().await.unwrap(), @r#"{"detail":"Invalid or corrupted image"}"#);

    let upload = Upload {
        bytes: b"definitely not an image",
        file_name: "photo.png",
        content_type: "image/png",
    };

    let response = server.client.upload(upload, None).await;
    assert_eq!(response.status(), 415);

    assert!(uploaded_files(&server, "original").is_empty());
    assert_eq!(server.detector.calls(), 0);
}

#[tokio::test]
async fn corrupted_image_behind_a_valid_signature_is_rejected() {
    let server = TestServer::builder().build("").await;

    let mut bytes = PNG_BYTES[..16].to_vec();
    bytes.extend_from_slice(b"this is not image data at all");

    let upload = Upload {
        bytes: &bytes,
        file_name: "photo.png",
        content_type: "image/png",
    };

    let response = server.client.upload(upload, None).await;
    assert_eq!(response.status(), 415);
    insta::assert_snapshot!(response.text().await.unwrap(), @r#"{"detail":"Invalid or corrupted image"}"#);

    let truncated = &PNG_BYTES[..PNG_BYTES.len() / 2];

    let upload = Upload {
        bytes: truncated,
        ..Upload::png()
    };

    let response = server.client.upload(upload, None).await;
    assert_eq!(response.status(), 415);

    assert!(uploaded_files(&server, "original").is_empty());
    assert_eq!(server.detector.calls(), 0);
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let config = indoc! {r#"
        [uploads]
        max_bytes = 1048576
    "#};

    let server = TestServer::builder().build(config).await;

    let mut bytes = PNG_BYTES.to_vec();
    bytes.resize(1024 * 1024 + 1024, 0);

    let upload = Upload {
        bytes: &bytes,
        file_name: "huge.png",
        content_type: "image/png",
    };

    let response = server.client.upload(upload, None).await;
    assert_eq!(response.status(), 413);
    insta::assert_snapshot!(response.text().await.unwrap(), @r#"{"detail":"File too large (max 1MB)"}"#);

    assert!(uploaded_files(&server, "original").is_empty());
}

#[tokio::test]
async fn missing_file_field_is_a_bad_request() {
    let server = TestServer::builder().build("").await;

    let form = reqwest::multipart::Form::new().text("note", "no image here");

    let response = server
        .client
        .request(reqwest::Method::POST, "/predict")
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn detector_failure_discards_the_upload() {
    let server = TestServer::builder().detector(Behavior::Fail).build("").await;

    let response = server.client.upload(Upload::png(), None).await;

    assert_eq!(response.status(), 502);
    insta::assert_snapshot!(response.text().await.unwrap(), @r#"{"detail":"Detection failed"}"#);

    assert!(uploaded_files(&server, "original").is_empty());
    assert!(uploaded_files(&server, "predicted").is_empty());
}

#[tokio::test]
async fn first_upload_registers_the_user() {
    let server = TestServer::builder().build("").await;

    let uid = predict_as(&server, "alice", "secret").await;

    let response = server.client.get_as(&format!("/prediction/{uid}"), "alice", "secret").await;
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();

    assert_eq!(body["uid"], uid.as_str());
    assert!(body["original_image"].as_str().unwrap().ends_with(&format!("{uid}.png")));
    assert!(body["predicted_image"].as_str().unwrap().ends_with(&format!("{uid}.png")));

    // A second upload with another password is refused.
    let response = server.client.upload(Upload::png(), Some(("alice", "guess"))).await;
    assert_eq!(response.status(), 401);
    assert_eq!(response.headers()["www-authenticate"], "Basic");
    insta::assert_snapshot!(response.text().await.unwrap(), @r#"{"detail":"Invalid credentials"}"#);
}

#[tokio::test]
async fn predictions_are_private_to_their_owner() {
    let server = TestServer::builder().build("").await;

    let uid = predict_as(&server, "alice", "secret").await;
    predict_as(&server, "bob", "hunter2").await;

    let path = format!("/prediction/{uid}");

    let response = server.client.get_as(&path, "bob", "hunter2").await;
    assert_eq!(response.status(), 403);
    insta::assert_snapshot!(response.text().await.unwrap(), @r#"{"detail":"Access denied"}"#);

    let response = server.client.get_as(&path, "alice", "wrong").await;
    assert_eq!(response.status(), 401);

    let response = server.client.get(&path).await;
    assert_eq!(response.status(), 401);

    let response = server.client.get_as("/prediction/missing", "alice", "secret").await;
    assert_eq!(response.status(), 404);
    insta::assert_snapshot!(response.text().await.unwrap(), @r#"{"detail":"Prediction not found"}"#);
}

#[tokio::test]
async fn delete_removes_rows_and_files() {
    let server = TestServer::builder().build("").await;

    let uid = predict_as(&server, "alice", "secret").await;
    let path = format!("/prediction/{uid}");

    // Warm the cache so the delete has to invalidate it.
    assert_eq!(server.client.get_as(&path, "alice", "secret").await.status(), 200);

    let response = server.client.delete_as(&path, "bob", "hunter2").await;
    assert_eq!(response.status(), 401);

    let response = server.client.delete_as(&path, "alice", "secret").await;
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["detail"], format!("Prediction {uid} deleted successfully."));

    assert!(uploaded_files(&server, "original").is_empty());
    assert!(uploaded_files(&server, "predicted").is_empty());

    assert_eq!(server.client.get_as(&path, "alice", "secret").await.status(), 404);
    assert_eq!(server.client.delete_as(&path, "alice", "secret").await.status(), 404);
}

#[tokio::test]
async fn other_users_cannot_delete() {
    let server = TestServer::builder().build("").await;

    let uid = predict_as(&server, "alice", "secret").await;
    predict_as(&server, "bob", "hunter2").await;

    let path = format!("/prediction/{uid}");

    let response = server.client.delete_as(&path, "bob", "hunter2").await;
    assert_eq!(response.status(), 404);

    assert_eq!(server.client.get_as(&path, "alice", "secret").await.status(), 200);
}
