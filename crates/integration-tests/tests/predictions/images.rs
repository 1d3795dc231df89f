use integration_tests::{PNG_BYTES, TestServer, detector::ANNOTATED_IMAGE};
use reqwest::Method;
use serde_json::Value;

use super::predict_as;

async fn image_request(server: &TestServer, path: &str, accept: &str) -> reqwest::Response {
    server
        .client
        .request(Method::GET, path)
        .basic_auth("alice", Some("secret"))
        .header("accept", accept)
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn predicted_image_follows_accept_header() {
    let server = TestServer::builder().build("").await;

    let uid = predict_as(&server, "alice", "secret").await;
    let path = format!("/prediction/{uid}/image");

    let response = image_request(&server, &path, "image/png").await;
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "image/png");
    assert_eq!(response.bytes().await.unwrap().as_ref(), ANNOTATED_IMAGE);

    let response = image_request(&server, &path, "image/jpeg").await;
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "image/jpeg");

    let response = image_request(&server, &path, "text/html").await;
    assert_eq!(response.status(), 406);
    insta::assert_snapshot!(response.text().await.unwrap(), @r#"{"detail":"Client does not accept an image format"}"#);
}

#[tokio::test]
async fn predicted_image_of_unknown_prediction() {
    let server = TestServer::builder().build("").await;

    predict_as(&server, "alice", "secret").await;

    let response = image_request(&server, "/prediction/unknown/image", "image/png").await;
    assert_eq!(response.status(), 404);
    insta::assert_snapshot!(response.text().await.unwrap(), @r#"{"detail":"Prediction not found"}"#);
}

#[tokio::test]
async fn predicted_image_file_gone() {
    let server = TestServer::builder().build("").await;

    let uid = predict_as(&server, "alice", "secret").await;
    std::fs::remove_file(server.upload_root.join("predicted").join(format!("{uid}.png"))).unwrap();

    let response = image_request(&server, &format!("/prediction/{uid}/image"), "image/png").await;
    assert_eq!(response.status(), 404);
    insta::assert_snapshot!(response.text().await.unwrap(), @r#"{"detail":"Predicted image file not found"}"#);
}

#[tokio::test]
async fn stored_images_are_served_to_their_owner() {
    let server = TestServer::builder().build("").await;

    let uid = predict_as(&server, "alice", "secret").await;
    predict_as(&server, "bob", "hunter2").await;

    let response = server.client.get_as(&format!("/prediction/{uid}"), "alice", "secret").await;
    let body: Value = response.json().await.unwrap();
    let original = body["original_image"].as_str().unwrap();
    let file_name = original.rsplit(['/', '\\']).next().unwrap();

    let path = format!("/image/original/{file_name}");

    let response = server.client.get_as(&path, "alice", "secret").await;
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "image/png");
    assert_eq!(response.bytes().await.unwrap().as_ref(), PNG_BYTES.as_slice());

    let response = server.client.get_as(&format!("/image/predicted/{file_name}"), "alice", "secret").await;
    assert_eq!(response.bytes().await.unwrap().as_ref(), ANNOTATED_IMAGE);

    let response = server.client.get_as(&path, "bob", "hunter2").await;
    assert_eq!(response.status(), 404);
    insta::assert_snapshot!(response.text().await.unwrap(), @r#"{"detail":"Access denied"}"#);
}

#[tokio::test]
async fn image_lookup_errors() {
    let server = TestServer::builder().build("").await;

    predict_as(&server, "alice", "secret").await;

    let response = server.client.get_as("/image/thumbnail/x.png", "alice", "secret").await;
    assert_eq!(response.status(), 400);
    insta::assert_snapshot!(response.text().await.unwrap(), @r#"{"detail":"Invalid image type"}"#);

    let response = server.client.get_as("/image/original/missing.png", "alice", "secret").await;
    assert_eq!(response.status(), 404);
    insta::assert_snapshot!(response.text().await.unwrap(), @r#"{"detail":"Image not found"}"#);
}
