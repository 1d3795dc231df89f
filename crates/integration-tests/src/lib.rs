#![allow(clippy::panic)]

pub mod detector;

use std::{
    io::Cursor,
    net::SocketAddr,
    path::PathBuf,
    sync::{LazyLock, Once},
    time::Duration,
};

use config::Config;
use detector::{Behavior, FakeDetector};
use reqwest::{
    Method, RequestBuilder, Response,
    multipart::{Form, Part},
};
use server::ServeConfig;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// A small, fully decodable PNG.
pub static PNG_BYTES: LazyLock<Vec<u8>> = LazyLock::new(|| encode(image::ImageFormat::Png));

/// A small, fully decodable JPEG.
pub static JPEG_BYTES: LazyLock<Vec<u8>> = LazyLock::new(|| encode(image::ImageFormat::Jpeg));

fn encode(format: image::ImageFormat) -> Vec<u8> {
    let mut bytes = Cursor::new(Vec::new());

    image::RgbImage::from_fn(8, 8, |x, y| image::Rgb([(x * 30) as u8, (y * 30) as u8, 128]))
        .write_to(&mut bytes, format)
        .expect("encoding an in-memory test image");

    bytes.into_inner()
}

static INIT: Once = Once::new();

fn init_crypto_provider() {
    INIT.call_once(|| {
        rustls::crypto::aws_lc_rs::default_provider()
            .install_default()
            .expect("Failed to install default crypto provider");
    });
}

/// Test client for making HTTP requests to the test server
pub struct TestClient {
    base_url: String,
    client: reqwest::Client,
}

impl TestClient {
    /// Create a new test client for the given base URL
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    /// Start building a request to the given path
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, format!("{}{}", self.base_url, path))
    }

    /// Send an anonymous GET request to the given path
    pub async fn get(&self, path: &str) -> Response {
        self.request(Method::GET, path).send().await.unwrap()
    }

    /// Send a GET request with basic credentials
    pub async fn get_as(&self, path: &str, user: &str, password: &str) -> Response {
        self.request(Method::GET, path)
            .basic_auth(user, Some(password))
            .send()
            .await
            .unwrap()
    }

    /// Send a DELETE request with basic credentials
    pub async fn delete_as(&self, path: &str, user: &str, password: &str) -> Response {
        self.request(Method::DELETE, path)
            .basic_auth(user, Some(password))
            .send()
            .await
            .unwrap()
    }

    /// Upload an image to `/predict`, optionally authenticated
    pub async fn upload(&self, upload: Upload<'_>, credentials: Option<(&str, &str)>) -> Response {
        let part = Part::bytes(upload.bytes.to_vec())
            .file_name(upload.file_name.to_string())
            .mime_str(upload.content_type)
            .unwrap();

        let mut request = self
            .request(Method::POST, "/predict")
            .multipart(Form::new().part("file", part));

        if let Some((user, password)) = credentials {
            request = request.basic_auth(user, Some(password));
        }

        request.send().await.unwrap()
    }
}

/// A multipart image upload.
#[derive(Clone, Copy, Debug)]
pub struct Upload<'a> {
    pub bytes: &'a [u8],
    pub file_name: &'a str,
    pub content_type: &'a str,
}

impl Upload<'static> {
    /// A small PNG named `photo.png`.
    pub fn png() -> Self {
        Self {
            bytes: PNG_BYTES.as_slice(),
            file_name: "photo.png",
            content_type: "image/png",
        }
    }

    /// A small JPEG named `photo.jpg`.
    pub fn jpeg() -> Self {
        Self {
            bytes: JPEG_BYTES.as_slice(),
            file_name: "photo.jpg",
            content_type: "image/jpeg",
        }
    }
}

/// Builder for a [`TestServer`].
#[derive(Default)]
pub struct TestServerBuilder {
    behavior: Behavior,
}

impl TestServerBuilder {
    /// Sets how the fake detection backend answers.
    pub fn detector(mut self, behavior: Behavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// Start the server with the given TOML configuration.
    ///
    /// The `[database]`, `[detector]` and `[retention]` tables are owned by
    /// the harness and must not appear in `config_toml`.
    pub async fn build(self, config_toml: &str) -> TestServer {
        init_crypto_provider();

        let dir = tempfile::tempdir().unwrap();
        let detector = FakeDetector::start(self.behavior).await;
        let upload_root = dir.path().join("uploads");

        let harness_toml = format!(
            r#"
            [database]
            url = "sqlite://{db}"

            [detector]
            url = "{detector}"
            timeout = "5s"

            [retention]
            enabled = false
            upload_root = "{uploads}"
            "#,
            db = dir.path().join("lookout.db").display(),
            detector = detector.url(),
            uploads = upload_root.display(),
        );

        let config: Config = toml::from_str(&format!("{config_toml}\n{harness_toml}")).unwrap();

        // Find an available port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        let shutdown = CancellationToken::new();

        let serve_config = ServeConfig {
            listen_address: address,
            config,
            shutdown: shutdown.clone(),
        };

        let (tx, mut rx) = tokio::sync::oneshot::channel();

        let handle = tokio::spawn(async move {
            // Drop the listener so the server can bind to the address
            drop(listener);

            let _ = tx.send(server::serve(serve_config).await);
        });

        let client = TestClient::new(format!("http://{address}"));

        // Wait until the server answers, or report why it stopped.
        let mut retries = 20;

        loop {
            if let Ok(Err(e)) = rx.try_recv() {
                panic!("Server failed to start: {e}");
            }

            let ping = client.request(Method::GET, "/health").send();

            if let Ok(Ok(_)) = timeout(Duration::from_millis(100), ping).await {
                break;
            }

            retries -= 1;
            assert!(retries > 0, "Server did not start listening on {address}");

            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        TestServer {
            client,
            address,
            detector,
            upload_root,
            shutdown,
            handle: Some(handle),
            _dir: dir,
        }
    }
}

/// Test server that manages the lifecycle of a server instance
pub struct TestServer {
    pub client: TestClient,
    pub address: SocketAddr,
    pub detector: FakeDetector,
    pub upload_root: PathBuf,
    shutdown: CancellationToken,
    handle: Option<tokio::task::JoinHandle<()>>,
    _dir: TempDir,
}

impl TestServer {
    pub fn builder() -> TestServerBuilder {
        TestServerBuilder::default()
    }

    /// Cancels the server and waits for it to wind down.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();

        if let Some(handle) = self.handle.take() {
            timeout(Duration::from_secs(5), handle)
                .await
                .expect("server did not stop after cancellation")
                .unwrap();
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
