//! Admission middleware for HTTP requests.

use std::{
    fmt::Display,
    future::Future,
    net::{IpAddr, SocketAddr},
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use axum::{body::Body, extract::ConnectInfo};
use http::{HeaderMap, HeaderValue, Request, Response, StatusCode, header::AUTHORIZATION, header::CONTENT_TYPE};
use rate_limit::{AdmissionGate, AdmissionRequest, RESET_HINT_SECS, RouteClass};
use tower::Layer;

const LIMIT_HEADER: &str = "x-ratelimit-limit";
const REMAINING_HEADER: &str = "x-ratelimit-remaining";
const RESET_HEADER: &str = "x-ratelimit-reset";

/// Runs every request of the wrapped routes through the admission gate.
///
/// The route class is fixed when the layer is mounted.
#[derive(Clone)]
pub struct AdmissionLayer {
    gate: Arc<AdmissionGate>,
    route: RouteClass,
}

impl AdmissionLayer {
    pub fn new(gate: Arc<AdmissionGate>, route: RouteClass) -> Self {
        Self { gate, route }
    }
}

impl<Service> Layer<Service> for AdmissionLayer
where
    Service: Send + Clone,
{
    type Service = AdmissionService<Service>;

    fn layer(&self, next: Service) -> Self::Service {
        AdmissionService {
            next,
            gate: self.gate.clone(),
            route: self.route,
        }
    }
}

#[derive(Clone)]
pub struct AdmissionService<Service> {
    next: Service,
    gate: Arc<AdmissionGate>,
    route: RouteClass,
}

impl<Service, ReqBody> tower::Service<Request<ReqBody>> for AdmissionService<Service>
where
    Service: tower::Service<Request<ReqBody>, Response = Response<Body>> + Send + Clone + 'static,
    Service::Future: Send,
    Service::Error: Display + 'static,
    ReqBody: http_body::Body + Send + 'static,
{
    type Response = http::Response<Body>;
    type Error = Service::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response<Body>, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.next.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let mut next = self.next.clone();
        let gate = self.gate.clone();
        let admission = admission_request(&req, self.route);

        Box::pin(async move {
            let err = match gate.check(&admission) {
                Ok(allowed) => {
                    let mut response = next.call(req).await?;

                    // Remaining is read after the handler ran, so it reflects
                    // requests admitted concurrently with this one.
                    let remaining = gate.remaining(&admission.key);
                    set_headers(response.headers_mut(), allowed.limit, remaining, RESET_HINT_SECS);

                    return Ok(response);
                }
                Err(err) => err,
            };

            log::debug!("Request rejected by admission gate: {err}");

            let mut response = Response::new(Body::from(err.to_string()));
            *response.status_mut() = StatusCode::TOO_MANY_REQUESTS;

            let headers = response.headers_mut();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
            set_headers(headers, err.limit(), 0, err.reset_secs());

            Ok(response)
        })
    }
}

fn admission_request<B>(req: &Request<B>, route: RouteClass) -> AdmissionRequest {
    let mut builder = AdmissionRequest::builder().route(route);

    if let Some(authorization) = req.headers().get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        builder = builder.authorization(authorization);
    }

    if let Some(ip) = extract_client_ip(req) {
        builder = builder.ip(ip);
    }

    builder.build()
}

fn set_headers(headers: &mut HeaderMap, limit: u32, remaining: u32, reset_secs: u64) {
    headers.insert(LIMIT_HEADER, HeaderValue::from(limit));
    headers.insert(REMAINING_HEADER, HeaderValue::from(remaining));
    headers.insert(RESET_HEADER, HeaderValue::from(reset_secs));
}

/// Extract client IP address from request.
fn extract_client_ip<B>(req: &Request<B>) -> Option<IpAddr> {
    // First try to get from ConnectInfo (direct connection)
    if let Some(connect_info) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return Some(connect_info.0.ip());
    }

    // Try X-Forwarded-For header (for proxied requests)
    if let Some(forwarded_for) = req.headers().get("x-forwarded-for") {
        let value = forwarded_for.to_str().ok()?;

        // Take the first IP in the chain
        let ip_str = value.split(',').next()?;

        return ip_str.trim().parse::<IpAddr>().ok();
    }

    // Try X-Real-IP header
    let ip_str = req.headers().get("x-real-ip")?.to_str().ok()?;

    ip_str.parse::<IpAddr>().ok()
}
