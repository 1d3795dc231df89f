//! Request information for admission control.

use std::net::IpAddr;

/// How a route is treated by the admission gate.
///
/// Routes declare their class when they are mounted; the gate never inspects
/// paths or methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RouteClass {
    /// Subject to the burst window only.
    #[default]
    Standard,
    /// Subject to the burst window and the upload window.
    Upload,
}

/// Information about a request that needs to pass admission.
#[derive(Debug, Clone)]
pub struct AdmissionRequest {
    /// Identity the windows are keyed by.
    pub key: String,
    /// Class of the route being called.
    pub route: RouteClass,
}

impl AdmissionRequest {
    /// Create a new builder for an admission request.
    pub fn builder() -> AdmissionRequestBuilder {
        AdmissionRequestBuilder::default()
    }
}

/// Builder for creating admission requests.
#[derive(Debug, Default)]
pub struct AdmissionRequestBuilder {
    authorization: Option<String>,
    ip: Option<IpAddr>,
    route: RouteClass,
}

impl AdmissionRequestBuilder {
    /// Set the raw `Authorization` header value.
    pub fn authorization(mut self, value: impl Into<String>) -> Self {
        self.authorization = Some(value.into());
        self
    }

    /// Set the client IP address.
    pub fn ip(mut self, ip: IpAddr) -> Self {
        self.ip = Some(ip);
        self
    }

    /// Set the route class.
    pub fn route(mut self, route: RouteClass) -> Self {
        self.route = route;
        self
    }

    /// Build the admission request.
    ///
    /// The key is the raw credential when one was sent, otherwise
    /// `anon:<client address>`.
    pub fn build(self) -> AdmissionRequest {
        let key = match (self.authorization, self.ip) {
            (Some(credential), _) if !credential.is_empty() => credential,
            (_, Some(ip)) => format!("anon:{ip}"),
            (_, None) => "anon:unknown".to_string(),
        };

        AdmissionRequest { key, route: self.route }
    }
}
