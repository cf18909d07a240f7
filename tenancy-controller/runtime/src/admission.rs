use crate::{
    conversion,
    core::{RequestContext, UserInfo},
    webhook::{AdmissionRequest, Routes},
};
use futures::future;
use http_body_util::BodyExt;
use hyper::{http, Request, Response};
use kube::core::{
    admission::{AdmissionResponse, AdmissionReview, Operation},
    conversion::ConversionReview,
    DynamicObject,
};
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace, warn};

#[derive(Clone)]
pub struct Admission {
    namespaces: Routes,
    tenants: Routes,
    max_timeout: Duration,
    metrics: Metrics,
}

#[derive(Clone, Debug, Default)]
pub struct Metrics {
    decisions: Family<DecisionLabels, Counter>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct DecisionLabels {
    route: &'static str,
    operation: &'static str,
    allowed: &'static str,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read request body: {0}")]
    Request(#[from] hyper::Error),

    #[error("failed to encode json response: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Route {
    Namespaces,
    Tenants,
    Convert,
}

type Body = http_body_util::Full<bytes::Bytes>;

// === impl Admission ===

impl tower::Service<Request<hyper::body::Incoming>> for Admission {
    type Response = Response<Body>;
    type Error = Error;
    type Future = future::BoxFuture<'static, Result<Response<Body>, Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::result::Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<hyper::body::Incoming>) -> Self::Future {
        trace!(?req);
        let Some(route) = Route::from_request(req.method(), req.uri().path()) else {
            return Box::pin(future::ok(status_response(http::StatusCode::NOT_FOUND)));
        };
        let timeout = request_timeout(req.uri().query()).map_or(self.max_timeout, |t| {
            t.min(self.max_timeout)
        });

        let admission = self.clone();
        Box::pin(async move {
            let bytes = req.into_body().collect().await?.to_bytes();
            admission.handle(route, timeout, bytes).await
        })
    }
}

impl Admission {
    pub fn new(namespaces: Routes, tenants: Routes, max_timeout: Duration, metrics: Metrics) -> Self {
        Self {
            namespaces,
            tenants,
            max_timeout,
            metrics,
        }
    }

    async fn handle(
        self,
        route: Route,
        timeout: Duration,
        bytes: bytes::Bytes,
    ) -> Result<Response<Body>, Error> {
        use bytes::Buf;

        if route == Route::Convert {
            let review: ConversionReview = match serde_json::from_reader(bytes.reader()) {
                Ok(review) => review,
                Err(error) => {
                    warn!(%error, "Failed to parse conversion review");
                    return Ok(status_response(http::StatusCode::BAD_REQUEST));
                }
            };
            return match conversion::review(review) {
                Some(review) => json_response(&review),
                None => Ok(status_response(http::StatusCode::BAD_REQUEST)),
            };
        }

        let review: AdmissionReview<DynamicObject> = match serde_json::from_reader(bytes.reader()) {
            Ok(review) => review,
            Err(error) => {
                warn!(%error, "Failed to parse request body");
                return json_response(&AdmissionResponse::invalid(error).into_review());
            }
        };
        trace!(?review);

        let rsp = match review.try_into() {
            Ok(req) => {
                debug!(?req);
                self.admit(route, timeout, req).await
            }
            Err(error) => {
                warn!(%error, "Invalid admission request");
                AdmissionResponse::invalid(error)
            }
        };
        debug!(?rsp);
        json_response(&rsp.into_review())
    }

    async fn admit(
        &self,
        route: Route,
        timeout: Duration,
        req: AdmissionRequest,
    ) -> AdmissionResponse {
        let routes = match route {
            Route::Namespaces => &self.namespaces,
            Route::Tenants => &self.tenants,
            Route::Convert => return AdmissionResponse::invalid("not an admission route"),
        };
        let operation = operation_label(&req.operation);
        let ctx = RequestContext::new(UserInfo::from(&req.user_info), timeout);

        let rsp = routes.dispatch(ctx, req).await;
        self.metrics.record(route.as_str(), operation, rsp.allowed);
        rsp
    }
}

// === impl Route ===

impl Route {
    fn from_request(method: &http::Method, path: &str) -> Option<Self> {
        if method != http::Method::POST {
            return None;
        }
        match path {
            "/namespaces" => Some(Self::Namespaces),
            "/tenants" => Some(Self::Tenants),
            "/convert" => Some(Self::Convert),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Namespaces => "namespaces",
            Self::Tenants => "tenants",
            Self::Convert => "convert",
        }
    }
}

// === impl Metrics ===

impl Metrics {
    pub fn register(reg: &mut Registry) -> Self {
        let decisions = Family::<DecisionLabels, Counter>::default();
        reg.register(
            "decisions",
            "Total number of admission decisions by route, operation and result",
            decisions.clone(),
        );
        Self { decisions }
    }

    fn record(&self, route: &'static str, operation: &'static str, allowed: bool) {
        self.decisions
            .get_or_create(&DecisionLabels {
                route,
                operation,
                allowed: if allowed { "true" } else { "false" },
            })
            .inc();
    }
}

fn operation_label(operation: &Operation) -> &'static str {
    match operation {
        Operation::Create => "create",
        Operation::Update => "update",
        Operation::Delete => "delete",
        Operation::Connect => "connect",
    }
}

/// Reads the API server's `timeout` query parameter, e.g. `timeout=10s`.
fn request_timeout(query: Option<&str>) -> Option<Duration> {
    let value = query?
        .split('&')
        .find_map(|pair| pair.strip_prefix("timeout="))?;
    if let Some(ms) = value.strip_suffix("ms") {
        return ms.parse().ok().map(Duration::from_millis);
    }
    let secs = value.strip_suffix('s')?;
    secs.parse().ok().map(Duration::from_secs)
}

fn status_response(status: http::StatusCode) -> Response<Body> {
    Response::builder()
        .status(status)
        .body(Body::default())
        .expect("status response must be valid")
}

fn json_response<T: serde::Serialize>(rsp: &T) -> Result<Response<Body>, Error> {
    let bytes = serde_json::to_vec(rsp)?;
    Ok(Response::builder()
        .status(http::StatusCode::OK)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(bytes))
        .expect("review response must be valid"))
}

#[cfg(test)]
mod tests;
