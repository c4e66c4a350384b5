//! Request routing and JSON mapping for the check endpoints.
//!
//! Every request runs under the configured time limit. Checks take an in-flight permit and
//! then run on the blocking pool, since a lookup may touch the disk and a strength estimate
//! is CPU-bound.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::header::{ALLOW, CONTENT_LENGTH, CONTENT_TYPE, HeaderMap, HeaderValue};
use http::{Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use secrecy::SecretString;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task;
use tracing::{debug, error, info, warn};

use crate::config::Limits;
use crate::error::CheckError;
use crate::service::{CheckResponse, CheckService};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Health,
    CheckHash,
    CheckPassword,
}

impl Route {
    fn from_path(path: &str) -> Option<Self> {
        match path {
            "/health" => Some(Route::Health),
            "/v1/check/hash" => Some(Route::CheckHash),
            "/v1/check/password" => Some(Route::CheckPassword),
            _ => None,
        }
    }

    fn path(self) -> &'static str {
        match self {
            Route::Health => "/health",
            Route::CheckHash => "/v1/check/hash",
            Route::CheckPassword => "/v1/check/password",
        }
    }

    fn method(self) -> Method {
        match self {
            Route::Health => Method::GET,
            Route::CheckHash | Route::CheckPassword => Method::POST,
        }
    }

    fn allow(self) -> &'static str {
        match self {
            Route::Health => "GET",
            Route::CheckHash | Route::CheckPassword => "POST",
        }
    }
}

#[derive(Deserialize)]
struct HashBody {
    hash: String,
}

#[derive(Deserialize)]
struct PasswordBody {
    password: String,
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    items: u64,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

/// The HTTP surface of a [`CheckService`].
pub struct Api {
    service: Arc<CheckService>,
    in_flight: Arc<Semaphore>,
    max_body_bytes: usize,
    request_timeout: Duration,
}

impl Api {
    pub fn new(service: Arc<CheckService>, limits: &Limits) -> Self {
        Self {
            service,
            in_flight: Arc::new(Semaphore::new(limits.max_in_flight)),
            max_body_bytes: limits.max_body_bytes,
            request_timeout: limits.request_timeout,
        }
    }

    /// Answers one request. Never fails: every problem maps to a status code and an
    /// `{"error": ...}` body.
    pub async fn handle<B>(&self, request: Request<B>) -> Response<Full<Bytes>>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        let started = Instant::now();
        let method = request.method().clone();
        let route = Route::from_path(request.uri().path());

        let response = match route {
            None => error_response(StatusCode::NOT_FOUND, "not found"),
            Some(route) if method != route.method() => {
                let mut response =
                    error_response(StatusCode::METHOD_NOT_ALLOWED, "method not allowed");
                response.headers_mut().insert(ALLOW, HeaderValue::from_static(route.allow()));
                response
            }
            Some(route) => {
                match tokio::time::timeout(self.request_timeout, self.dispatch(route, request))
                    .await
                {
                    Ok(response) => response,
                    Err(_) => {
                        warn!(route = route.path(), "request timed out");
                        error_response(StatusCode::SERVICE_UNAVAILABLE, "request timed out")
                    }
                }
            }
        };

        info!(
            method = %method,
            route = route.map_or("<unmatched>", Route::path),
            status = response.status().as_u16(),
            latency_us = started.elapsed().as_micros() as u64,
            "request"
        );
        response
    }

    async fn dispatch<B>(&self, route: Route, request: Request<B>) -> Response<Full<Bytes>>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        match route {
            Route::Health => json_response(
                StatusCode::OK,
                &Health { status: "ok", items: self.service.index().current().count() },
            ),
            Route::CheckHash => {
                let body: HashBody = match self.read_json(request).await {
                    Ok(body) => body,
                    Err(response) => return response,
                };
                self.run_check(move |service| service.check_hash_hex(&body.hash)).await
            }
            Route::CheckPassword => {
                let body: PasswordBody = match self.read_json(request).await {
                    Ok(body) => body,
                    Err(response) => return response,
                };
                let password = SecretString::from(body.password);
                self.run_check(move |service| service.check_password(&password)).await
            }
        }
    }

    async fn read_json<B, T>(&self, request: Request<B>) -> Result<T, Response<Full<Bytes>>>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<BoxError>,
        T: DeserializeOwned,
    {
        if content_length(request.headers()).is_some_and(|len| len > self.max_body_bytes as u64) {
            return Err(error_response(StatusCode::PAYLOAD_TOO_LARGE, "request body too large"));
        }

        let body = match Limited::new(request.into_body(), self.max_body_bytes).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(err) if err.downcast_ref::<LengthLimitError>().is_some() => {
                return Err(error_response(
                    StatusCode::PAYLOAD_TOO_LARGE,
                    "request body too large",
                ));
            }
            Err(err) => {
                debug!(error = %err, "failed to read request body");
                return Err(error_response(StatusCode::BAD_REQUEST, "could not read request body"));
            }
        };

        // serde's message can quote the input, so only a fixed text goes back
        serde_json::from_slice(&body)
            .map_err(|_| error_response(StatusCode::BAD_REQUEST, "invalid JSON body"))
    }

    async fn run_check<F>(&self, check: F) -> Response<Full<Bytes>>
    where
        F: FnOnce(&CheckService) -> Result<CheckResponse, CheckError> + Send + 'static,
    {
        let Ok(permit) = Arc::clone(&self.in_flight).acquire_owned().await else {
            return error_response(StatusCode::SERVICE_UNAVAILABLE, "server is shutting down");
        };
        let service = Arc::clone(&self.service);
        let outcome = task::spawn_blocking(move || {
            let _permit = permit;
            check(&service)
        })
        .await;

        match outcome {
            Ok(Ok(response)) => json_response(StatusCode::OK, &response),
            Ok(Err(err)) => check_error_response(&err),
            Err(err) => {
                error!(error = %err, "check task failed");
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
            }
        }
    }
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers.get(CONTENT_LENGTH)?.to_str().ok()?.parse().ok()
}

fn check_error_response(err: &CheckError) -> Response<Full<Bytes>> {
    match err {
        CheckError::InvalidDigest(_) | CheckError::InputTooLong(_) => {
            error_response(StatusCode::BAD_REQUEST, &err.to_string())
        }
        CheckError::InternalLookup(_) => {
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    json_response(status, &ErrorBody { error: message })
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    let (status, body) = match serde_json::to_vec(value) {
        Ok(body) => (status, Bytes::from(body)),
        Err(err) => {
            error!(error = %err, "failed to serialize response");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Bytes::from_static(br#"{"error":"internal error"}"#),
            )
        }
    };
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// Adapts [`Api::handle`] to hyper's infallible service signature.
pub async fn serve_request<B>(
    api: Arc<Api>,
    request: Request<B>,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    Ok(api.handle(request).await)
}
