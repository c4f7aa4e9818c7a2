use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::Method;
use actix_web::Error;
use futures::future::{ok, Ready};
use futures::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::security::error::ApiError;

/// Rejects oversized payloads by Content-Length before the body is read.
/// Requests at exactly the limit pass; one byte over fails with 413.
#[derive(Clone)]
pub struct PayloadLimit {
    max_bytes: usize,
}

impl PayloadLimit {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }
}

impl<S, B> Transform<S, ServiceRequest> for PayloadLimit
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = PayloadLimitMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(PayloadLimitMiddleware { service, max_bytes: self.max_bytes })
    }
}

pub struct PayloadLimitMiddleware<S> {
    service: S,
    max_bytes: usize,
}

impl<S, B> Service<ServiceRequest> for PayloadLimitMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        // Bodyless methods skip the check.
        let method = req.method();
        if method == Method::GET || method == Method::HEAD || method == Method::OPTIONS {
            let fut = self.service.call(req);
            return Box::pin(fut);
        }

        let declared = req
            .headers()
            .get(actix_web::http::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());

        if let Some(length) = declared {
            if length > self.max_bytes {
                let max_mb = self.max_bytes as f64 / (1024.0 * 1024.0);
                log::warn!(
                    "payload too large: {} bytes (max {}) on {}",
                    length,
                    self.max_bytes,
                    req.path()
                );
                return Box::pin(async move {
                    Err(ApiError::PayloadTooLarge { max_mb }.into())
                });
            }
        }

        let fut = self.service.call(req);
        Box::pin(fut)
    }
}
