use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header::{HeaderName, HeaderValue};
use actix_web::Error;
use futures::future::{ok, Ready};
use futures::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;
use uuid::Uuid;

/// Binds a fresh request id, logs a start/end pair with method, path,
/// client IP, status and duration, and echoes `X-Request-ID` and
/// `X-Process-Time` on the response.
pub struct RequestLogging;

/// Health checks and metrics poll constantly and are not worth logging.
fn should_log(path: &str) -> bool {
    !matches!(path, "/health" | "/health/" | "/metrics" | "/metrics/")
}

impl<S, B> Transform<S, ServiceRequest> for RequestLogging
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RequestLoggingMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(RequestLoggingMiddleware { service })
    }
}

pub struct RequestLoggingMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for RequestLoggingMiddleware<S>
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
        let request_id = Uuid::new_v4().to_string();
        let method = req.method().to_string();
        let path = req.path().to_string();
        let client_ip = req
            .connection_info()
            .realip_remote_addr()
            .unwrap_or("unknown")
            .to_string();
        let log_this = should_log(&path);

        if log_this {
            log::debug!("[{request_id}] started {method} {path} from {client_ip}");
        }

        let started = Instant::now();
        let fut = self.service.call(req);

        Box::pin(async move {
            let result = fut.await;
            let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

            match result {
                Ok(mut res) => {
                    let status = res.status();
                    if log_this {
                        if status.is_server_error() {
                            log::error!(
                                "[{request_id}] {method} {path} from {client_ip} -> {} in {duration_ms:.2}ms",
                                status.as_u16()
                            );
                        } else if status.is_client_error() {
                            log::warn!(
                                "[{request_id}] {method} {path} from {client_ip} -> {} in {duration_ms:.2}ms",
                                status.as_u16()
                            );
                        } else {
                            log::info!(
                                "[{request_id}] {method} {path} from {client_ip} -> {} in {duration_ms:.2}ms",
                                status.as_u16()
                            );
                        }
                    }

                    if let Ok(value) = HeaderValue::from_str(&request_id) {
                        res.headers_mut().insert(HeaderName::from_static("x-request-id"), value);
                    }
                    if let Ok(value) = HeaderValue::from_str(&format!("{duration_ms:.2}ms")) {
                        res.headers_mut().insert(HeaderName::from_static("x-process-time"), value);
                    }
                    Ok(res)
                }
                Err(e) => {
                    if log_this {
                        log::warn!(
                            "[{request_id}] {method} {path} from {client_ip} -> error in {duration_ms:.2}ms"
                        );
                    }
                    Err(e)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_and_metrics_are_quiet() {
        assert!(!should_log("/health"));
        assert!(!should_log("/metrics"));
        assert!(should_log("/api/v1/validations/quick"));
    }
}
