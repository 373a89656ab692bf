//! Request logging middleware with request IDs and timing.

use std::task::{Context, Poll};
use std::time::Instant;

use http::{Request, Response};
use tower::{Layer, Service};
use tracing::{Instrument, debug, info, warn};
use uuid::Uuid;

/// Header carrying the request ID.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// A `Layer` that logs each request with its ID, status and duration.
#[derive(Debug, Clone)]
pub struct RequestLoggerLayer;

impl<S> Layer<S> for RequestLoggerLayer {
    type Service = RequestLoggerService<S>;

    fn layer(&self, service: S) -> Self::Service {
        RequestLoggerService { service }
    }
}

/// A `Service` that logs request information with request IDs and timing.
#[derive(Debug, Clone)]
pub struct RequestLoggerService<S> {
    service: S,
}

impl<S, B, ResBody> Service<Request<B>> for RequestLoggerService<S>
where
    S: Service<Request<B>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<B>) -> Self::Future {
        let request_id = request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map_or_else(|| Uuid::new_v4().to_string(), ToString::to_string);

        if !request.headers().contains_key(REQUEST_ID_HEADER) {
            if let Ok(header_value) = http::HeaderValue::from_str(&request_id) {
                request.headers_mut().insert(REQUEST_ID_HEADER, header_value);
            }
        }

        let method = request.method().clone();
        let uri = request.uri().path().to_string();
        let start_time = Instant::now();

        let span =
            tracing::info_span!("request", request_id = %request_id, method = %method, uri = %uri);

        // The cookie header carries the session id; keep it out of the logs.
        for (name, value) in request.headers() {
            if name == http::header::COOKIE {
                continue;
            }
            let value = value.to_str().unwrap_or("<?>");
            debug!(parent: &span, header = %name, value = %value, "Request header");
        }

        let future = self.service.call(request);
        Box::pin(
            async move {
                info!("Received request");
                let result = future.await;
                let duration = start_time.elapsed();

                match &result {
                    Ok(response) => {
                        info!(
                            status = response.status().as_u16(),
                            duration_ms = duration.as_millis() as u64,
                            "Request completed"
                        );
                    }
                    Err(_) => {
                        warn!(duration_ms = duration.as_millis() as u64, "Request failed");
                    }
                }

                result
            }
            .instrument(span),
        )
    }
}
