use std::time::Instant;

use http::Extensions;
use reqwest::{Client, Request, Response};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, Result};
use reqwest_tracing::{
    default_on_request_end, reqwest_otel_span, ReqwestOtelSpanBackend, TracingMiddleware,
};
use tracing::{field::Empty, Span};

/// Span factory for requests sent to PhantomDB.
struct PhantomDbSpanBackend;

impl ReqwestOtelSpanBackend for PhantomDbSpanBackend {
    fn on_request_start(req: &Request, ext: &mut Extensions) -> Span {
        ext.insert(Instant::now());
        reqwest_otel_span!(name = "phantomdb-request", req, elapsed = Empty)
    }

    fn on_request_end(span: &Span, outcome: &Result<Response>, ext: &mut Extensions) {
        default_on_request_end(span, outcome);
        if let Some(started) = ext.get::<Instant>() {
            span.record("elapsed", started.elapsed().as_secs_f64());
        }
    }
}

/// Wrap [`reqwest::Client`] with tracing middleware.
pub(crate) fn wrap_client(client: Client) -> ClientWithMiddleware {
    ClientBuilder::new(client)
        .with(TracingMiddleware::<PhantomDbSpanBackend>::new())
        .build()
}
