//! HTTP/1 endpoint serving `GET /rates`.

use crate::core::service::RatesService;
use anyhow::{Context, Result};
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode, header};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

pub const RATES_PATH: &str = "/rates";

/// Accepts connections until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    service: Arc<RatesService>,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let local_addr = listener
        .local_addr()
        .context("Failed to read listener address")?;
    info!(%local_addr, "Serving rates");

    tokio::pin!(shutdown);
    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(error = %e, "Failed to accept connection");
                    continue;
                }
            },
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
        };

        let service = Arc::clone(&service);
        tokio::spawn(async move {
            let handler = service_fn(move |req| {
                let service = Arc::clone(&service);
                async move { Ok::<_, Infallible>(route(&service, req).await) }
            });
            if let Err(e) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), handler)
                .await
            {
                debug!(%peer, error = %e, "Connection closed with error");
            }
        });
    }

    Ok(())
}

async fn route(service: &RatesService, req: Request<Incoming>) -> Response<Full<Bytes>> {
    debug!(method = %req.method(), path = %req.uri().path(), "Request");
    if req.uri().path() != RATES_PATH {
        return error_response(StatusCode::NOT_FOUND, "Not found");
    }
    if req.method() != Method::GET {
        return error_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed");
    }

    let reply = service.poll().await;
    let status = response_status(reply.http_status());
    match reply.to_json() {
        Ok(body) => json_response(status, body),
        Err(e) => {
            error!(error = %e, "Failed to serialize rates reply");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
    }
}

/// Upstream statuses are forwarded as-is; codes hyper cannot represent become 502.
fn response_status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or_else(|_| {
        warn!(code, "Upstream status is not a valid HTTP status, replying 502");
        StatusCode::BAD_GATEWAY
    })
}

fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    let body = serde_json::json!({ "error": message }).to_string();
    json_response(status, body.into_bytes())
}

fn json_response(status: StatusCode, body: Vec<u8>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CACHE_CONTROL, "no-store")
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|e| {
            error!(error = %e, "Failed to build response");
            let mut fallback = Response::new(Full::new(Bytes::new()));
            *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        })
}
