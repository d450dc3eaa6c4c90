//! HTTP server exposing a station backend over the remote command boundary
//!
//! `POST /invoke/{command}` with a JSON argument object, JSON result on
//! success, plain-text error otherwise. `GET /health` returns `ok`.

use crate::domain::types::ScanCode;
use crate::io::remote::{
    CodeArgs, Command, InvoiceArgs, NoArgs, RemoteError, SlotArgs, StationBackend,
};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
enum InvokeError {
    #[error("invalid arguments: {0}")]
    BadArgs(String),
    #[error("failed to encode result: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Backend(#[from] RemoteError),
}

impl InvokeError {
    fn status(&self) -> StatusCode {
        match self {
            InvokeError::BadArgs(_) => StatusCode::BAD_REQUEST,
            InvokeError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
            InvokeError::Backend(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

/// An empty body is accepted as `{}`
fn parse_args<T: DeserializeOwned>(body: &[u8]) -> Result<T, InvokeError> {
    let body: &[u8] = if body.iter().all(u8::is_ascii_whitespace) { b"{}" } else { body };
    serde_json::from_slice(body).map_err(|e| InvokeError::BadArgs(e.to_string()))
}

fn code_arg(body: &[u8]) -> Result<ScanCode, InvokeError> {
    let args: CodeArgs = parse_args(body)?;
    ScanCode::parse(&args.code, 1).map_err(|_| InvokeError::BadArgs("empty code".to_string()))
}

fn reply<T: Serialize>(value: T) -> Result<Vec<u8>, InvokeError> {
    Ok(serde_json::to_vec(&value)?)
}

async fn dispatch<B: StationBackend>(
    backend: &B,
    command: Command,
    body: &[u8],
) -> Result<Vec<u8>, InvokeError> {
    match command {
        Command::TicketExists => reply(backend.ticket_exists(&code_arg(body)?).await?),
        Command::CustomerFor => reply(backend.customer_for(&code_arg(body)?).await?),
        Command::IsLastGarment => reply(backend.is_last_garment(&code_arg(body)?).await?),
        Command::SlotForFamily => reply(backend.slot_for_family(&code_arg(body)?).await?),
        Command::TicketFor => reply(backend.ticket_for(&code_arg(body)?).await?),
        Command::ListGarments => {
            let args: InvoiceArgs = parse_args(body)?;
            reply(backend.list_garments(&args.full_invoice_number).await?)
        }
        Command::Reserve => reply(backend.reserve(&code_arg(body)?).await?),
        Command::RunToSlot => {
            let args: SlotArgs = parse_args(body)?;
            reply(backend.run_to_slot(args.slot).await?)
        }
        Command::ReadHangerSensor => {
            let _: NoArgs = parse_args(body)?;
            reply(backend.read_hanger_sensor().await?)
        }
        Command::ClearAll => {
            let _: NoArgs = parse_args(body)?;
            reply(backend.clear_all().await?)
        }
        Command::GetStats => {
            let _: NoArgs = parse_args(body)?;
            reply(backend.stats().await?)
        }
        Command::LinkStatus => {
            let _: NoArgs = parse_args(body)?;
            reply(backend.link_status().await?)
        }
    }
}

fn text_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", "text/plain; charset=utf-8")
        .body(Full::new(body.into()))
        .expect("static response should not fail")
}

async fn handle_request<B: StationBackend>(
    req: Request<hyper::body::Incoming>,
    backend: Arc<B>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let path = req.uri().path().to_string();

    if req.method() == Method::GET && path == "/health" {
        return Ok(text_response(StatusCode::OK, "ok"));
    }

    let Some(name) = path.strip_prefix("/invoke/") else {
        return Ok(text_response(StatusCode::NOT_FOUND, "Not Found"));
    };
    let Some(command) = Command::parse(name) else {
        warn!(command = %name, "unknown_command");
        return Ok(text_response(StatusCode::NOT_FOUND, format!("unknown command {}", name)));
    };
    if req.method() != Method::POST {
        return Ok(text_response(StatusCode::METHOD_NOT_ALLOWED, "use POST"));
    }

    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            return Ok(text_response(StatusCode::BAD_REQUEST, format!("unreadable body: {}", e)));
        }
    };

    match dispatch(backend.as_ref(), command, &body).await {
        Ok(json) => {
            debug!(command = %command.as_str(), "command_handled");
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "application/json")
                .body(Full::new(Bytes::from(json)))
                .expect("static response should not fail"))
        }
        Err(e) => {
            warn!(command = %command.as_str(), error = %e, "command_failed");
            Ok(text_response(e.status(), e.to_string()))
        }
    }
}

/// Serve commands on an already-bound listener until shutdown
pub async fn serve_commands<B: StationBackend + 'static>(
    listener: TcpListener,
    backend: Arc<B>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let backend = backend.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let backend = backend.clone();
                                async move { handle_request(req, backend).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "command_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "command_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("command_server_shutdown");
                    return;
                }
            }
        }
    }
}

/// Bind `0.0.0.0:port` and serve commands until shutdown
pub async fn start_command_server<B: StationBackend + 'static>(
    port: u16,
    backend: Arc<B>,
    shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    info!(port = %port, "command_server_started");
    serve_commands(listener, backend, shutdown).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::SlotNumber;
    use crate::io::http_client::RemoteCommandClient;
    use crate::io::remote::{ConveyorActuator, LinkProbe, SlotAllocator, TicketResolver};
    use crate::io::sim::SimBackend;
    use std::time::Duration;

    async fn spawn_sim(sim: Arc<SimBackend>) -> (String, watch::Sender<bool>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(serve_commands(listener, sim, shutdown_rx));
        (format!("http://{}", addr), shutdown_tx)
    }

    fn code(raw: &str) -> ScanCode {
        ScanCode::parse(raw, 4).unwrap()
    }

    #[tokio::test]
    async fn test_client_round_trip_against_sim() {
        let sim = Arc::new(SimBackend::with_demo_data(20));
        let (url, _shutdown) = spawn_sim(sim.clone()).await;
        let client = RemoteCommandClient::new(&url, Duration::from_secs(2)).unwrap();

        assert!(client.ticket_exists(&code("1001-1")).await.unwrap());
        assert!(!client.ticket_exists(&code("9999")).await.unwrap());

        let customer = client.customer_for(&code("1001-1")).await.unwrap().unwrap();
        assert_eq!(customer.first_name, "Ada");

        let ticket = client.ticket_for(&code("1001-1")).await.unwrap();
        assert_eq!(ticket.number_of_items, 3);
        let garments = client.list_garments(&ticket.full_invoice_number).await.unwrap();
        assert_eq!(garments.len(), 3);

        let slot = client.reserve(&code("1001-1")).await.unwrap();
        assert_eq!(slot, Some(SlotNumber(1)));
        client.run_to_slot(SlotNumber(1)).await.unwrap();
        assert_eq!(sim.runs(), vec![SlotNumber(1)]);

        let stats = client.stats().await.unwrap();
        assert_eq!(stats.total_slots, 20);
        assert_eq!(stats.slots_used, 1);

        assert!(client.link_status().await.unwrap());
        assert!(!client.read_hanger_sensor().await.unwrap());
        client.clear_all().await.unwrap();
        assert_eq!(client.stats().await.unwrap().slots_used, 0);
    }

    #[tokio::test]
    async fn test_backend_error_maps_to_status() {
        let sim = Arc::new(SimBackend::new(4));
        let (url, _shutdown) = spawn_sim(sim).await;
        let client = RemoteCommandClient::new(&url, Duration::from_secs(2)).unwrap();

        let err = client.run_to_slot(SlotNumber(99)).await.unwrap_err();
        match err {
            RemoteError::Status { command, status, body } => {
                assert_eq!(command, "run_to_slot");
                assert_eq!(status, 502);
                assert!(body.contains("out of range"));
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_command_and_health() {
        let sim = Arc::new(SimBackend::new(4));
        let (url, _shutdown) = spawn_sim(sim).await;
        let http = reqwest::Client::new();

        let health = http.get(format!("{}/health", url)).send().await.unwrap();
        assert_eq!(health.status().as_u16(), 200);
        assert_eq!(health.text().await.unwrap(), "ok");

        let unknown = http.post(format!("{}/invoke/jog_forward", url)).send().await.unwrap();
        assert_eq!(unknown.status().as_u16(), 404);

        let bad = http
            .post(format!("{}/invoke/reserve", url))
            .body(r#"{"slot":3}"#)
            .send()
            .await
            .unwrap();
        assert_eq!(bad.status().as_u16(), 400);
    }

    #[test]
    fn test_empty_body_is_no_args() {
        let _: NoArgs = parse_args(b"").unwrap();
        let _: NoArgs = parse_args(b"  \n").unwrap();
        assert!(matches!(parse_args::<CodeArgs>(b"{}"), Err(InvokeError::BadArgs(_))));
    }
}
