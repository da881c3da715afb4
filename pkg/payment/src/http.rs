//! HTTP surface for the payment façade. JSON-over-HTTP, matching the transport decision made for
//! the rest of the system.

use std::convert::Infallible;
use std::net::SocketAddr;

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde::Deserialize;

use crate::service::PaymentService;

fn json_response<T: serde::Serialize>(code: StatusCode, body: &T) -> Response<Body> {
    Response::builder()
        .status(code)
        .header("Content-Type", "application/json; charset=utf-8")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

fn bad_request(message: &str) -> Response<Body> {
    Response::builder()
        .status(StatusCode::BAD_REQUEST)
        .header("Content-Type", "text/plain; charset=utf-8")
        .body(Body::from(message.to_string()))
        .unwrap()
}

fn not_found() -> Response<Body> {
    Response::builder().status(StatusCode::NOT_FOUND).body(Body::empty()).unwrap()
}

#[derive(Deserialize)]
struct ProcessPaymentRequest {
    user_id: String,
    amount_cents: u64,
    currency: String,
    card: String,
}

async fn read_json<T: serde::de::DeserializeOwned>(req: Request<Body>) -> Result<T, Response<Body>> {
    let bytes = hyper::body::to_bytes(req.into_body()).await.map_err(|_| bad_request("failed to read request body"))?;
    serde_json::from_slice(&bytes).map_err(|e| bad_request(&format!("invalid request body: {e}")))
}

async fn route(req: Request<Body>, service: PaymentService) -> Result<Response<Body>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = match (&method, path.as_str()) {
        (&Method::POST, "/process_payment") => match read_json::<ProcessPaymentRequest>(req).await {
            Ok(body) => json_response(
                StatusCode::OK,
                &service.process_payment(&body.user_id, body.amount_cents, &body.currency, &body.card),
            ),
            Err(resp) => resp,
        },
        (&Method::GET, path) if path.starts_with("/transactions/") => {
            let transaction_id = &path["/transactions/".len()..];
            json_response(StatusCode::OK, &service.query_transaction(transaction_id))
        }
        _ => not_found(),
    };

    Ok(response)
}

pub async fn serve(addr: SocketAddr, service: PaymentService) -> hyper::Result<()> {
    let make_svc = make_service_fn(move |_conn| {
        let service = service.clone();
        async move { Ok::<_, Infallible>(service_fn(move |req| route(req, service.clone()))) }
    });

    tracing::info!(%addr, "payment service listening");
    Server::bind(&addr)
        .serve(make_svc)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("payment service shutting down");
        })
        .await
}
