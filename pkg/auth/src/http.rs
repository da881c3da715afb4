//! HTTP surface for the auth façade. JSON-over-HTTP, not gRPC: `hyper` is
//! the teacher's own transport library, just modernized to the `tokio`-based 0.14 API.

use std::convert::Infallible;
use std::net::SocketAddr;

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde::Deserialize;

use crate::service::AuthService;

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
struct RegisterRequest {
    email: String,
    password: String,
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Deserialize)]
struct ValidateSessionRequest {
    token: String,
}

async fn read_json<T: serde::de::DeserializeOwned>(req: Request<Body>) -> Result<T, Response<Body>> {
    let bytes = hyper::body::to_bytes(req.into_body()).await.map_err(|_| bad_request("failed to read request body"))?;
    serde_json::from_slice(&bytes).map_err(|e| bad_request(&format!("invalid request body: {e}")))
}

async fn route(req: Request<Body>, service: AuthService) -> Result<Response<Body>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = match (&method, path.as_str()) {
        (&Method::POST, "/register") => match read_json::<RegisterRequest>(req).await {
            Ok(body) => json_response(StatusCode::OK, &service.register(&body.email, &body.password)),
            Err(resp) => resp,
        },
        (&Method::POST, "/login") => match read_json::<LoginRequest>(req).await {
            Ok(body) => json_response(StatusCode::OK, &service.login(&body.email, &body.password)),
            Err(resp) => resp,
        },
        (&Method::POST, "/validate_session") => match read_json::<ValidateSessionRequest>(req).await {
            Ok(body) => json_response(StatusCode::OK, &service.validate_session(&body.token)),
            Err(resp) => resp,
        },
        _ => not_found(),
    };

    Ok(response)
}

pub async fn serve(addr: SocketAddr, service: AuthService) -> hyper::Result<()> {
    let make_svc = make_service_fn(move |_conn| {
        let service = service.clone();
        async move { Ok::<_, Infallible>(service_fn(move |req| route(req, service.clone()))) }
    });

    tracing::info!(%addr, "auth service listening");
    Server::bind(&addr)
        .serve(make_svc)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("auth service shutting down");
        })
        .await
}
