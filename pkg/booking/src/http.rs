//! The booking node's HTTP surface: the peer consensus RPCs, the client-facing reservation
//! RPCs, and pass-through proxies to the auth/payment façades so a client only needs to know one
//! node's address.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::coordinator::ReservationCoordinator;
use crate::errors::BookingError;

fn json_response<T: serde::Serialize>(code: StatusCode, body: &T) -> Response<Body> {
    Response::builder()
        .status(code)
        .header("Content-Type", "application/json; charset=utf-8")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

fn not_found() -> Response<Body> {
    Response::builder().status(StatusCode::NOT_FOUND).body(Body::empty()).unwrap()
}

#[derive(Serialize)]
struct ErrorBody {
    status: &'static str,
    message: String,
}

/// Maps a `BookingError` to an HTTP status and a status name. `NotLeader`, `Unauthenticated`, and
/// `PermissionDenied` each get a distinct status name clients can branch on, notably the "not
/// the Raft leader" message that tells a client to rotate peers.
fn error_response(e: BookingError) -> Response<Body> {
    let (code, status) = match &e {
        BookingError::InvalidArgument(_) => (StatusCode::BAD_REQUEST, "INVALID_ARGUMENT"),
        BookingError::Unauthenticated => (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED"),
        BookingError::PermissionDenied => (StatusCode::FORBIDDEN, "PERMISSION_DENIED"),
        BookingError::NotLeader(_) => (StatusCode::PRECONDITION_FAILED, "FAILED_PRECONDITION"),
        BookingError::UnknownShow => (StatusCode::NOT_FOUND, "UNKNOWN_SHOW"),
        BookingError::SeatOutOfRange => (StatusCode::BAD_REQUEST, "SEAT_OUT_OF_RANGE"),
        BookingError::SeatTaken => (StatusCode::CONFLICT, "SEAT_TAKEN"),
        BookingError::PaymentFailed(_) => (StatusCode::from_u16(422).unwrap(), "ABORTED"),
        BookingError::LeadershipLost => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE"),
        BookingError::ProposalTimeout => (StatusCode::GATEWAY_TIMEOUT, "UNAVAILABLE"),
        BookingError::PeerUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE"),
        BookingError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
    };
    json_response(code, &ErrorBody { status, message: e.to_string() })
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                if let Ok(byte) = u8::from_str_radix(&s[i + 1..i + 3], 16) {
                    out.push(byte);
                    i += 3;
                } else {
                    out.push(bytes[i]);
                    i += 1;
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn query_params(req: &Request<Body>) -> HashMap<String, String> {
    req.uri()
        .query()
        .map(|q| {
            q.split('&')
                .filter_map(|pair| pair.split_once('='))
                .map(|(k, v)| (percent_decode(k), percent_decode(v)))
                .collect::<HashMap<String, String>>()
        })
        .unwrap_or_default()
}

async fn read_json<T: serde::de::DeserializeOwned>(req: Request<Body>) -> Result<T, Response<Body>> {
    let bytes = hyper::body::to_bytes(req.into_body())
        .await
        .map_err(|_| error_response(BookingError::InvalidArgument("failed to read request body".into())))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| error_response(BookingError::InvalidArgument(format!("invalid request body: {e}"))))
}

#[derive(Deserialize)]
struct BookSeatRequest {
    session_token: String,
    show_id: String,
    seat_id: u32,
    card_number: String,
}

#[derive(Deserialize)]
struct AddShowRequest {
    session_token: String,
    show_id: String,
    total_seats: u32,
    price_cents: u64,
}

async fn route(req: Request<Body>, coordinator: Arc<ReservationCoordinator>) -> Result<Response<Body>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = match (&method, path.as_str()) {
        (&Method::POST, "/raft/request_vote") => match read_json(req).await {
            Ok(request) => json_response(StatusCode::OK, &coordinator.node().handle_request_vote(request).await),
            Err(resp) => resp,
        },
        (&Method::POST, "/raft/append_entries") => match read_json(req).await {
            Ok(request) => json_response(StatusCode::OK, &coordinator.node().handle_append_entries(request).await),
            Err(resp) => resp,
        },

        (&Method::POST, "/book_seat") => match read_json::<BookSeatRequest>(req).await {
            Ok(body) => {
                match coordinator.book(&body.session_token, &body.show_id, body.seat_id, &body.card_number).await {
                    Ok(result) => json_response(StatusCode::OK, &result),
                    Err(e) => error_response(e),
                }
            }
            Err(resp) => resp,
        },

        (&Method::POST, "/add_show") => match read_json::<AddShowRequest>(req).await {
            Ok(body) => {
                match coordinator.add_show(&body.session_token, &body.show_id, body.total_seats, body.price_cents).await {
                    Ok(()) => json_response(StatusCode::OK, &serde_json::json!({ "success": true })),
                    Err(e) => error_response(e),
                }
            }
            Err(resp) => resp,
        },

        (&Method::GET, "/query_seat") => {
            let params = query_params(&req);
            let show_id = params.get("show_id").cloned().unwrap_or_default();
            let seat_id: u32 = params.get("seat_id").and_then(|s| s.parse().ok()).unwrap_or(0);
            let seat = coordinator.query(&show_id, seat_id).await;
            let available = seat.exists && !seat.reserved;
            json_response(StatusCode::OK, &serde_json::json!({ "available": available, "seat": seat }))
        }

        (&Method::GET, "/list_seats") => {
            let params = query_params(&req);
            let show_id = params.get("show_id").cloned().unwrap_or_default();
            let page_size: u32 = params.get("page_size").and_then(|s| s.parse().ok()).unwrap_or(20);
            let page_token: u32 = params.get("page_token").and_then(|s| s.parse().ok()).unwrap_or(1);
            let (seats, next_page_token) = coordinator.list_seats(&show_id, page_size, page_token).await;
            json_response(StatusCode::OK, &serde_json::json!({ "seats": seats, "next_page_token": next_page_token }))
        }

        (&Method::GET, "/list_shows") => {
            json_response(StatusCode::OK, &serde_json::json!({ "shows": coordinator.list_shows().await }))
        }

        // Pass-through proxies so a client only needs one node's address.
        (&Method::POST, "/register") => proxy(req, coordinator.http_client(), coordinator.auth_base_url(), "/register").await,
        (&Method::POST, "/login") => proxy(req, coordinator.http_client(), coordinator.auth_base_url(), "/login").await,
        (&Method::POST, "/validate_session") => {
            proxy(req, coordinator.http_client(), coordinator.auth_base_url(), "/validate_session").await
        }
        (&Method::POST, "/process_payment") => {
            proxy(req, coordinator.http_client(), coordinator.payment_base_url(), "/process_payment").await
        }
        (&Method::GET, path) if path.starts_with("/transactions/") => {
            let url = format!("{}{}", coordinator.payment_base_url(), path);
            match coordinator.http_client().get(url).send().await {
                Ok(upstream) => forward_response(upstream).await,
                Err(_) => error_response(BookingError::Internal("payment façade unreachable".into())),
            }
        }

        _ => not_found(),
    };

    Ok(response)
}

async fn proxy(req: Request<Body>, client: &reqwest::Client, base_url: &str, path: &str) -> Response<Body> {
    let bytes = match hyper::body::to_bytes(req.into_body()).await {
        Ok(b) => b,
        Err(_) => return error_response(BookingError::InvalidArgument("failed to read request body".into())),
    };

    let url = format!("{base_url}{path}");
    match client.post(url).body(bytes.to_vec()).header("Content-Type", "application/json").send().await {
        Ok(upstream) => forward_response(upstream).await,
        Err(_) => error_response(BookingError::Internal(format!("façade at {base_url} unreachable"))),
    }
}

async fn forward_response(upstream: reqwest::Response) -> Response<Body> {
    let status = StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    match upstream.bytes().await {
        Ok(bytes) => Response::builder()
            .status(status)
            .header("Content-Type", "application/json; charset=utf-8")
            .body(Body::from(bytes))
            .unwrap(),
        Err(_) => error_response(BookingError::Internal("failed to read upstream response".into())),
    }
}

pub async fn serve(addr: SocketAddr, coordinator: Arc<ReservationCoordinator>) -> hyper::Result<()> {
    let make_svc = make_service_fn(move |_conn| {
        let coordinator = coordinator.clone();
        async move { Ok::<_, Infallible>(service_fn(move |req| route(req, coordinator.clone()))) }
    });

    tracing::info!(%addr, "booking node listening");
    hyper::Server::bind(&addr)
        .serve(make_svc)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("booking node shutting down");
        })
        .await
}
