//! The reservation coordinator: the booking-facing façade over the consensus node. Every
//! write passes through auth, (for bookings) payment, then consensus; reads are served directly
//! from the local state machine without going through consensus.

use serde::{Deserialize, Serialize};

use auth::store::ADMIN_USER_ID;
use raft::{Command, ConsensusNode, SeatQuery, SeatRecord, ShowSummary};

use crate::errors::{BookingError, BookingResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookSeatResult {
    pub success: bool,
    pub message: String,
    pub booking_id: String,
    pub seat: SeatRecord,
}

pub struct ReservationCoordinator {
    node: ConsensusNode,
    http: reqwest::Client,
    auth_base_url: String,
    payment_base_url: String,
}

impl ReservationCoordinator {
    pub fn new(node: ConsensusNode, auth_base_url: String, payment_base_url: String) -> Self {
        ReservationCoordinator { node, http: reqwest::Client::new(), auth_base_url, payment_base_url }
    }

    pub fn node(&self) -> &ConsensusNode {
        &self.node
    }

    /// Step 1 of every write path: validate the session against the auth façade.
    async fn authenticate(&self, session_token: &str) -> BookingResult<String> {
        #[derive(Serialize)]
        struct Req<'a> {
            token: &'a str,
        }
        #[derive(Deserialize)]
        struct Resp {
            valid: bool,
            user_id: String,
        }

        let url = format!("{}/validate_session", self.auth_base_url);
        let response = self
            .http
            .post(url)
            .json(&Req { token: session_token })
            .send()
            .await
            .map_err(|e| BookingError::Internal(format!("auth façade unreachable: {e}")))?
            .json::<Resp>()
            .await
            .map_err(|e| BookingError::Internal(format!("malformed auth façade response: {e}")))?;

        if !response.valid {
            return Err(BookingError::Unauthenticated);
        }
        Ok(response.user_id)
    }

    async fn charge(&self, user_id: &str, amount_cents: u64, card: &str) -> BookingResult<String> {
        #[derive(Serialize)]
        struct Req<'a> {
            user_id: &'a str,
            amount_cents: u64,
            currency: &'a str,
            card: &'a str,
        }
        #[derive(Deserialize)]
        struct Resp {
            success: bool,
            transaction_id: String,
            message: String,
        }

        let url = format!("{}/process_payment", self.payment_base_url);
        let response = self
            .http
            .post(url)
            .json(&Req { user_id, amount_cents, currency: "usd", card })
            .send()
            .await
            .map_err(|e| BookingError::Internal(format!("payment façade unreachable: {e}")))?
            .json::<Resp>()
            .await
            .map_err(|e| BookingError::Internal(format!("malformed payment façade response: {e}")))?;

        if !response.success {
            return Err(BookingError::PaymentFailed(response.message));
        }
        Ok(response.transaction_id)
    }

    /// Implements the full `book` sequence.
    pub async fn book(&self, session_token: &str, show_id: &str, seat_id: u32, card: &str) -> BookingResult<BookSeatResult> {
        let user_id = self.authenticate(session_token).await?;

        if !self.node.is_leader().await {
            return Err(BookingError::from(raft::RaftError::NotLeader { leader_hint: self.node.leader_hint().await }));
        }

        let price_cents = self.node.price_cents(show_id).await.ok_or(BookingError::UnknownShow)?;

        // Pre-check only: an optimization to avoid charging for an obviously-doomed seat. The
        // real exclusivity guarantee is the idempotent apply, checked again below.
        let pre_check = self.node.query_seat(show_id, seat_id).await;
        if !pre_check.exists {
            return Err(BookingError::SeatOutOfRange);
        }
        if pre_check.reserved {
            return Err(BookingError::SeatTaken);
        }

        let transaction_id = self.charge(&user_id, price_cents, card).await?;

        let command = Command::Reserve {
            show_id: show_id.to_string(),
            seat_id,
            user_id: user_id.clone(),
            booking_id: transaction_id.clone(),
        };
        let payload = serde_json::to_vec(&command).map_err(|e| BookingError::Internal(e.to_string()))?;
        self.node.propose(payload).await?;

        let after = self.node.query_seat(show_id, seat_id).await;
        if after.user_id.as_deref() == Some(user_id.as_str()) {
            tracing::info!(show_id, seat_id, %user_id, "seat booked");
            Ok(BookSeatResult {
                success: true,
                message: "seat reserved".to_string(),
                booking_id: transaction_id,
                seat: SeatRecord {
                    seat_id,
                    reserved: true,
                    user_id: after.user_id,
                    booking_id: after.booking_id,
                },
            })
        } else {
            // Payment already happened; the apply was a no-op because another user's
            // reservation committed first. Report it; the caller does not retry.
            tracing::warn!(show_id, seat_id, %user_id, "booking lost the race for this seat after payment");
            Err(BookingError::SeatTaken)
        }
    }

    pub async fn add_show(&self, session_token: &str, show_id: &str, total_seats: u32, price_cents: u64) -> BookingResult<()> {
        let user_id = self.authenticate(session_token).await?;
        if user_id != ADMIN_USER_ID {
            return Err(BookingError::PermissionDenied);
        }
        if total_seats == 0 {
            return Err(BookingError::InvalidArgument("total_seats must be positive".to_string()));
        }

        if !self.node.is_leader().await {
            return Err(BookingError::from(raft::RaftError::NotLeader { leader_hint: self.node.leader_hint().await }));
        }

        let command = Command::AddShow { show_id: show_id.to_string(), total_seats, price_cents };
        let payload = serde_json::to_vec(&command).map_err(|e| BookingError::Internal(e.to_string()))?;
        self.node.propose(payload).await?;
        Ok(())
    }

    pub async fn query(&self, show_id: &str, seat_id: u32) -> SeatQuery {
        self.node.query_seat(show_id, seat_id).await
    }

    pub async fn list_seats(&self, show_id: &str, page_size: u32, page_token: u32) -> (Vec<SeatRecord>, u32) {
        self.node.list_seats(show_id, page_size, page_token).await
    }

    pub async fn list_shows(&self) -> Vec<ShowSummary> {
        self.node.list_shows().await
    }

    pub fn auth_base_url(&self) -> &str {
        &self.auth_base_url
    }

    pub fn payment_base_url(&self) -> &str {
        &self.payment_base_url
    }

    pub fn http_client(&self) -> &reqwest::Client {
        &self.http
    }
}
