//! The payment façade's operations: process_payment, query_transaction.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::store::{Transaction, TransactionStatus, TransactionStore};

/// Sentinel card number that deterministically fails, for exercising `PaymentFailed` paths
/// without depending on real randomness.
const FAILING_CARD: &str = "9999";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentResponse {
    pub success: bool,
    pub transaction_id: String,
    pub status: TransactionStatus,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryTransactionResponse {
    pub transaction_id: String,
    pub status: QueryStatus,
    pub amount_cents: Option<u64>,
    pub currency: Option<String>,
    pub created_at: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryStatus {
    Completed,
    Failed,
    NotFound,
}

#[derive(Clone)]
pub struct PaymentService {
    store: Arc<TransactionStore>,
}

impl PaymentService {
    pub fn new(store: Arc<TransactionStore>) -> Self {
        PaymentService { store }
    }

    pub fn process_payment(&self, user_id: &str, amount_cents: u64, currency: &str, card: &str) -> PaymentResponse {
        tracing::info!(user_id, amount_cents, currency, "processing payment");

        let status = if card == FAILING_CARD { TransactionStatus::Failed } else { TransactionStatus::Completed };
        let transaction_id = uuid::Uuid::new_v4().to_string();
        let transaction = Transaction {
            user_id: user_id.to_string(),
            amount_cents,
            currency: currency.to_string(),
            status,
            card_fingerprint: mask_card(card),
            created_at: now_unix(),
        };

        if let Err(e) = self.store.insert(transaction_id.clone(), transaction) {
            tracing::error!(error = %e, "failed to persist payment transaction");
        }

        match status {
            TransactionStatus::Completed => PaymentResponse {
                success: true,
                transaction_id,
                status,
                message: "Payment processed successfully.".to_string(),
            },
            TransactionStatus::Failed => PaymentResponse {
                success: false,
                transaction_id,
                status,
                message: "Payment declined.".to_string(),
            },
        }
    }

    pub fn query_transaction(&self, transaction_id: &str) -> QueryTransactionResponse {
        match self.store.get(transaction_id) {
            Some(txn) => QueryTransactionResponse {
                transaction_id: transaction_id.to_string(),
                status: match txn.status {
                    TransactionStatus::Completed => QueryStatus::Completed,
                    TransactionStatus::Failed => QueryStatus::Failed,
                },
                amount_cents: Some(txn.amount_cents),
                currency: Some(txn.currency),
                created_at: Some(txn.created_at),
            },
            None => QueryTransactionResponse {
                transaction_id: transaction_id.to_string(),
                status: QueryStatus::NotFound,
                amount_cents: None,
                currency: None,
                created_at: None,
            },
        }
    }
}

/// Keeps only the last 4 digits of the card number, matching how a real processor's webhook
/// payload would report a fingerprint back to the merchant.
fn mask_card(card: &str) -> String {
    let digits: String = card.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() <= 4 {
        format!("****{digits}")
    } else {
        format!("****{}", &digits[digits.len() - 4..])
    }
}

fn now_unix() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> PaymentService {
        let dir = std::env::temp_dir().join(format!("payment-test-{}", uuid::Uuid::new_v4()));
        PaymentService::new(Arc::new(TransactionStore::open(dir.join("transactions.json")).unwrap()))
    }

    #[test]
    fn sentinel_card_fails_deterministically() {
        let svc = service();
        let response = svc.process_payment("u1", 1000, "usd", "9999");
        assert!(!response.success);
        assert_eq!(response.status, TransactionStatus::Failed);
    }

    #[test]
    fn ordinary_card_succeeds() {
        let svc = service();
        let response = svc.process_payment("u1", 1000, "usd", "4242424242424242");
        assert!(response.success);
        assert_eq!(response.status, TransactionStatus::Completed);
    }

    #[test]
    fn query_after_payment_reports_the_stored_record() {
        let svc = service();
        let payment = svc.process_payment("u1", 500, "usd", "4111111111111111");
        let query = svc.query_transaction(&payment.transaction_id);
        assert_eq!(query.status, QueryStatus::Completed);
        assert_eq!(query.amount_cents, Some(500));
    }

    #[test]
    fn query_unknown_transaction_is_not_found() {
        let svc = service();
        let query = svc.query_transaction("does-not-exist");
        assert_eq!(query.status, QueryStatus::NotFound);
    }

    #[test]
    fn fingerprint_only_keeps_last_four_digits() {
        assert_eq!(mask_card("4242424242424242"), "****4242");
        assert_eq!(mask_card("12"), "****12");
    }
}
