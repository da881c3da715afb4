//! Transaction persistence. Every payment attempt — success or failure — produces a
//! record keyed by a freshly generated transaction id, written to a single JSON file rewritten
//! after each mutation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::errors::{PaymentError, PaymentResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub user_id: String,
    pub amount_cents: u64,
    pub currency: String,
    pub status: TransactionStatus,
    pub card_fingerprint: String,
    pub created_at: i64,
}

pub struct TransactionStore {
    path: PathBuf,
    data: Mutex<HashMap<String, Transaction>>,
}

impl TransactionStore {
    pub fn open(path: impl AsRef<Path>) -> PaymentResult<Self> {
        let path = path.as_ref().to_path_buf();
        let data = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .map_err(|source| PaymentError::Load { path: path.display().to_string(), source })?;
            if content.trim().is_empty() {
                HashMap::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            HashMap::new()
        };

        Ok(TransactionStore { path, data: Mutex::new(data) })
    }

    fn persist(&self) -> PaymentResult<()> {
        let data = self.data.lock().unwrap();
        let body = serde_json::to_string_pretty(&*data)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| PaymentError::Save { path: self.path.display().to_string(), source })?;
        }
        std::fs::write(&self.path, body).map_err(|source| PaymentError::Save { path: self.path.display().to_string(), source })
    }

    pub fn insert(&self, transaction_id: String, transaction: Transaction) -> PaymentResult<()> {
        self.data.lock().unwrap().insert(transaction_id, transaction);
        self.persist()
    }

    pub fn get(&self, transaction_id: &str) -> Option<Transaction> {
        self.data.lock().unwrap().get(transaction_id).cloned()
    }
}
