use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use crate::blockchain::{Block, Blockchain, SledKv};
use crate::error::ChainError;

/// Shared application state.
///
/// `writer` serializes appends for the whole draft, mine and commit cycle.
/// `blockchain` is only held for individual store operations, so reads are
/// not stuck behind a running proof-of-work search.
pub struct AppState {
    pub blockchain: Mutex<Blockchain<SledKv>>,
    pub writer: Mutex<()>,
}

impl AppState {
    pub fn new(blockchain: Blockchain<SledKv>) -> Self {
        Self {
            blockchain: Mutex::new(blockchain),
            writer: Mutex::new(()),
        }
    }
}

impl ResponseError for ChainError {
    fn status_code(&self) -> StatusCode {
        match self {
            ChainError::NotFound(_) => StatusCode::NOT_FOUND,
            ChainError::InvalidBlock(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.to_string(),
        })
    }
}

#[derive(Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/* ---------- Chain API Models ---------- */

#[derive(Serialize, Deserialize)]
pub struct ChainResponse {
    pub length: usize,
    pub current_hash: String,
    pub blocks: Vec<Block>,
}

#[derive(Serialize, Deserialize)]
pub struct ValidateResponse {
    pub valid: bool,
    pub length: usize,
    pub difficulty: u32,
    pub error: Option<String>,
}

#[derive(Deserialize, Serialize)]
pub struct AppendRequest {
    pub data: String,
}

#[derive(Serialize, Deserialize)]
pub struct AppendResponse {
    pub height: u32,
    pub hash: String,
    pub previous_hash: String,
    pub nonce: u32,
}

/* ---------- UTXO API Models ---------- */

#[derive(Serialize, Deserialize)]
pub struct UtxoEntry {
    pub txid: String,
    pub vout: u32,
    pub value: i64,
    pub lock_script: String,
}

#[derive(Serialize, Deserialize)]
pub struct UtxoResponse {
    pub size: usize,
    pub outputs: Vec<UtxoEntry>,
}

#[derive(Serialize, Deserialize)]
pub struct BalanceResponse {
    pub address: String,
    pub balance: i128,
    pub utxos: usize,
}
