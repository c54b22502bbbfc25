use actix_web::{HttpResponse, Responder, ResponseError, get, post, web};
use log::{info, warn};

use super::models::{AppState, AppendRequest, AppendResponse, ChainResponse, ValidateResponse};
use crate::Result;
use crate::blockchain::Block;

#[get("/api/v1/health/")]
pub async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let bc = state.blockchain.lock().expect("mutex poisoned");
    HttpResponse::Ok().body(format!("ledger up, tip {}", bc.current_hash()))
}

/// Get the full chain, genesis first.
#[get("/chain/")]
pub async fn get_chain(state: web::Data<AppState>) -> impl Responder {
    let bc = state.blockchain.lock().expect("mutex poisoned");
    match bc.all_blocks() {
        Ok(blocks) => HttpResponse::Ok().json(ChainResponse {
            length: blocks.len(),
            current_hash: bc.current_hash().to_string(),
            blocks,
        }),
        Err(e) => {
            warn!("GET /chain/ - traversal failed: {}", e);
            e.source.error_response()
        }
    }
}

#[get("/blocks/{hash}/")]
pub async fn get_block(state: web::Data<AppState>, path: web::Path<(String,)>) -> impl Responder {
    let hash = path.into_inner().0;
    let bc = state.blockchain.lock().expect("mutex poisoned");
    match bc.find_by_hash(&hash) {
        Ok(block) => HttpResponse::Ok().json(block),
        Err(e) => e.error_response(),
    }
}

#[get("/tip/")]
pub async fn get_tip(state: web::Data<AppState>) -> impl Responder {
    let bc = state.blockchain.lock().expect("mutex poisoned");
    match bc.find_last() {
        Ok(block) => HttpResponse::Ok().json(block),
        Err(e) => e.error_response(),
    }
}

/// Mine a block carrying `data` and make it the new tip.
/// Mining runs on the blocking pool with only the writer lock held.
#[post("/blocks/")]
pub async fn append_block(
    state: web::Data<AppState>,
    req: web::Json<AppendRequest>,
) -> impl Responder {
    let data = req.into_inner().data;
    if data.trim().is_empty() {
        return HttpResponse::BadRequest().body("data required");
    }

    let result = web::block(move || -> Result<Block> {
        let _writer = state.writer.lock().expect("mutex poisoned");
        let (mut block, pow) = {
            let bc = state.blockchain.lock().expect("mutex poisoned");
            (bc.draft(&data)?, bc.config().pow())
        };
        block.mine(&pow);
        state.blockchain.lock().expect("mutex poisoned").commit(block)
    })
    .await;

    match result {
        Ok(Ok(block)) => {
            info!(
                "POST /blocks/ - sealed block #{} (hash={})",
                block.height, block.hash
            );
            HttpResponse::Ok().json(AppendResponse {
                height: block.height,
                hash: block.hash,
                previous_hash: block.previous_hash,
                nonce: block.nonce,
            })
        }
        Ok(Err(e)) => {
            warn!("POST /blocks/ - append failed: {}", e);
            e.error_response()
        }
        Err(e) => {
            warn!("POST /blocks/ - mining worker failed: {}", e);
            HttpResponse::InternalServerError().body("mining worker failed")
        }
    }
}

/// Audit hashes, proof-of-work and linkage of the whole chain.
#[get("/validate/")]
pub async fn validate_chain(state: web::Data<AppState>) -> impl Responder {
    let bc = state.blockchain.lock().expect("mutex poisoned");
    let difficulty = bc.config().difficulty;
    let resp = match bc.verify() {
        Ok(length) => ValidateResponse {
            valid: true,
            length,
            difficulty,
            error: None,
        },
        Err(e) => ValidateResponse {
            valid: false,
            length: 0,
            difficulty,
            error: Some(e.to_string()),
        },
    };
    HttpResponse::Ok().json(resp)
}

#[cfg(test)]
mod tests {
    use actix_web::{App, test, web};

    use crate::api::init_routes;
    use crate::api::models::{AppState, AppendResponse, ChainResponse, ValidateResponse};
    use crate::blockchain::{Blockchain, ChainStore, SledKv};
    use crate::config::ChainConfig;

    fn state(dir: &tempfile::TempDir) -> web::Data<AppState> {
        let store = ChainStore::new(SledKv::open(dir.path()).unwrap());
        let bc = Blockchain::open(store, ChainConfig::new(1, "miner")).unwrap();
        web::Data::new(AppState::new(bc))
    }

    #[actix_web::test]
    async fn append_then_read_chain() {
        let dir = tempfile::tempdir().unwrap();
        let app = test::init_service(
            App::new()
                .app_data(state(&dir))
                .configure(init_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/blocks/")
            .set_json(serde_json::json!({ "data": "alpha" }))
            .to_request();
        let appended: AppendResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(appended.height, 1);

        let req = test::TestRequest::get().uri("/api/v1/chain/").to_request();
        let chain: ChainResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(chain.length, 2);
        assert_eq!(chain.current_hash, appended.hash);
        assert_eq!(chain.blocks[1].previous_hash, chain.blocks[0].hash);

        let req = test::TestRequest::get().uri("/api/v1/validate/").to_request();
        let valid: ValidateResponse = test::call_and_read_body_json(&app, req).await;
        assert!(valid.valid);
    }

    #[actix_web::test]
    async fn reads_do_not_wait_for_a_pending_append() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir);
        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .configure(init_routes),
        )
        .await;

        // an append in progress holds only the writer lock
        let _writer = state.writer.lock().unwrap();
        let req = test::TestRequest::get().uri("/api/v1/tip/").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
    }

    #[actix_web::test]
    async fn unknown_block_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let app = test::init_service(
            App::new()
                .app_data(state(&dir))
                .configure(init_routes),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/api/v1/blocks/nope/")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 404);
    }
}
