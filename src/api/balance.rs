use actix_web::{HttpResponse, Responder, ResponseError, get, web};

use super::models::{AppState, BalanceResponse, UtxoEntry, UtxoResponse};

/// Every unspent output, recomputed from a full chain scan.
#[get("/utxo/")]
pub async fn get_utxo(state: web::Data<AppState>) -> impl Responder {
    let utxo = {
        let bc = state.blockchain.lock().expect("mutex poisoned");
        match bc.find_unspent() {
            Ok(utxo) => utxo,
            Err(e) => return e.error_response(),
        }
    };

    let mut outputs: Vec<UtxoEntry> = utxo
        .iter()
        .map(|(op, out)| UtxoEntry {
            txid: op.txid.clone(),
            vout: op.vout,
            value: out.value,
            lock_script: out.lock_script.clone(),
        })
        .collect();
    outputs.sort_by(|a, b| a.txid.cmp(&b.txid).then(a.vout.cmp(&b.vout)));

    HttpResponse::Ok().json(UtxoResponse {
        size: outputs.len(),
        outputs,
    })
}

#[get("/balance/{address}/")]
pub async fn get_balance(state: web::Data<AppState>, path: web::Path<(String,)>) -> impl Responder {
    let address = path.into_inner().0;

    let utxo = {
        let bc = state.blockchain.lock().expect("mutex poisoned");
        match bc.find_unspent() {
            Ok(utxo) => utxo,
            Err(e) => return e.error_response(),
        }
    };

    let count = utxo
        .iter()
        .filter(|(_, out)| out.can_be_unlocked_with(&address))
        .count();

    HttpResponse::Ok().json(BalanceResponse {
        balance: utxo.balance(&address),
        utxos: count,
        address,
    })
}
