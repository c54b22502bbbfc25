mod balance;
mod chain;
pub mod models;

use actix_web::web::{self, ServiceConfig};

pub use models::AppState;

pub fn init_routes(cfg: &mut ServiceConfig) {
    cfg.service(chain::health_check).service(
        web::scope("/api/v1")
            .service(chain::get_chain)
            .service(chain::get_block)
            .service(chain::get_tip)
            .service(chain::append_block)
            .service(chain::validate_chain)
            .service(balance::get_utxo)
            .service(balance::get_balance),
    );
}
