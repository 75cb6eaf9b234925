// Route exports
pub mod shares;

use actix_web::web;

pub use shares::AppState;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .configure(shares::configure),
    );
}
