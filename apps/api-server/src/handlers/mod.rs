//! HTTP handlers and route configuration.

mod health;
mod protection;
mod upstream;

use actix_web::web;

/// Configure all application routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            // Public routes
            .route("/health", web::get().to(health::health_check))
            .route("/upstream/{operation}", web::post().to(upstream::relay))
            // Admin routes, guarded per handler by AdminGuard
            .service(
                web::scope("/admin")
                    .route("/protection", web::get().to(protection::protection_stats))
                    .route("/protection/blocked", web::get().to(protection::list_blocked))
                    .route("/protection/ips/{ip}", web::get().to(protection::ip_statistics))
                    .route(
                        "/protection/ips/{ip}/block",
                        web::post().to(protection::block_ip),
                    )
                    .route(
                        "/protection/ips/{ip}/block",
                        web::delete().to(protection::unblock_ip),
                    )
                    .route("/upstream/usage", web::get().to(upstream::usage_stats)),
            ),
    );
}
