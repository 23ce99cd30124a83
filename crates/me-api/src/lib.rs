//! # me-api
//!
//! The HTTP surface of MindEase: login and registration, the dashboard,
//! the task board with its focus timer, profile and settings.

pub mod error;
pub mod handlers;
pub mod middleware;

use actix_web::web;

/// Mounts every route. Paths not listed here answer 404 without a guard.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("")
            // Public pages
            .route("/login", web::get().to(handlers::login_page))
            .route("/login", web::post().to(handlers::login))
            .route("/register", web::get().to(handlers::register_page))
            .route("/register", web::post().to(handlers::register))
            .route("/logout", web::post().to(handlers::logout))
            // Dashboard
            .route("/", web::get().to(handlers::dashboard))
            // Timer and alert go before the `{id}` routes
            .route("/tasks/timer", web::get().to(handlers::timer_state))
            .route("/tasks/timer/{action}", web::post().to(handlers::timer_action))
            .route("/tasks/alert/dismiss", web::post().to(handlers::dismiss_alert))
            // Task board
            .route("/tasks", web::get().to(handlers::tasks_page))
            .route("/tasks", web::post().to(handlers::create_task))
            .route("/tasks/{id}", web::patch().to(handlers::change_status))
            .route("/tasks/{id}", web::delete().to(handlers::delete_task))
            .route("/tasks/{id}/steps", web::post().to(handlers::create_step))
            .route("/tasks/{id}/steps/{step}/toggle", web::post().to(handlers::toggle_step))
            .route("/tasks/{id}/steps/{step}", web::delete().to(handlers::delete_step))
            // Preferences
            .route("/profile", web::get().to(handlers::profile))
            .route("/settings", web::get().to(handlers::get_settings))
            .route("/settings", web::patch().to(handlers::update_settings))
            .default_service(web::to(handlers::not_found)),
    );
}
