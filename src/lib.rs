pub mod api;
pub mod config;
pub mod database;
pub mod jobs;
pub mod services;
pub mod stocks;
pub mod upstream;

pub use api::{create_router, AppState};
pub use config::AppConfig;
pub use jobs::JobSupervisor;
pub use stocks::StocksService;
