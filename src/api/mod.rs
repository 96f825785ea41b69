pub mod electricity_handlers;
pub mod handlers;
pub mod monitor_handlers;
pub mod openapi;
pub mod responses;
pub mod routes;
pub mod stock_handlers;
pub mod todo_handlers;
pub mod weather_handlers;

pub use handlers::AppState;
pub use routes::create_router;
