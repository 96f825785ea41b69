mod electricity_repository;
mod stock_repository;
mod todo_repository;

pub use electricity_repository::{ElectricityRepository, ElectricityRepositoryImpl};
pub use stock_repository::{StockRepository, StockRepositoryImpl};
pub use todo_repository::{TodoRepository, TodoRepositoryImpl};
