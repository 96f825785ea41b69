mod electricity;
mod stock;
mod todo;

pub use electricity::{ElectricityPrice, NewElectricityPrice};
pub use stock::{
    NewStockPriceEntry, NewStockQuote, NewWatchlistSymbol, PricePoint, StockPriceEntry,
    StockQuote, SymbolHistory, WatchlistSymbol,
};
pub use todo::{CompletedTask, NewCompletedTask};
