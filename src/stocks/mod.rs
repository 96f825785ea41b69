pub mod cache;
pub mod interval;
pub mod provider;
pub mod quota;
pub mod service;
pub mod session;

pub use interval::Interval;
pub use provider::{MarketDataProvider, TwelveDataProvider};
pub use quota::{QuotaConfig, QuotaGuard};
pub use service::{StalenessPolicy, StocksError, StocksService};
pub use session::MarketCalendar;
