pub mod electricity;
pub mod network;
pub mod sensor;
pub mod todoist;
pub mod transit;
pub mod weather;

pub use electricity::{ElectricityError, ElectricityService};
pub use network::{NetworkHealth, NetworkMonitor};
pub use sensor::{MockSensorSource, SensorPoller, SensorReading, SensorSource, TelemetryCell};
pub use todoist::{TodoError, TodoTask, TodoistService};
pub use transit::{Departure, StopDepartures, TransitService};
pub use weather::{CurrentWeather, Location, WeatherError, WeatherService};
