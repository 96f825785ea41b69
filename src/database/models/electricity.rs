use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One hour of electricity spot pricing
///
/// Keyed by start_time; the upstream publishes each hour exactly once
/// so upserting by start_time merges repeated fetches cleanly.
#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize, Deserialize, ToSchema)]
#[diesel(table_name = crate::database::schema::electricity_prices)]
#[diesel(primary_key(start_time))]
pub struct ElectricityPrice {
    /// Hour start (stored UTC, published in Europe/Helsinki)
    pub start_time: DateTime<Utc>,

    /// Hour end
    pub end_time: DateTime<Utc>,

    /// Spot price in c/kWh
    pub price: f64,
}

/// New price row for upsert
#[derive(Debug, Clone, Insertable, AsChangeset, Serialize, Deserialize, ToSchema)]
#[diesel(table_name = crate::database::schema::electricity_prices)]
pub struct NewElectricityPrice {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub price: f64,
}
