use crate::database::connection::{DatabaseError, PgPooledConnection};
use crate::database::models::{ElectricityPrice, NewElectricityPrice};
use crate::database::schema::electricity_prices;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use std::sync::Arc;

/// Electricity price repository trait
#[async_trait::async_trait]
pub trait ElectricityRepository: Send + Sync {
    /// Upsert a batch of hourly prices in a single transaction
    async fn upsert_prices(&self, prices: Vec<NewElectricityPrice>)
        -> Result<usize, DatabaseError>;

    /// Latest stored end_time, if any - drives the freshness predicate
    async fn latest_end_time(&self) -> Result<Option<DateTime<Utc>>, DatabaseError>;

    /// Prices whose window overlaps [from, to), ordered by start_time
    async fn prices_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ElectricityPrice>, DatabaseError>;
}

/// Concrete implementation backed by diesel/PostgreSQL
pub struct ElectricityRepositoryImpl {
    get_conn: Arc<dyn Fn() -> Result<PgPooledConnection, DatabaseError> + Send + Sync>,
}

impl ElectricityRepositoryImpl {
    pub fn new<F>(get_conn: F) -> Self
    where
        F: Fn() -> Result<PgPooledConnection, DatabaseError> + Send + Sync + 'static,
    {
        Self {
            get_conn: Arc::new(get_conn),
        }
    }

    async fn run_blocking<T, F>(&self, f: F) -> Result<T, DatabaseError>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgPooledConnection) -> Result<T, DatabaseError> + Send + 'static,
    {
        let get_conn = Arc::clone(&self.get_conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = get_conn()?;
            f(&mut conn)
        })
        .await
        .map_err(|e| DatabaseError::TaskJoin(e.to_string()))?
    }
}

#[async_trait::async_trait]
impl ElectricityRepository for ElectricityRepositoryImpl {
    async fn upsert_prices(
        &self,
        prices: Vec<NewElectricityPrice>,
    ) -> Result<usize, DatabaseError> {
        if prices.is_empty() {
            return Ok(0);
        }

        self.run_blocking(move |conn| {
            conn.transaction::<_, DatabaseError, _>(|conn| {
                let mut count = 0;
                for price in prices {
                    diesel::insert_into(electricity_prices::table)
                        .values(&price)
                        .on_conflict(electricity_prices::start_time)
                        .do_update()
                        .set(&price)
                        .execute(conn)?;
                    count += 1;
                }
                Ok(count)
            })
        })
        .await
    }

    async fn latest_end_time(&self) -> Result<Option<DateTime<Utc>>, DatabaseError> {
        self.run_blocking(move |conn| {
            electricity_prices::table
                .select(electricity_prices::end_time)
                .order(electricity_prices::end_time.desc())
                .first::<DateTime<Utc>>(conn)
                .optional()
                .map_err(DatabaseError::from)
        })
        .await
    }

    async fn prices_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ElectricityPrice>, DatabaseError> {
        self.run_blocking(move |conn| {
            electricity_prices::table
                .filter(electricity_prices::end_time.gt(from))
                .filter(electricity_prices::start_time.lt(to))
                .order(electricity_prices::start_time.asc())
                .load::<ElectricityPrice>(conn)
                .map_err(DatabaseError::from)
        })
        .await
    }
}
