/// Development mode: replay stored observations instead of calling the API.
///
/// Observations saved by `store_observations` (see `airmon backfill`) are
/// read back from `air_quality.observations` as if `days_offset` days had
/// not yet passed: the lookback window is moved into the past and the
/// returned timestamps are shifted forward by the same amount, so the
/// forecast always continues from "now".

use chrono::{DateTime, Duration, Utc};
use postgres::{Client, NoTls};
use std::sync::Mutex;

use crate::facilities::{Facility, POLLUTANTS};
use crate::ingest::HistoryProvider;
use crate::logging::{self, DataSource};
use crate::model::{HistoryError, Observation};

/// Environment variable holding the replay database URL.
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

fn db_error(err: postgres::Error) -> HistoryError {
    HistoryError::Database(err.to_string())
}

pub struct DevMode {
    /// Replay data from this many days ago.
    pub days_offset: i64,
    client: Mutex<Client>,
}

impl DevMode {
    pub fn new(client: Client, days_offset: i64) -> Self {
        Self {
            days_offset,
            client: Mutex::new(client),
        }
    }

    pub fn connect(database_url: &str, days_offset: i64) -> Result<Self, HistoryError> {
        let client = Client::connect(database_url, NoTls).map_err(db_error)?;
        Ok(Self::new(client, days_offset))
    }

    fn offset(&self) -> Duration {
        Duration::days(self.days_offset)
    }

    /// Stored observations for the `lookback_hours` before `now - days_offset`,
    /// re-stamped to end at `now`.
    pub fn get_history_at(
        &self,
        facility: &Facility,
        pollutants: &[&str],
        lookback_hours: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<Observation>, HistoryError> {
        let simulated_now = now - self.offset();
        let window_start = simulated_now - Duration::hours(i64::from(lookback_hours));
        let codes: Vec<String> = if pollutants.is_empty() {
            POLLUTANTS.iter().map(|p| p.to_string()).collect()
        } else {
            pollutants.iter().map(|p| p.to_string()).collect()
        };

        let query = "
            SELECT observed_at, pollutant, value
            FROM air_quality.observations
            WHERE facility = $1
              AND pollutant = ANY($2)
              AND observed_at > $3
              AND observed_at <= $4
            ORDER BY observed_at, pollutant
        ";

        let mut client = self
            .client
            .lock()
            .map_err(|_| HistoryError::Database("replay connection poisoned".to_string()))?;
        let rows = client
            .query(query, &[&facility.name, &codes, &window_start, &simulated_now])
            .map_err(db_error)?;

        let observations: Vec<Observation> = rows
            .iter()
            .map(|row| Observation {
                timestamp: row.get::<_, DateTime<Utc>>(0) + self.offset(),
                pollutant: row.get(1),
                value: row.get(2),
            })
            .collect();

        logging::debug(
            DataSource::Database,
            Some(facility.name),
            &format!(
                "replayed {} observations from {} to {}",
                observations.len(),
                window_start.format("%Y-%m-%d %H:%M"),
                simulated_now.format("%Y-%m-%d %H:%M")
            ),
        );
        Ok(observations)
    }

    /// Earliest and latest stored observation for a facility.
    pub fn get_data_range(
        client: &mut Client,
        facility: &Facility,
    ) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>, HistoryError> {
        let row = client
            .query_one(
                "SELECT MIN(observed_at), MAX(observed_at)
                 FROM air_quality.observations
                 WHERE facility = $1",
                &[&facility.name],
            )
            .map_err(db_error)?;

        let min: Option<DateTime<Utc>> = row.get(0);
        let max: Option<DateTime<Utc>> = row.get(1);

        match (min, max) {
            (Some(start), Some(end)) => Ok(Some((start, end))),
            _ => Ok(None),
        }
    }
}

impl HistoryProvider for DevMode {
    fn get_history(
        &self,
        facility: &Facility,
        pollutants: &[&str],
        lookback_hours: u32,
    ) -> Result<Vec<Observation>, HistoryError> {
        self.get_history_at(facility, pollutants, lookback_hours, Utc::now())
    }
}

/// Insert observations for later replay. Rows already present for the same
/// `(facility, pollutant, observed_at)` are left untouched.
///
/// Returns the number of newly inserted rows.
pub fn store_observations(
    client: &mut Client,
    facility: &Facility,
    observations: &[Observation],
) -> Result<u64, HistoryError> {
    let mut tx = client.transaction().map_err(db_error)?;
    let stmt = tx
        .prepare(
            "INSERT INTO air_quality.observations (facility, pollutant, observed_at, value)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (facility, pollutant, observed_at) DO NOTHING",
        )
        .map_err(db_error)?;

    let mut inserted = 0;
    for obs in observations {
        inserted += tx
            .execute(&stmt, &[&facility.name, &obs.pollutant, &obs.timestamp, &obs.value])
            .map_err(db_error)?;
    }
    tx.commit().map_err(db_error)?;

    logging::info(
        DataSource::Database,
        Some(facility.name),
        &format!(
            "stored {} new of {} observations",
            inserted,
            observations.len()
        ),
    );
    Ok(inserted)
}
