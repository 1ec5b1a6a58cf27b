use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One externally-synced public holiday (per country, per year).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicHoliday {
    pub date: NaiveDate,
    pub local_name: String,
    pub name: String,
}

/// Explicit cache for the public-holiday provider, keyed by (country, year).
/// Holidays are merged into calendar reads for display; they never block
/// booking except through the availability engine's closure pass.
#[derive(Clone)]
pub struct HolidayCache {
    base_url: String,
    client: reqwest::Client,
    entries: Arc<Mutex<HashMap<(String, i32), Vec<PublicHoliday>>>>,
}

impl HolidayCache {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            client: reqwest::Client::new(),
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn from_env() -> Self {
        let base_url = std::env::var("HOLIDAY_API_URL")
            .unwrap_or_else(|_| "https://date.nager.at/api/v3/PublicHolidays".to_string());
        Self::new(base_url)
    }

    /// Cached holidays for one country and year, fetching on first use. A
    /// provider failure is logged and yields an empty list for this call;
    /// nothing is cached so a later call retries.
    pub async fn holidays_for(&self, country: &str, year: i32) -> Vec<PublicHoliday> {
        let key = (country.to_string(), year);
        if let Some(cached) = self.lookup(&key) {
            return cached;
        }

        match self.fetch(country, year).await {
            Ok(holidays) => {
                self.put(key, holidays.clone());
                holidays
            }
            Err(err) => {
                log::warn!("holiday fetch failed for {country}/{year}: {err}");
                Vec::new()
            }
        }
    }

    pub fn invalidate(&self, country: &str, year: i32) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(&(country.to_string(), year));
        }
    }

    fn lookup(&self, key: &(String, i32)) -> Option<Vec<PublicHoliday>> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn put(&self, key: (String, i32), holidays: Vec<PublicHoliday>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key, holidays);
        }
    }

    async fn fetch(&self, country: &str, year: i32) -> Result<Vec<PublicHoliday>, reqwest::Error> {
        let url = format!("{}/{}/{}", self.base_url, year, country);
        let response = self.client.get(&url).send().await?.error_for_status()?;
        response.json::<Vec<PublicHoliday>>().await
    }
}
