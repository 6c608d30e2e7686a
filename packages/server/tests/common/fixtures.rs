//! Test fixtures for creating transfer-pipeline test data.

use chrono::NaiveDate;
use transfer_core::domains::transfer::clients::Activity;

pub fn sample_activity(source_id: &str, sport_code: i32) -> Activity {
    Activity {
        source_id: source_id.to_string(),
        sport_code,
        name: Some("Morning Run".to_string()),
        start_time: Some("2024-01-15 08:30:00".to_string()),
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}
