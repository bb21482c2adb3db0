use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct DailyVolumeStat {
    pub day: NaiveDate,
    pub impressions: i64,
    pub clicks: i64,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct CountryStat {
    pub country: Option<String>,
    pub impressions: i64,
    pub clicks: i64,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct ParcelCounts {
    pub impressions: i64,
    pub clicks: i64,
    pub conversions: i64,
}

/// Summary returned by GET /api/v1/analytics/parcels/:id.
#[derive(Debug, Serialize, Deserialize)]
pub struct ParcelSummary {
    pub parcel_id: u64,
    pub impressions: i64,
    pub clicks: i64,
    pub conversions: i64,
    /// clicks / impressions, 0.0 when no impressions were recorded.
    pub ctr: f64,
}

impl ParcelSummary {
    pub fn from_counts(parcel_id: u64, counts: ParcelCounts) -> Self {
        let ctr = if counts.impressions > 0 {
            counts.clicks as f64 / counts.impressions as f64
        } else {
            0.0
        };
        Self {
            parcel_id,
            impressions: counts.impressions,
            clicks: counts.clicks,
            conversions: counts.conversions,
            ctr,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ctr_is_zero_without_impressions() {
        let s = ParcelSummary::from_counts(
            1,
            ParcelCounts {
                impressions: 0,
                clicks: 0,
                conversions: 0,
            },
        );
        assert_eq!(s.ctr, 0.0);
    }

    #[test]
    fn test_ctr_ratio() {
        let s = ParcelSummary::from_counts(
            1,
            ParcelCounts {
                impressions: 200,
                clicks: 5,
                conversions: 1,
            },
        );
        assert!((s.ctr - 0.025).abs() < f64::EPSILON);
    }
}
