/// Hazard evaluation for forecasts and current readings.

pub mod thresholds;
