/// Turning raw observations into forecasts.
///
/// - `series` resamples observations onto a gap-free hourly grid.
/// - `sarima` fits the seasonal model and produces interval forecasts.

pub mod sarima;
pub mod series;
