pub mod forecasts;
pub mod health;
pub mod settings;
pub mod sync;
