//! Presentation helpers for stored forecast values.
//!
//! Maps OpenWeatherMap condition ids to a short description and one of a
//! small set of icon names, and formats wind bearings as compass points.

use serde::Serialize;
use utoipa::ToSchema;

/// Icon family for a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConditionIcon {
    Storm,
    LightRain,
    Rain,
    Snow,
    Fog,
    Clear,
    LightClouds,
    Cloudy,
    Unknown,
}

pub fn icon_for(condition_id: i32) -> ConditionIcon {
    match condition_id {
        200..=232 => ConditionIcon::Storm,
        300..=321 => ConditionIcon::LightRain,
        500..=504 => ConditionIcon::Rain,
        511 => ConditionIcon::Snow,
        520..=531 => ConditionIcon::Rain,
        600..=622 => ConditionIcon::Snow,
        701..=761 => ConditionIcon::Fog,
        762 | 771 | 781 => ConditionIcon::Storm,
        800 => ConditionIcon::Clear,
        801 => ConditionIcon::LightClouds,
        802..=804 => ConditionIcon::Cloudy,
        _ => ConditionIcon::Unknown,
    }
}

pub fn description_for(condition_id: i32) -> &'static str {
    match condition_id {
        200..=202 | 230..=232 => "Thunderstorm with rain",
        210..=221 => "Thunderstorm",
        300..=321 => "Drizzle",
        500 => "Light rain",
        501 => "Moderate rain",
        502..=504 => "Heavy rain",
        511 => "Freezing rain",
        520..=531 => "Showers",
        600 => "Light snow",
        601 => "Snow",
        602 => "Heavy snow",
        611..=616 => "Sleet",
        620..=622 => "Snow showers",
        701 => "Mist",
        711 => "Smoke",
        721 => "Haze",
        731 | 751 | 761 => "Dust",
        741 => "Fog",
        762 => "Volcanic ash",
        771 => "Squalls",
        781 => "Tornado",
        800 => "Clear sky",
        801 => "Few clouds",
        802 => "Scattered clouds",
        803 => "Broken clouds",
        804 => "Overcast",
        _ => "Unknown",
    }
}

const COMPASS_POINTS: [&str; 8] = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];

/// Eight-point compass direction for a bearing in degrees.
pub fn compass_point(degrees: f64) -> &'static str {
    let normalized = degrees.rem_euclid(360.0);
    // Sectors are 45° wide, centred on each point
    let sector = ((normalized + 22.5) / 45.0) as usize % COMPASS_POINTS.len();
    COMPASS_POINTS[sector]
}
