//! `weather [city]`: current conditions from OpenWeatherMap, in Finnish.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use linkbot_sdk::bot::{Bot, Context};
use serde::Deserialize;

use crate::config::WeatherConfig;

pub const PLUGIN: &str = "weather";

const KELVIN_OFFSET: f64 = 273.15;

#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("weather request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("error - HTTP status code {0}")]
    Status(u16),
    #[error("unexpected weather response: {0}")]
    Decode(#[source] reqwest::Error),
}

/// The parts of the current-weather response we use.
#[derive(Debug, Clone, Deserialize)]
pub struct Report {
    pub name: String,
    pub main: Main,
    pub weather: Vec<Condition>,
    pub wind: Wind,
    pub sys: Sun,
    /// Seconds east of UTC for the city.
    #[serde(default)]
    pub timezone: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Main {
    /// Kelvin.
    pub temp: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Condition {
    pub id: u16,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Wind {
    pub speed: f64,
    pub deg: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Sun {
    pub sunrise: i64,
    pub sunset: i64,
}

pub struct Weather {
    http: reqwest::Client,
    config: WeatherConfig,
}

impl Weather {
    pub fn new(http: reqwest::Client, config: WeatherConfig) -> Self {
        Self { http, config }
    }

    /// Reply text for `weather <args>`; blank args mean the default city.
    pub async fn reply(&self, args: &str) -> String {
        let city = match args.trim() {
            "" => self.config.default_city.as_str(),
            city => city,
        };
        let Some(api_key) = self.config.api_key.as_deref() else {
            return "Weather API key is not configured".to_string();
        };
        match self.fetch(city, api_key).await {
            Ok(report) => format_report(&report),
            Err(e) => {
                tracing::info!(city, error = %e, "Weather lookup failed");
                format!("{city}: {e}")
            }
        }
    }

    pub async fn fetch(&self, city: &str, api_key: &str) -> Result<Report, WeatherError> {
        let resp = self
            .http
            .get(&self.config.endpoint)
            .query(&[("q", city), ("appid", api_key)])
            .send()
            .await
            .map_err(WeatherError::Request)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(WeatherError::Status(status.as_u16()));
        }
        resp.json::<Report>().await.map_err(WeatherError::Decode)
    }
}

/// Render a report as the chat line.
pub fn format_report(report: &Report) -> String {
    let temperature = report.main.temp - KELVIN_OFFSET;
    let description = report
        .weather
        .first()
        .map(|c| translate(c.id).map_or_else(|| c.description.clone(), str::to_string))
        .unwrap_or_default();
    let direction = report.wind.deg.and_then(wind_direction).unwrap_or("");
    let offset = FixedOffset::east_opt(report.timezone).unwrap_or(Utc.fix());

    format!(
        "{}: Lämpötila Herra Jesaja {:.1}°, {}, tuuli {}m/s {}. Aurinko nousee klo. {} ja laskee klo. {}.",
        report.name,
        temperature,
        description,
        report.wind.speed,
        direction,
        clock(report.sys.sunrise, offset),
        clock(report.sys.sunset, offset),
    )
}

fn clock(unix: i64, offset: FixedOffset) -> String {
    DateTime::from_timestamp(unix, 0)
        .map(|t| t.with_timezone(&offset).format("%H:%M").to_string())
        .unwrap_or_else(|| "?".to_string())
}

/// Finnish description for an OpenWeatherMap condition id.
pub fn translate(id: u16) -> Option<&'static str> {
    let text = match id {
        200 => "ukkosta ja kevyttä sadetta",
        201 => "ukkosta ja sadetta",
        202 => "ukkosta ja rankkasadetta",
        210 => "kevyttä ukkosta",
        211 => "ukkosta",
        212 => "voimakasta ukkosta",
        221 => "ukkoskuuroja",
        230 => "ukkosta ja kevyttä tihkusadetta",
        231 => "ukkosta ja tihkusadetta",
        232 => "ukkosta ja voimakasta tihkusadetta",
        300 => "kevyttä tihkusadetta",
        301 => "tihkusadetta",
        302 => "voimakasta tihkusadetta",
        310 => "kevyttä tihkusadetta ja sadetta",
        311 => "tihkusadetta ja sadetta",
        312 => "voimakasta tihkusadetta ja sadetta",
        321 => "tihkusadekuuroja",
        500 => "kevyttä sadetta",
        501 => "kohtalaista sadetta",
        502 => "voimakasta sadetta",
        503 => "rankkasadetta",
        504 => "erittäin voimakasta rankkasadetta",
        511 => "jäätävää sadetta",
        520 => "kevyitä sadekuuroja",
        521 => "sadekuuroja",
        522 => "voimakkaita sadekuuroja",
        600 => "kevyttä lumisadetta",
        601 => "lumisadetta",
        602 => "voimakasta lumisadetta",
        611 => "räntää",
        621 => "lumikuuroja",
        701 => "utua",
        711 => "savua",
        721 => "autereinen ilma",
        731 => "hiekka-/pölypyörteitä",
        741 => "sumua",
        800 => "taivas on kirkas",
        801 => "muutamia pilviä",
        802 => "hajanaisia pilviä",
        803 => "rikkinäisiä pilviä",
        804 => "pilvistä",
        900 => "tornado",
        901 => "trooppinen myrsky",
        902 => "hurrikaani",
        903 => "kylmää",
        904 => "kuumaa",
        905 => "tuulista",
        906 => "rakeita",
        950 => "tyyntyvää",
        951 => "tyyntä",
        952 => "kevyttä tuulta",
        953 => "lempeää tuulta",
        954 => "kohtalaista tuulta",
        955 => "raikasta tuulta",
        956 => "voimakasta tuulta",
        957 => "ajoittain navakkaa",
        958 => "navakkaa tuulta",
        959 => "erittäin navakkaa tuulta",
        960 => "myrsky",
        961 => "hirmumyrsky",
        962 => "hurrikaani",
        _ => return None,
    };
    Some(text)
}

/// Sixteen-point compass direction the wind blows from, in Finnish.
/// `None` outside 0–360 degrees.
pub fn wind_direction(degrees: f64) -> Option<&'static str> {
    const SECTORS: [&str; 15] = [
        "pohjoiskoillisesta",
        "koillisesta",
        "itäkoillisesta",
        "idästä",
        "itäkaakosta",
        "kaakosta",
        "eteläkaakosta",
        "etelästä",
        "etelälounaasta",
        "lounaasta",
        "länsilounaasta",
        "lännestä",
        "länsiluoteesta",
        "luoteesta",
        "pohjoisluoteesta",
    ];
    if !(0.0..=360.0).contains(&degrees) {
        return None;
    }
    if degrees <= 11.25 || degrees >= 348.75 {
        return Some("pohjoisesta");
    }
    // Sector upper bounds are inclusive: 33.75 is still north-northeast.
    let index = ((degrees - 11.25) / 22.5).ceil() as usize - 1;
    SECTORS.get(index).copied()
}

/// Register the `weather` command with the bot.
pub fn register(bot: &mut Bot, plugin: Arc<Weather>) {
    bot.command(PLUGIN, "Current weather for [city]", move |ctx: Context| {
        let plugin = plugin.clone();
        Box::pin(async move { Ok(Some(plugin.reply(&ctx.args).await)) })
    });
}
