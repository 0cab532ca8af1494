// utils/dates.rs
//! Dates reçues sous deux formes : un objet `{ "_seconds": N }` (horodatage
//! Unix, `_nanoseconds` optionnel) ou une chaîne ISO-8601 (date seule ou
//! date-heure). Les deux formes sont ramenées au même instant UTC.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serializer};

/// Représentation brute d'une date telle qu'elle arrive sur le réseau.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawDate {
    Timestamp {
        #[serde(rename = "_seconds")]
        seconds: i64,
        #[serde(rename = "_nanoseconds", default)]
        nanoseconds: u32,
    },
    Text(String),
}

impl RawDate {
    /// Convertit en instant UTC, `None` si la chaîne n'est pas reconnue.
    pub fn to_utc(&self) -> Option<DateTime<Utc>> {
        match self {
            RawDate::Timestamp { seconds, nanoseconds } => {
                Utc.timestamp_opt(*seconds, *nanoseconds).single()
            }
            RawDate::Text(text) => parse_date_str(text),
        }
    }
}

/// Parse une date ISO-8601 (`2024-01-15`, `2024-01-15T15:00:00Z`, ...) ou
/// au format français `15/01/2024`.
pub fn parse_date_str(input: &str) -> Option<DateTime<Utc>> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    for format in ["%Y-%m-%d", "%d/%m/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(input, format) {
            return date.and_hms_opt(0, 0, 0).map(|naive| Utc.from_utc_datetime(&naive));
        }
    }

    None
}

/// Format d'affichage `jj/mm/aaaa`.
pub fn format_date(date: &DateTime<Utc>) -> String {
    date.format("%d/%m/%Y").to_string()
}

/// Formate une valeur JSON brute (objet horodaté ou chaîne), `None` si illisible.
pub fn format_value(value: &serde_json::Value) -> Option<String> {
    serde_json::from_value::<RawDate>(value.clone())
        .ok()
        .and_then(|raw| raw.to_utc())
        .map(|date| format_date(&date))
}

/// Formate une date stockée sous forme de chaîne ; la chaîne est rendue
/// telle quelle si elle n'est pas reconnue comme date.
pub fn format_date_str(input: &str) -> String {
    parse_date_str(input)
        .map(|date| format_date(&date))
        .unwrap_or_else(|| input.to_string())
}

/// Sérialisation RFC 3339, désérialisation tolérante (`{_seconds}` ou ISO).
pub mod flexible {
    use super::*;

    pub fn serialize<S: Serializer>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&date.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = RawDate::deserialize(deserializer)?;
        raw.to_utc()
            .ok_or_else(|| serde::de::Error::custom(format!("date invalide: {:?}", raw)))
    }
}

/// Variante optionnelle de [`flexible`].
pub mod flexible_option {
    use super::*;

    pub fn serialize<S: Serializer>(date: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error> {
        match date {
            Some(date) => serializer.serialize_some(&date.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = Option::<RawDate>::deserialize(deserializer)?;
        match raw {
            None => Ok(None),
            Some(raw) => raw
                .to_utc()
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("date invalide: {:?}", raw))),
        }
    }
}

/// Pour les champs date des formulaires : accepte une chaîne (conservée,
/// espaces retirés), un objet horodaté (ramené à `aaaa-mm-jj`) ou `null`.
pub fn lenient_date_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let raw = Option::<RawDate>::deserialize(deserializer)?;
    Ok(match raw {
        None => String::new(),
        Some(RawDate::Text(text)) => text.trim().to_string(),
        Some(timestamp) => timestamp
            .to_utc()
            .map(|date| date.format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
    })
}

/// Variante optionnelle de [`lenient_date_string`] : une chaîne vide devient `None`.
pub fn lenient_date_option<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = lenient_date_string(deserializer)?;
    Ok(if value.is_empty() { None } else { Some(value) })
}
