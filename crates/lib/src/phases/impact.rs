//! Phase 3: sustainability impact estimation from the stored diagnosis.
//!
//! The reply is parsed strictly in either shape; anything that does not yield all three
//! numbers is an error and nothing is stored.

use super::PhaseError;
use crate::config::{ImpactConfig, ImpactReplyFormat};
use crate::llm::Generate;
use crate::session::SessionContext;
use serde::{Deserialize, Serialize};

/// E-waste diverted, CO2 avoided and money saved by repairing instead of replacing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactMetrics {
    pub ewaste_grams: i64,
    pub co2_kg: f64,
    pub cost_inr: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum ImpactParseError {
    #[error("reply is not a valid impact object: {0}")]
    Json(#[from] serde_json::Error),
    #[error("reply has no {0} field")]
    MissingKey(&'static str),
    #[error("{key} is not a number: {value:?}")]
    InvalidNumber { key: &'static str, value: String },
}

#[derive(Debug, Deserialize)]
struct ImpactReply {
    ewaste_saved_g: i64,
    co2_saved_kg: f64,
    cost_saved_inr: i64,
}

/// Raw value slices of a `Waste: .., CO2: .., Money: ..` reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValueSlices {
    pub waste: String,
    pub co2: String,
    pub money: String,
}

const WASTE_KEY: &str = "Waste:";
const CO2_KEY: &str = "CO2:";
const MONEY_KEY: &str = "Money:";

pub fn impact_prompt(diagnosis: &str, prefix_chars: usize, format: ImpactReplyFormat) -> String {
    let prefix: String = diagnosis.chars().take(prefix_chars).collect();
    let shape = match format {
        ImpactReplyFormat::Json => {
            "Reply with only a JSON object with exactly these keys: \
             \"ewaste_saved_g\" (integer, grams of electronic waste diverted from landfill), \
             \"co2_saved_kg\" (number, kilograms of CO2 emissions avoided), \
             \"cost_saved_inr\" (integer, money saved in Indian Rupees). No other text."
        }
        ImpactReplyFormat::KeyValue => {
            "Reply with one line in exactly this format and nothing else: \
             Waste: <grams>, CO2: <kilograms>, Money: <rupees>"
        }
    };
    format!(
        "Based on this hardware diagnosis: \"{prefix}\"\n\
         Estimate the environmental impact of repairing this device instead of replacing it.\n\
         {shape}"
    )
}

/// Remove a surrounding markdown code fence (``` or ```json) if the reply has one.
pub fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(open) = trimmed.find("```") else {
        return trimmed;
    };
    let after_open = &trimmed[open + 3..];
    // Skip the info string (e.g. "json") up to the end of the fence line.
    let body = match after_open.find('\n') {
        Some(nl) => &after_open[nl + 1..],
        None => after_open.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };
    match body.find("```") {
        Some(close) => body[..close].trim(),
        None => body.trim(),
    }
}

/// Strict parse of the JSON reply shape, fenced or bare.
pub fn parse_impact_json(reply: &str) -> Result<ImpactMetrics, ImpactParseError> {
    let value: serde_json::Value = serde_json::from_str(strip_code_fence(reply))?;
    for key in ["ewaste_saved_g", "co2_saved_kg", "cost_saved_inr"] {
        if value.get(key).is_none() {
            return Err(ImpactParseError::MissingKey(key));
        }
    }
    let parsed: ImpactReply = serde_json::from_value(value)?;
    Ok(ImpactMetrics {
        ewaste_grams: parsed.ewaste_saved_g,
        co2_kg: parsed.co2_saved_kg,
        cost_inr: parsed.cost_saved_inr,
    })
}

fn slice_after<'a>(reply: &'a str, key: &'static str) -> Result<&'a str, ImpactParseError> {
    let start = reply.find(key).ok_or(ImpactParseError::MissingKey(key))? + key.len();
    let rest = &reply[start..];
    let end = rest.find(',').unwrap_or(rest.len());
    Ok(rest[..end].trim())
}

/// Slice each value after its key up to the next comma (or end of reply).
pub fn slice_key_values(reply: &str) -> Result<KeyValueSlices, ImpactParseError> {
    Ok(KeyValueSlices {
        waste: slice_after(reply, WASTE_KEY)?.to_string(),
        co2: slice_after(reply, CO2_KEY)?.to_string(),
        money: slice_after(reply, MONEY_KEY)?.to_string(),
    })
}

fn number<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ImpactParseError> {
    value.parse().map_err(|_| ImpactParseError::InvalidNumber {
        key,
        value: value.to_string(),
    })
}

/// Parse the key-value reply shape. Any missing key or non-numeric value is an error.
pub fn parse_impact_key_values(reply: &str) -> Result<ImpactMetrics, ImpactParseError> {
    let s = slice_key_values(strip_code_fence(reply))?;
    Ok(ImpactMetrics {
        ewaste_grams: number(WASTE_KEY, &s.waste)?,
        co2_kg: number(CO2_KEY, &s.co2)?,
        cost_inr: number(MONEY_KEY, &s.money)?,
    })
}

pub fn parse_impact_reply(
    format: ImpactReplyFormat,
    reply: &str,
) -> Result<ImpactMetrics, ImpactParseError> {
    match format {
        ImpactReplyFormat::Json => parse_impact_json(reply),
        ImpactReplyFormat::KeyValue => parse_impact_key_values(reply),
    }
}

/// Estimate impact for the session's diagnosis. Requires phase 1; stores metrics only on a full parse.
pub async fn run_impact(
    model: &dyn Generate,
    ctx: &mut SessionContext,
    config: &ImpactConfig,
) -> Result<ImpactMetrics, PhaseError> {
    let Some(diagnosis) = ctx.diagnosis_text.as_deref() else {
        return Err(PhaseError::DiagnosisRequired);
    };
    let prompt = impact_prompt(diagnosis, config.diagnosis_prefix_chars, config.reply_format);
    let reply = model.generate(&prompt, None).await?;
    let metrics = match parse_impact_reply(config.reply_format, &reply) {
        Ok(m) => m,
        Err(e) => {
            log::warn!("impact reply did not parse: {}", e);
            return Err(e.into());
        }
    };
    ctx.impact = Some(metrics.clone());
    Ok(metrics)
}
