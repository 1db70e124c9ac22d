//! Phase 2: firmware generation from a hardware list and a goal.

use super::PhaseError;
use crate::llm::Generate;
use crate::session::SessionContext;
use serde::Deserialize;

pub const DEFAULT_HARDWARE: &str = "ESP32, DHT11 Sensor, OLED Display";
pub const DEFAULT_GOAL: &str = "Read temperature every 5 seconds and display on OLED.";

/// Form input for phase 2. Blank or missing fields take the defaults shown in the form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FirmwareRequest {
    #[serde(default)]
    pub hardware: Option<String>,
    #[serde(default)]
    pub goal: Option<String>,
}

impl FirmwareRequest {
    pub fn hardware(&self) -> &str {
        non_blank(self.hardware.as_deref()).unwrap_or(DEFAULT_HARDWARE)
    }

    pub fn goal(&self) -> &str {
        non_blank(self.goal.as_deref()).unwrap_or(DEFAULT_GOAL)
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

pub fn firmware_prompt(hardware: &str, goal: &str) -> String {
    format!(
        "Write complete Arduino C++ code for:\n\
         Hardware: {hardware}\n\
         Goal: {goal}\n\
         Include inline comments explaining each section and use power-saving techniques where the hardware allows."
    )
}

/// Generate firmware text; it is never compiled or checked. Stored verbatim on success.
pub async fn run_firmware(
    model: &dyn Generate,
    ctx: &mut SessionContext,
    req: &FirmwareRequest,
) -> Result<String, PhaseError> {
    let prompt = firmware_prompt(req.hardware(), req.goal());
    let text = model.generate(&prompt, None).await?;
    ctx.firmware_text = Some(text.clone());
    Ok(text)
}
