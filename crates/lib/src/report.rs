//! Plain-text report offered for download from the impact tab.

use crate::phases::ImpactMetrics;
use crate::session::SessionContext;

pub const REPAIR_REPORT_FILENAME: &str = "repair.txt";
pub const IMPACT_REPORT_FILENAME: &str = "Impact_Log.txt";

/// A rendered report and the filename the browser should save it under.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub filename: &'static str,
    pub body: String,
}

/// Filename the report downloads under; `None` until phase 1 has succeeded.
pub fn report_filename(ctx: &SessionContext) -> Option<&'static str> {
    if !ctx.phase1_complete() {
        return None;
    }
    Some(if ctx.impact.is_some() {
        IMPACT_REPORT_FILENAME
    } else {
        REPAIR_REPORT_FILENAME
    })
}

/// Diagnosis and code always; the impact section only once metrics exist. Unset fields render empty.
pub fn render_report(ctx: &SessionContext) -> Report {
    let mut body = format!(
        "PHOENIX-EYE REPORT\n\nDIAGNOSIS:\n{}\n\nCODE:\n{}",
        ctx.diagnosis_text.as_deref().unwrap_or(""),
        ctx.firmware_text.as_deref().unwrap_or("")
    );
    match ctx.impact {
        Some(ref m) => {
            body.push_str(&impact_section(m));
            Report {
                filename: IMPACT_REPORT_FILENAME,
                body,
            }
        }
        None => Report {
            filename: REPAIR_REPORT_FILENAME,
            body,
        },
    }
}

fn impact_section(m: &ImpactMetrics) -> String {
    format!(
        "\n\nIMPACT:\nE-Waste Diverted: {} g\nCO2 Emissions Saved: {} kg\nMoney Saved: ₹{}",
        m.ewaste_grams, m.co2_kg, m.cost_inr
    )
}
