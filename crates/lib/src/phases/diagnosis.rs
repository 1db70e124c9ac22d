//! Phase 1: visual diagnosis of an uploaded board photo.

use super::PhaseError;
use crate::llm::Generate;
use crate::session::SessionContext;
use crate::upload::UploadedImage;

pub const DIAGNOSIS_PROMPT: &str = "You are an expert Electronics Repair Engineer. Analyze this circuit board image.
1. LIST COMPONENTS: Identify visible chips, sensors, or connectors.
2. DETECT FAULTS: Look closely for cold solder joints, burnt marks, broken traces, or corrosion.
3. REPAIR INSTRUCTION: Give a specific technical instruction to fix it.
4. STATUS: Output 'Repairable' or 'Irreparable'.";

/// Send the photo with the fixed prompt; on success store the reply verbatim as the diagnosis.
/// The reply is not checked for the four requested sections.
pub async fn run_diagnosis(
    model: &dyn Generate,
    ctx: &mut SessionContext,
    image: &UploadedImage,
) -> Result<String, PhaseError> {
    log::debug!(
        "diagnosis: {}x{} {} ({} bytes)",
        image.width,
        image.height,
        image.mime_type,
        image.bytes.len()
    );
    let text = model.generate(DIAGNOSIS_PROMPT, Some(image)).await?;
    ctx.diagnosis_text = Some(text.clone());
    Ok(text)
}
