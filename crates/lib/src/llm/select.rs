//! Priority-ordered model selection over the listed models.

use super::gemini::{model_path, GeminiModel};

/// Pick the first `priority` entry present in `available`; else the first available; else none.
/// Both sides are compared in canonical `models/<id>` form. Priority order always wins over list order.
pub fn select_model<P, A>(priority: &[P], available: &[A]) -> Option<String>
where
    P: AsRef<str>,
    A: AsRef<str>,
{
    let available: Vec<String> = available.iter().map(|a| model_path(a.as_ref())).collect();
    priority
        .iter()
        .map(|p| model_path(p.as_ref()))
        .find(|p| available.contains(p))
        .or_else(|| available.first().cloned())
}

/// Names of models that support generateContent, in listing order.
pub fn generation_capable(models: &[GeminiModel]) -> Vec<String> {
    models
        .iter()
        .filter(|m| m.supports_generate_content())
        .map(|m| m.name.clone())
        .collect()
}
