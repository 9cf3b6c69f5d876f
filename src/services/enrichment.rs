use std::sync::Arc;

use crate::models::GeoPoint;
use crate::services::gemini::GenerativeModel;
use crate::services::grounding::GroundingService;

/// Post-index enrichment: human-facing summary strings patched onto the
/// canonical apartment document. All of it is best-effort.
pub struct EnrichmentService {
    model: Arc<dyn GenerativeModel>,
    grounding: Arc<GroundingService>,
}

impl EnrichmentService {
    pub fn new(model: Arc<dyn GenerativeModel>, grounding: Arc<GroundingService>) -> Self {
        Self { model, grounding }
    }

    pub async fn generate_property_summary(&self, description: &str, image_descriptions: &[String]) -> String {
        let prompt = property_summary_prompt(description, image_descriptions);
        match self.model.generate_text(&prompt, 0.3).await {
            Ok(summary) => {
                let summary = clean_summary(&summary);
                tracing::info!(target: "enrichment", chars = summary.len(), "generated property summary");
                summary
            }
            Err(e) => {
                tracing::error!(target: "enrichment", error = %e, "property summary generation failed");
                String::new()
            }
        }
    }

    pub async fn generate_title(&self, description: &str, address: Option<&str>) -> String {
        let prompt = title_prompt(description, address);
        match self.model.generate_text(&prompt, 0.4).await {
            Ok(title) => {
                let title = title.trim().trim_matches('"').trim_matches('\'').to_string();
                tracing::info!(target: "enrichment", title = %title, "generated title");
                title
            }
            Err(e) => {
                tracing::error!(target: "enrichment", error = %e, "title generation failed");
                String::new()
            }
        }
    }

    pub async fn generate_location_summary(&self, location: GeoPoint, address: &str) -> (String, Option<String>) {
        match self.grounding.generate_location_description(location, address).await {
            Ok((summary, widget_token)) => (clean_summary(&summary), widget_token),
            Err(e) => {
                tracing::error!(target: "enrichment", error = %e, "location summary generation failed");
                (String::new(), None)
            }
        }
    }
}

// Strip conversational prefaces models sometimes emit despite instructions.
fn clean_summary(summary: &str) -> String {
    const UNWANTED_PREFIXES: &[&str] = &[
        "of course.",
        "here is",
        "here's",
        "certainly.",
        "sure.",
        "absolutely.",
        "i'd be happy to",
        "let me",
    ];

    summary
        .lines()
        .filter(|line| {
            let lower = line.trim().to_lowercase();
            if lower.is_empty() {
                return false;
            }
            if UNWANTED_PREFIXES.iter().any(|prefix| lower.starts_with(prefix)) {
                return false;
            }
            if lower.contains("summary") && line.contains(':') {
                return false;
            }
            true
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn property_summary_prompt(description: &str, image_descriptions: &[String]) -> String {
    let image_context = if image_descriptions.is_empty() {
        String::new()
    } else {
        let numbered: Vec<String> = image_descriptions
            .iter()
            .filter(|d| !d.is_empty())
            .enumerate()
            .map(|(i, d)| format!("{}. {}", i + 1, d))
            .collect();
        format!("\n\nImage descriptions:\n{}", numbered.join("\n"))
    };

    format!(
        r#"Write a luxury property summary. Return ONLY the summary text, no preamble or meta-commentary.

Style requirements:
- Luxury hospitality tone (sophisticated, inviting, aspirational)
- 3-5 sentences, 150-250 words
- Evocative language emphasizing experience and lifestyle
- Flow like a boutique hotel description

Property details:
{description}
{image_context}

Return ONLY the property summary, starting immediately with the description:"#
    )
}

fn title_prompt(description: &str, address: Option<&str>) -> String {
    let address_line = address.map(|a| format!("Address: {}", a)).unwrap_or_default();
    format!(
        r#"Generate a short, compelling property title (5-8 words maximum) for this apartment.

Property description:
{description}

{address_line}

Style:
- Professional and descriptive
- Include key feature (e.g., "Loft", "Penthouse", "Studio")
- Include location if notable (e.g., "Williamsburg", "SoHo")
- Examples: "Stunning Williamsburg Loft", "Modern SoHo Penthouse", "Bright Studio in Chelsea"

Return ONLY the title, nothing else:"#
    )
}
