//! Prompt construction and response parsing shared by all adapters.
//!
//! Every provider speaks the same JSON contract: generation returns a
//! `{"questions": [...]}` object, validation a single verdict object. The
//! prompts are Swedish because the generated content is Swedish-first.

use serde::Deserialize;

use super::{GenerationRequest, ProviderVerdict};
use crate::error::ProviderError;
use crate::questions::model::{Candidate, ProposedEdits, Provenance, QuestionRow};

const AVOID_LIST_CAP: usize = 50;

fn age_group_description(age_group: &str) -> &'static str {
    match age_group {
        "children" => "barn (6-12 år, enkla och roliga frågor anpassade för barn)",
        "youth" => "ungdomar (13-25 år, moderna frågor om populärkultur, idrott och aktuella trender)",
        _ => "vuxna (25+ år, utmanande frågor om samhälle, historia, kultur och vetenskap)",
    }
}

/// System prompt for a generation call.
pub fn generation_system_prompt(request: &GenerationRequest) -> String {
    let criteria = &request.criteria;
    let audience_context = if criteria.target_audience.eq_ignore_ascii_case("swedish") {
        "Frågorna ska ha svensk kontext (svenska förhållanden, svensk geografi, svensk kultur)."
    } else {
        "Frågorna ska ha internationellt perspektiv."
    };

    let mut prompt = format!(
        "Du är en expert på att skapa quizfrågor. Generera {amount} flervalsfrågor på både svenska och engelska.\n\n\
         Krav:\n\
         - Varje fråga ska ha exakt 4 svarsalternativ\n\
         - Endast ett korrekt svar\n\
         - Inkludera en kort förklaring till det korrekta svaret\n\
         - Alla frågor ska handla om kategorin: {category}\n\
         - Frågorna ska passa för: {age_group}\n\
         - Svårighetsgrad: {difficulty}\n\
         - {audience_context}\n\
         - Undvik kontroversiella eller stötande ämnen\n\
         - Gör frågorna tydliga och entydiga\n\
         - Perfekt stavning och grammatik är KRITISKT viktigt\n",
        amount = request.batch_size,
        category = criteria.category,
        age_group = age_group_description(&criteria.age_group),
        difficulty = criteria.difficulty,
    );

    if !request.freshness_guidance.is_empty() {
        prompt.push_str(&format!("- {}\n", request.freshness_guidance));
    }

    if !request.avoid_texts.is_empty() {
        prompt.push_str("\nSkapa INTE frågor som liknar dessa befintliga frågor:\n");
        for text in request.avoid_texts.iter().take(AVOID_LIST_CAP) {
            prompt.push_str(&format!("- {text}\n"));
        }
    }

    prompt.push_str(
        "\nSvara ENDAST med giltig JSON med denna exakta struktur:\n\
         {\n  \"questions\": [\n    {\n      \"question_sv\": \"Vilken är Sveriges huvudstad?\",\n      \
         \"question_en\": \"What is the capital of Sweden?\",\n      \
         \"options_sv\": [\"Stockholm\", \"Göteborg\", \"Malmö\", \"Uppsala\"],\n      \
         \"options_en\": [\"Stockholm\", \"Gothenburg\", \"Malmö\", \"Uppsala\"],\n      \
         \"correct_option\": 0,\n      \
         \"explanation_sv\": \"Stockholm är Sveriges huvudstad.\",\n      \
         \"explanation_en\": \"Stockholm is the capital of Sweden.\",\n      \
         \"emoji\": \"🏛️\",\n      \
         \"time_sensitive\": false,\n      \
         \"best_before_date\": null\n    }\n  ]\n}\n\n\
         Viktigt:\n\
         - correct_option är 0-indexerad och gäller båda språken\n\
         - time_sensitive är true för frågor vars svar kan ändras över tid; \
         sätt då best_before_date till \"ÅÅÅÅ-MM-DD\"\n\
         - Svara ENDAST med giltig JSON, ingen markdown eller annan formatering",
    );

    prompt
}

pub fn generation_user_prompt(request: &GenerationRequest) -> String {
    format!(
        "Generera {} quizfrågor på både svenska och engelska. Svara endast med giltig JSON.",
        request.batch_size
    )
}

/// System prompt for a validation call.
pub fn validation_system_prompt(question: &QuestionRow) -> String {
    format!(
        "Du är en expert på quizfrågor och faktagranskning. Du ska validera att en flervalsfråga \
         har rätt markerat svar och att exakt ett alternativ är korrekt.\n\n\
         Du måste:\n\
         1. Bekräfta om det markerade svaret (alternativ {marked}) är korrekt.\n\
         2. Identifiera om något annat alternativ också skulle kunna vara korrekt.\n\
         3. Kontrollera att förklaringen stödjer det korrekta svaret.\n\
         4. Verifiera att frågan, alternativen och förklaringen har perfekt stavning och grammatik.\n\
         5. Avgör om frågan är tidskänslig (svaret kan ändras över tid) och i så fall ett \
         bäst-före-datum.\n\n\
         Returnera ENDAST giltig JSON med följande format:\n\
         {{\"is_valid\": true/false, \"issues\": [\"lista med problem\"], \
         \"suggestions\": [\"förbättringsförslag\"], \
         \"alternative_correct_options\": [\"alternativ som också kan vara rätt\"], \
         \"proposed_edits\": {{\"correct_option\": 0-3}} eller null, \
         \"time_sensitive\": true/false, \"best_before_date\": \"ÅÅÅÅ-MM-DD\" eller null}}",
        marked = question.correct_option + 1,
    )
}

pub fn validation_user_prompt(question: &QuestionRow) -> String {
    let options = question.options_sv_vec();
    let mut listed = String::new();
    for (i, option) in options.iter().enumerate() {
        listed.push_str(&format!("{}. {}\n", i + 1, option));
    }
    let marked = options
        .get(question.correct_option as usize)
        .cloned()
        .unwrap_or_default();

    format!(
        "Validera denna quizfråga:\n\n\
         Fråga: {question}\n\n\
         Alternativ:\n{listed}\n\
         Markerat korrekt svar: Alternativ {index} ({marked})\n\n\
         Förklaring: {explanation}\n\n\
         Är det markerade svaret korrekt?",
        question = question.question_sv,
        index = question.correct_option + 1,
        explanation = question.explanation_sv,
    )
}

/// System prompt for a correction call.
pub fn correction_system_prompt() -> String {
    "Du är en expert på att förbättra quizfrågor. Du får en fråga och en lista med problem. \
     Föreslå minimala ändringar som åtgärdar problemen utan att ändra frågans ämne.\n\n\
     Returnera ENDAST giltig JSON med de fält som ska ändras; utelämna fält som är korrekta:\n\
     {\"question_sv\": \"...\", \"question_en\": \"...\", \"options_sv\": [...], \
     \"options_en\": [...], \"correct_option\": 0-3, \"explanation_sv\": \"...\", \
     \"explanation_en\": \"...\"}"
        .to_string()
}

pub fn correction_user_prompt(question: &QuestionRow, issues: &[String]) -> String {
    format!(
        "Fråga: {question}\n\
         Alternativ: {options}\n\
         Markerat korrekt svar: {correct}\n\
         Förklaring: {explanation}\n\n\
         Problem att åtgärda:\n{issues}",
        question = question.question_sv,
        options = question.options_sv,
        correct = question.correct_option,
        explanation = question.explanation_sv,
        issues = issues
            .iter()
            .map(|i| format!("- {i}"))
            .collect::<Vec<_>>()
            .join("\n"),
    )
}

/// System prompt for a dedicated ambiguity check.
pub fn ambiguity_system_prompt() -> String {
    "Du är en expert på quizfrågor. Avgör om mer än ett svarsalternativ skulle kunna vara \
     korrekt för frågan. Var strikt: även delvis korrekta alternativ räknas.\n\n\
     Returnera ENDAST giltig JSON:\n\
     {\"ambiguous\": true/false, \"alternative_correct_options\": [\"alternativ som också kan vara rätt\"]}"
        .to_string()
}

pub fn ambiguity_user_prompt(question: &QuestionRow) -> String {
    let options = question.options_sv_vec();
    format!(
        "Fråga: {question}\nAlternativ: {options:?}\nMarkerat korrekt svar: index {correct}\n\n\
         Kan mer än ett alternativ vara korrekt?",
        question = question.question_sv,
        correct = question.correct_option,
    )
}

// ─── Response parsing ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawQuestion {
    question_sv: String,
    #[serde(default)]
    question_en: String,
    options_sv: Vec<String>,
    #[serde(default)]
    options_en: Vec<String>,
    correct_option: i64,
    #[serde(default)]
    explanation_sv: String,
    #[serde(default)]
    explanation_en: String,
    #[serde(default)]
    background_sv: String,
    #[serde(default)]
    background_en: String,
    #[serde(default)]
    emoji: Option<String>,
    #[serde(default)]
    time_sensitive: Option<bool>,
    #[serde(default)]
    best_before_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QuestionsEnvelope {
    questions: Vec<RawQuestion>,
}

/// Strip a markdown code fence if the model wrapped its JSON in one.
pub fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

/// Parse a generation response into candidates stamped with provenance.
///
/// Accepts either the `{"questions": [...]}` envelope or a bare array.
pub fn parse_candidates(
    provider: &str,
    model: &str,
    content: &str,
) -> Result<Vec<Candidate>, ProviderError> {
    let content = strip_code_fence(content);

    let raw: Vec<RawQuestion> = serde_json::from_str::<QuestionsEnvelope>(content)
        .map(|e| e.questions)
        .or_else(|_| serde_json::from_str::<Vec<RawQuestion>>(content))
        .map_err(|e| ProviderError::BadResponse {
            provider: provider.to_string(),
            message: format!("unparsable generation response: {e}"),
        })?;

    if raw.is_empty() {
        return Err(ProviderError::BadResponse {
            provider: provider.to_string(),
            message: "no questions in response".to_string(),
        });
    }

    Ok(raw
        .into_iter()
        .map(|q| Candidate {
            question_sv: q.question_sv,
            question_en: q.question_en,
            options_sv: q.options_sv,
            options_en: q.options_en,
            correct_option: q.correct_option,
            explanation_sv: q.explanation_sv,
            explanation_en: q.explanation_en,
            background_sv: q.background_sv,
            background_en: q.background_en,
            emoji: q.emoji,
            time_sensitive: q.time_sensitive,
            best_before_date: q.best_before_date,
            provenance: Provenance {
                provider: provider.to_string(),
                model: model.to_string(),
            },
        })
        .collect())
}

/// Parse a validation response into a verdict.
pub fn parse_verdict(provider: &str, content: &str) -> Result<ProviderVerdict, ProviderError> {
    let content = strip_code_fence(content);
    serde_json::from_str(content).map_err(|e| ProviderError::BadResponse {
        provider: provider.to_string(),
        message: format!("unparsable validation response: {e}"),
    })
}

/// Parse an ambiguity-check response.
pub fn parse_ambiguity(
    provider: &str,
    content: &str,
) -> Result<super::AmbiguityResult, ProviderError> {
    let content = strip_code_fence(content);
    serde_json::from_str(content).map_err(|e| ProviderError::BadResponse {
        provider: provider.to_string(),
        message: format!("unparsable ambiguity response: {e}"),
    })
}

/// Parse a correction response into proposed edits.
pub fn parse_edits(provider: &str, content: &str) -> Result<ProposedEdits, ProviderError> {
    let content = strip_code_fence(content);
    serde_json::from_str(content).map_err(|e| ProviderError::BadResponse {
        provider: provider.to_string(),
        message: format!("unparsable correction response: {e}"),
    })
}
