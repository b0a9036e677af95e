pub mod images;
pub mod sanitize;

use chrono::{DateTime, Datelike, Local};
use common::error::AppError;
use minijinja::{context, Environment};

use crate::SearchResult;

pub use images::enrich_passage;
pub use sanitize::QuerySanitizer;

/// Default weekday names for `{{current_week}}`, Sunday first.
const WEEKDAYS_EN: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

/// Marker prefixed to the best FAQ entry when it clears the
/// direct-answer threshold.
const EXACT_MATCH_MARKER: &str = "[Exact match] ";

pub const DEFAULT_PROMPT_TEMPLATE: &str = "\
You are a knowledgeable assistant. Answer using only the material below.
Current time: {{current_time}} ({{current_week}})

Reference material:
{{contexts}}

Question: {{query}}
";

#[derive(Debug, Clone)]
pub struct FaqPriority {
    pub enabled: bool,
    pub direct_answer_threshold: f64,
}

impl Default for FaqPriority {
    fn default() -> Self {
        Self {
            enabled: false,
            direct_answer_threshold: 0.9,
        }
    }
}

/// Renders fused search results into the final user prompt.
///
/// The template may reference `{{query}}`, `{{contexts}}`, `{{current_time}}`
/// and `{{current_week}}`.
pub struct ContextAssembler {
    template: String,
    weekday_names: Vec<String>,
    sanitizer: QuerySanitizer,
    faq_priority: FaqPriority,
}

impl ContextAssembler {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            weekday_names: WEEKDAYS_EN.iter().map(|d| (*d).to_string()).collect(),
            sanitizer: QuerySanitizer::default(),
            faq_priority: FaqPriority::default(),
        }
    }

    pub fn with_faq_priority(mut self, faq_priority: FaqPriority) -> Self {
        self.faq_priority = faq_priority;
        self
    }

    pub fn with_sanitizer(mut self, sanitizer: QuerySanitizer) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    /// Override the localized weekday table; must hold seven names starting
    /// with Sunday.
    pub fn with_weekday_names(mut self, names: Vec<String>) -> Result<Self, AppError> {
        if names.len() != 7 {
            return Err(AppError::Validation(
                "weekday table must contain exactly seven names".into(),
            ));
        }
        if names.iter().any(|name| name.trim().is_empty()) {
            return Err(AppError::Validation("weekday names must be non-empty".into()));
        }
        self.weekday_names = names;
        Ok(self)
    }

    pub fn assemble(&self, query: &str, results: &[SearchResult]) -> Result<String, AppError> {
        self.assemble_at(query, results, Local::now())
    }

    fn assemble_at(
        &self,
        query: &str,
        results: &[SearchResult],
        now: DateTime<Local>,
    ) -> Result<String, AppError> {
        self.sanitizer.check(query)?;

        let contexts = self.build_contexts(results);
        let current_time = now.format("%Y-%m-%d %H:%M:%S").to_string();
        let weekday = now.weekday().num_days_from_sunday() as usize;
        let current_week = self.weekday_names[weekday % 7].clone();

        let env = Environment::new();
        let rendered = env.render_str(
            &self.template,
            context! { query, contexts, current_time, current_week },
        )?;
        Ok(rendered)
    }

    fn build_contexts(&self, results: &[SearchResult]) -> String {
        let (faq_hits, document_hits): (Vec<&SearchResult>, Vec<&SearchResult>) =
            results.iter().partition(|result| result.is_faq());

        if !self.faq_priority.enabled || faq_hits.is_empty() {
            return results
                .iter()
                .enumerate()
                .map(|(i, result)| format!("[{}] {}", i + 1, passage(result)))
                .collect::<Vec<_>>()
                .join("\n\n");
        }

        let high_confidence = faq_hits
            .iter()
            .any(|result| result.score >= self.faq_priority.direct_answer_threshold);

        let mut sections = Vec::new();
        let mut numbered = Vec::with_capacity(faq_hits.len());
        for (i, result) in faq_hits.iter().enumerate() {
            let marker = if i == 0 && high_confidence {
                EXACT_MATCH_MARKER
            } else {
                ""
            };
            numbered.push(format!("[{}] {marker}{}", i + 1, passage(result)));
        }
        sections.push(format!("Source 1: FAQ\n{}", numbered.join("\n\n")));

        if !document_hits.is_empty() {
            let offset = faq_hits.len();
            let numbered: Vec<String> = document_hits
                .iter()
                .enumerate()
                .map(|(i, result)| format!("[{}] {}", offset + i + 1, passage(result)))
                .collect();
            sections.push(format!("Source 2: Documents\n{}", numbered.join("\n\n")));
        }

        sections.join("\n\n")
    }
}

fn passage(result: &SearchResult) -> String {
    enrich_passage(&result.content, &result.image_info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use common::model::{ChunkType, ImageInfo};
    use common::retrieve::MatchType;

    fn result(chunk_id: &str, chunk_type: ChunkType, score: f64, content: &str) -> SearchResult {
        SearchResult {
            chunk_id: chunk_id.into(),
            knowledge_id: "know-1".into(),
            knowledge_base_id: "kb1".into(),
            content: content.into(),
            chunk_type,
            chunk_index: 0,
            score,
            match_type: MatchType::Vector,
            knowledge_title: "Handbook".into(),
            file_name: "handbook.md".into(),
            image_info: Vec::new(),
            metadata: None,
        }
    }

    fn fixed_now() -> DateTime<Local> {
        // 2025-03-05 was a Wednesday.
        Local.with_ymd_and_hms(2025, 3, 5, 9, 30, 0).single().expect("valid time")
    }

    #[test]
    fn substitutes_all_placeholders() {
        let assembler = ContextAssembler::new(
            "Q: {{query}}\nT: {{current_time}}\nW: {{current_week}}\nC:\n{{contexts}}",
        );
        let results = vec![result("a", ChunkType::Text, 0.9, "First passage.")];

        let prompt = assembler
            .assemble_at("what is this", &results, fixed_now())
            .expect("assemble");

        assert!(prompt.contains("Q: what is this"));
        assert!(prompt.contains("T: 2025-03-05 09:30:00"));
        assert!(prompt.contains("W: Wednesday"));
        assert!(prompt.contains("C:\n[1] First passage."));
    }

    #[test]
    fn plain_mode_numbers_passages_with_blank_lines() {
        let assembler = ContextAssembler::new("{{contexts}}");
        let results = vec![
            result("a", ChunkType::Text, 0.9, "one"),
            result("b", ChunkType::Text, 0.8, "two"),
        ];

        let prompt = assembler
            .assemble_at("query", &results, fixed_now())
            .expect("assemble");
        assert_eq!(prompt, "[1] one\n\n[2] two");
    }

    #[test]
    fn faq_priority_segregates_sources_and_marks_high_confidence() {
        let assembler = ContextAssembler::new("{{contexts}}").with_faq_priority(FaqPriority {
            enabled: true,
            direct_answer_threshold: 0.85,
        });
        let results = vec![
            result("f1", ChunkType::Faq, 0.92, "faq answer"),
            result("d1", ChunkType::Text, 0.7, "doc passage"),
            result("f2", ChunkType::Faq, 0.4, "weaker faq"),
        ];

        let prompt = assembler
            .assemble_at("query", &results, fixed_now())
            .expect("assemble");

        assert!(prompt.starts_with("Source 1: FAQ\n[1] [Exact match] faq answer"));
        assert!(prompt.contains("[2] weaker faq"));
        assert!(prompt.contains("Source 2: Documents\n[3] doc passage"));
    }

    #[test]
    fn no_marker_below_threshold() {
        let assembler = ContextAssembler::new("{{contexts}}").with_faq_priority(FaqPriority {
            enabled: true,
            direct_answer_threshold: 0.95,
        });
        let results = vec![result("f1", ChunkType::Faq, 0.92, "faq answer")];

        let prompt = assembler
            .assemble_at("query", &results, fixed_now())
            .expect("assemble");
        assert!(!prompt.contains("[Exact match]"));
        assert!(prompt.contains("[1] faq answer"));
    }

    #[test]
    fn image_info_is_woven_into_passages() {
        let assembler = ContextAssembler::new("{{contexts}}");
        let mut with_image = result("a", ChunkType::Text, 0.9, "See ![d](https://cdn/p.png).");
        with_image.image_info = vec![ImageInfo {
            url: "https://cdn/p.png".into(),
            original_url: String::new(),
            caption: "A pipeline".into(),
            ocr_text: String::new(),
        }];

        let prompt = assembler
            .assemble_at("query", &[with_image], fixed_now())
            .expect("assemble");
        assert!(prompt.contains("Image description: A pipeline"));
    }

    #[test]
    fn rejected_query_surfaces_input_error() {
        let assembler = ContextAssembler::new("{{contexts}}");
        let outcome = assembler.assemble_at("   ", &[], fixed_now());
        assert!(matches!(outcome, Err(AppError::InputRejected(_))));
    }

    #[test]
    fn weekday_table_can_be_localized() {
        let names: Vec<String> = ["So", "Mo", "Di", "Mi", "Do", "Fr", "Sa"]
            .iter()
            .map(|s| (*s).to_string())
            .collect();
        let assembler = ContextAssembler::new("{{current_week}}")
            .with_weekday_names(names)
            .expect("table");

        let prompt = assembler.assemble_at("query", &[], fixed_now()).expect("assemble");
        assert_eq!(prompt, "Mi");
    }
}
