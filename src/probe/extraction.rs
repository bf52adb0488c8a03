//! Extraction model probe: unstructured text in, field triple out.
//!
//! Model replies are normalized by [`normalize_model_reply`] into a single
//! tagged [`NormalizedReply`] before anything else sees them, so callers
//! only deal with [`FieldValue`]s.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::diagnostics::{DiagnosticKind, DiagnosticSink};
use crate::fields::{
    FieldErrorKind, FieldTriple, FieldValue, MAX_FIELD_CHARS, PartialFields, SENTINEL_TEXT,
    TargetField, truncate_chars,
};

use super::LlmClient;

/// Maximum characters of source content included in one prompt.
pub const MAX_MODEL_CONTENT_CHARS: usize = 4000;

/// First fenced block, with or without a `json` language tag.
#[allow(clippy::expect_used)]
static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?[ \t]*\r?\n?(.*?)```").expect("fence regex is valid") // Static pattern, safe to panic
});

/// Instruction variant for the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionDomain {
    /// Content is already in the target language.
    General,
    /// Content is foreign-language; translate before extracting.
    TranslateThenExtract,
}

/// Result of normalizing one model reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedReply {
    /// A JSON object was found; keys absent from it are `Sentinel`.
    Extracted(FieldTriple),
    /// No usable JSON object in the reply.
    FormatError,
}

/// Builds the instruction prompt for `content`, truncated to
/// [`MAX_MODEL_CONTENT_CHARS`].
#[must_use]
pub fn build_prompt(content: &str, domain: ExtractionDomain) -> String {
    let content = truncate_chars(content, MAX_MODEL_CONTENT_CHARS);
    let [indication, dosage, precaution] = TargetField::ALL.map(TargetField::column_name);
    let reply_format = format!(
        "{{\"{indication}\": \"...\", \"{dosage}\": \"...\", \"{precaution}\": \"...\"}}"
    );

    match domain {
        ExtractionDomain::General => format!(
            "你是藥品資訊提取助手。從以下內容提取：\n\
             - {indication}（主治、治療什麼疾病）\n\
             - {dosage}（怎麼服用、一次多少劑量、一天幾次、飯前或飯後）\n\
             - {precaution}（副作用、禁忌、注意什麼）\n\n\
             特別注意{dosage}的提取，請尋找：服用方法、劑量、頻率、時間等資訊。\n\n\
             嚴格遵守以下規則：\n\
             1. 以台灣繁體中文簡潔地回答。\n\
             2. 每個欄位的回答都必須少於{MAX_FIELD_CHARS}個字元。\n\
             3. 如果找不到明確的{dosage}，請尋找任何劑量相關資訊。\n\
             4. 如果資訊完全不存在，在該欄位回答「{SENTINEL_TEXT}」。\n\
             5. 只輸出一個 JSON 物件，使用以下格式：{reply_format}\n\n\
             內容：\n{content}"
        ),
        ExtractionDomain::TranslateThenExtract => format!(
            "你是藥品資訊提取和翻譯助手。請將以下外文藥理資訊翻譯成台灣繁體中文，並從中提取：\n\
             - {indication}（主治）\n\
             - {dosage}（劑量）\n\
             - {precaution}（含禁忌）\n\n\
             嚴格遵守以下規則：\n\
             1. 先將內容翻譯成台灣繁體中文\n\
             2. 從翻譯後的內容中提取資訊\n\
             3. 每個欄位的回答必須少於{MAX_FIELD_CHARS}個字元\n\
             4. 如果資訊不存在，在該欄位回答「{SENTINEL_TEXT}」\n\
             5. 只輸出一個 JSON 物件，使用以下格式：{reply_format}\n\n\
             外文內容：\n{content}"
        ),
    }
}

/// Normalizes a raw model reply.
///
/// A reply that is a bare JSON object is parsed directly; otherwise the first
/// fenced block is parsed. Anything else, a parsed value that is not an
/// object, or a target key holding a non-string value is a format error.
#[must_use]
pub fn normalize_model_reply(reply: &str) -> NormalizedReply {
    let trimmed = reply.trim();
    let candidate = if trimmed.starts_with('{') && trimmed.ends_with('}') {
        trimmed
    } else {
        match FENCED_BLOCK.captures(trimmed).and_then(|caps| caps.get(1)) {
            Some(block) => block.as_str().trim(),
            None => return NormalizedReply::FormatError,
        }
    };

    let Ok(Value::Object(object)) = serde_json::from_str::<Value>(candidate) else {
        return NormalizedReply::FormatError;
    };

    let mut triple = FieldTriple::default();
    let mut fields = PartialFields::empty();
    for field in TargetField::ALL {
        let value = match object.get(field.column_name()) {
            None => FieldValue::Sentinel,
            Some(Value::String(text)) => FieldValue::from_text(text),
            Some(_) => return NormalizedReply::FormatError,
        };
        fields.set(field, value);
    }
    triple.merge(&fields);
    NormalizedReply::Extracted(triple)
}

/// Runs the extraction model over combined source text.
pub struct ExtractionModelProbe {
    client: Arc<dyn LlmClient>,
    diagnostics: DiagnosticSink,
}

impl ExtractionModelProbe {
    /// Creates an extractor around `client`.
    #[must_use]
    pub fn new(client: Arc<dyn LlmClient>, diagnostics: DiagnosticSink) -> Self {
        Self {
            client,
            diagnostics,
        }
    }

    /// Extracts the three fields from `content` for record `code`.
    ///
    /// Blank content yields an empty result without calling the model. A
    /// format failure sets all three fields to `model_format_error`; a
    /// transport failure sets them to `model_extraction_failure`.
    #[tracing::instrument(skip(self, content), fields(content_chars = content.chars().count()))]
    pub async fn extract(
        &self,
        content: &str,
        domain: ExtractionDomain,
        code: &str,
    ) -> PartialFields {
        if content.trim().is_empty() {
            debug!("No content to extract from");
            return PartialFields::empty();
        }

        let prompt = build_prompt(content, domain);
        let reply = match self.client.generate(&prompt).await {
            Ok(reply) => reply,
            Err(error) => {
                warn!(error = %error, "Model extraction failed");
                return PartialFields::uniform(&FieldValue::Error(
                    FieldErrorKind::ModelExtractionFailure,
                ));
            }
        };

        match normalize_model_reply(&reply) {
            NormalizedReply::Extracted(triple) => {
                let mut fields = PartialFields::empty();
                for (field, value) in triple.iter() {
                    fields.set(field, value.clone());
                }
                debug!(resolved = fields.resolved_count(), "Model extraction finished");
                fields
            }
            NormalizedReply::FormatError => {
                warn!(reply_chars = reply.chars().count(), "Model reply was not a JSON object");
                self.diagnostics.record(DiagnosticKind::Model, code, &reply);
                PartialFields::uniform(&FieldValue::Error(FieldErrorKind::ModelFormatError))
            }
        }
    }
}

impl std::fmt::Debug for ExtractionModelProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionModelProbe")
            .field("diagnostics", &self.diagnostics)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::probe::ModelError;

    struct ScriptedModel {
        reply: Result<String, ()>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: Err(()),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedModel {
        async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply.clone().map_err(|()| ModelError::Connection {
                base_url: "http://localhost:11434".to_string(),
            })
        }
    }

    #[test]
    fn test_normalize_bare_object() {
        let reply = r#"  {"適應症": "頭痛", "用法用量": "每日一次", "注意事項": "資訊不足"}  "#;
        let NormalizedReply::Extracted(triple) = normalize_model_reply(reply) else {
            panic!("expected extraction");
        };
        assert_eq!(triple.indication, FieldValue::Resolved("頭痛".to_string()));
        assert_eq!(triple.precaution, FieldValue::Sentinel);
    }

    #[test]
    fn test_normalize_fenced_block_with_prose() {
        let reply = "以下是結果：\n```json\n{\"適應症\": \"發燒\"}\n```\n謝謝";
        let NormalizedReply::Extracted(triple) = normalize_model_reply(reply) else {
            panic!("expected extraction");
        };
        assert_eq!(triple.indication, FieldValue::Resolved("發燒".to_string()));
        assert_eq!(triple.dosage, FieldValue::Sentinel, "missing key is sentinel");
    }

    #[test]
    fn test_normalize_bare_fence_without_language_tag() {
        let reply = "```\n{\"用法用量\": \"飯後服用\"}\n```";
        assert!(matches!(
            normalize_model_reply(reply),
            NormalizedReply::Extracted(ref triple) if triple.dosage.is_resolved()
        ));
    }

    #[test]
    fn test_normalize_rejects_other_shapes() {
        assert_eq!(normalize_model_reply("I cannot help"), NormalizedReply::FormatError);
        assert_eq!(normalize_model_reply("```json\n[1,2]\n```"), NormalizedReply::FormatError);
        assert_eq!(normalize_model_reply("{not json}"), NormalizedReply::FormatError);
        assert_eq!(
            normalize_model_reply(r#"{"適應症": ["a", "b"]}"#),
            NormalizedReply::FormatError
        );
    }

    #[test]
    fn test_normalize_truncates_long_values() {
        let long = "很".repeat(150);
        let reply = format!("{{\"適應症\": \"{long}\"}}");
        let NormalizedReply::Extracted(triple) = normalize_model_reply(&reply) else {
            panic!("expected extraction");
        };
        let FieldValue::Resolved(text) = triple.indication else {
            panic!("expected resolved");
        };
        assert_eq!(text.chars().count(), MAX_FIELD_CHARS);
    }

    #[test]
    fn test_build_prompt_truncates_content_and_names_keys() {
        let content = "字".repeat(MAX_MODEL_CONTENT_CHARS + 500);
        let prompt = build_prompt(&content, ExtractionDomain::TranslateThenExtract);
        assert!(prompt.contains("翻譯"));
        assert!(prompt.contains("\"注意事項\""));
        assert_eq!(
            prompt.matches('字').count(),
            MAX_MODEL_CONTENT_CHARS,
            "content must be truncated"
        );
    }

    #[tokio::test]
    async fn test_extract_blank_content_skips_model() {
        let model = ScriptedModel::replying("{}");
        let probe = ExtractionModelProbe::new(model.clone(), DiagnosticSink::disabled());

        let fields = probe.extract("   ", ExtractionDomain::General, "A1").await;

        assert!(fields.is_empty());
        assert!(model.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_extract_transport_failure_marks_all_fields() {
        let probe = ExtractionModelProbe::new(ScriptedModel::failing(), DiagnosticSink::disabled());

        let fields = probe.extract("內容", ExtractionDomain::General, "A1").await;

        assert_eq!(
            fields,
            PartialFields::uniform(&FieldValue::Error(FieldErrorKind::ModelExtractionFailure))
        );
    }

    #[tokio::test]
    async fn test_extract_format_failure_writes_diagnostic() {
        let dir = tempfile::TempDir::new().unwrap();
        let probe = ExtractionModelProbe::new(
            ScriptedModel::replying("sorry, no JSON"),
            DiagnosticSink::new(dir.path()),
        );

        let fields = probe.extract("內容", ExtractionDomain::General, "A1").await;

        assert_eq!(
            fields,
            PartialFields::uniform(&FieldValue::Error(FieldErrorKind::ModelFormatError))
        );
        let written = std::fs::read_to_string(dir.path().join("diagnostics/model_A1.txt")).unwrap();
        assert_eq!(written, "sorry, no JSON");
    }
}
