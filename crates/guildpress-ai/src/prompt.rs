use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use serde_json::Value;

use crate::error::AiError;

/// Compiled-in templates, overridable by files in the configured
/// prompts directory (`<dir>/<name>.txt`).
const EMBEDDED: &[(&str, &str)] = &[
    ("filter", include_str!("../prompts/filter.txt")),
    ("categorize", include_str!("../prompts/categorize.txt")),
    ("summarize_daily", include_str!("../prompts/summarize_daily.txt")),
    (
        "summarize_weekly",
        include_str!("../prompts/summarize_weekly.txt"),
    ),
    ("extract_quote", include_str!("../prompts/extract_quote.txt")),
    (
        "extract_announcement",
        include_str!("../prompts/extract_announcement.txt"),
    ),
    ("extract_faq", include_str!("../prompts/extract_faq.txt")),
    ("format_extract", include_str!("../prompts/format_extract.txt")),
];

/// Named prompt templates with `{{NAME}}` interpolation.
///
/// Templates are opaque text, read once and cached. Scalars are
/// substituted via string conversion; arrays and objects via their JSON
/// encoding. A placeholder with no supplied value stays verbatim.
pub struct PromptStore {
    dir: Option<PathBuf>,
    cache: Mutex<HashMap<String, String>>,
}

impl PromptStore {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self {
            dir,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn render(&self, name: &str, vars: &[(&str, Value)]) -> Result<String, AiError> {
        let mut out = self.load(name)?;
        for (key, value) in vars {
            let needle = format!("{{{{{key}}}}}");
            if !out.contains(&needle) {
                continue;
            }
            let replacement = match value {
                Value::String(s) => s.clone(),
                Value::Array(_) | Value::Object(_) => value.to_string(),
                other => other.to_string(),
            };
            out = out.replace(&needle, &replacement);
        }
        Ok(out)
    }

    fn load(&self, name: &str) -> Result<String, AiError> {
        if let Some(cached) = self
            .cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
        {
            return Ok(cached.clone());
        }

        let text = self.read_template(name)?;
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), text.clone());
        Ok(text)
    }

    fn read_template(&self, name: &str) -> Result<String, AiError> {
        if let Some(dir) = &self.dir {
            let path = dir.join(format!("{name}.txt"));
            match std::fs::read_to_string(&path) {
                Ok(text) => return Ok(text),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(AiError::Template {
                        name: name.to_string(),
                        source: e,
                    })
                }
            }
        }
        EMBEDDED
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, text)| text.to_string())
            .ok_or_else(|| AiError::UnknownTemplate(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_substitute_as_plain_strings() {
        let store = PromptStore::new(None);
        let out = store
            .render(
                "summarize_daily",
                &[
                    ("CHANNEL_NAME", Value::String("general".into())),
                    ("DATE", Value::String("2024-06-15".into())),
                    ("MESSAGES", serde_json::json!([{"id": "1"}])),
                ],
            )
            .unwrap();
        assert!(out.contains("general"));
        assert!(!out.contains("\"general\""));
        assert!(out.contains(r#"[{"id":"1"}]"#));
        assert!(!out.contains("{{CHANNEL_NAME}}"));
    }

    #[test]
    fn unknown_placeholder_left_verbatim() {
        let store = PromptStore::new(None);
        let out = store.render("filter", &[]).unwrap();
        assert!(out.contains("{{MESSAGES}}"));
    }

    #[test]
    fn unknown_template_is_an_error() {
        let store = PromptStore::new(None);
        assert!(matches!(
            store.render("no_such_template", &[]),
            Err(AiError::UnknownTemplate(_))
        ));
    }

    #[test]
    fn every_embedded_template_requests_json() {
        for (name, text) in EMBEDDED {
            assert!(
                text.to_lowercase().contains("json"),
                "{name} should instruct a JSON response"
            );
        }
    }
}
