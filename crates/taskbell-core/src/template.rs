// SPDX-FileCopyrightText: 2026 Taskbell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message templates with `{{variable}}` placeholders.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::NotificationError;
use crate::types::ChannelType;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("placeholder pattern is valid")
});

/// A reusable message body bound to a set of channel types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Template {
    pub id: String,
    pub name: String,
    /// Channel types this template may be rendered for. Empty means all.
    #[serde(default)]
    pub channel_types: Vec<ChannelType>,
    #[serde(default)]
    pub subject: Option<String>,
    pub body: String,
    #[serde(default)]
    pub required_variables: Vec<String>,
}

/// Subject and body after substitution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedTemplate {
    pub subject: Option<String>,
    pub body: String,
}

impl Template {
    /// Checks the template itself: non-empty body, and every required
    /// variable actually appears in the subject or body.
    pub fn validate(&self) -> Result<(), NotificationError> {
        if self.body.trim().is_empty() {
            return Err(self.invalid("body must not be empty"));
        }
        let used = self.placeholders();
        for required in &self.required_variables {
            if !used.iter().any(|u| u == required) {
                return Err(self.invalid(format!(
                    "required variable `{required}` is not referenced"
                )));
            }
        }
        Ok(())
    }

    pub fn supports(&self, channel_type: ChannelType) -> bool {
        self.channel_types.is_empty() || self.channel_types.contains(&channel_type)
    }

    /// Substitutes `vars`; fails if a required variable is missing or any
    /// placeholder is left unresolved.
    pub fn render(
        &self,
        vars: &HashMap<String, String>,
    ) -> Result<RenderedTemplate, NotificationError> {
        let missing: Vec<&str> = self
            .required_variables
            .iter()
            .filter(|v| !vars.contains_key(*v))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(self.invalid(format!(
                "missing required variables: {}",
                missing.join(", ")
            )));
        }

        let subject = self
            .subject
            .as_deref()
            .map(|s| self.substitute(s, vars))
            .transpose()?;
        let body = self.substitute(&self.body, vars)?;
        Ok(RenderedTemplate { subject, body })
    }

    fn substitute(
        &self,
        text: &str,
        vars: &HashMap<String, String>,
    ) -> Result<String, NotificationError> {
        let mut unresolved = Vec::new();
        let rendered = PLACEHOLDER.replace_all(text, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            match vars.get(name) {
                Some(value) => value.clone(),
                None => {
                    unresolved.push(name.to_string());
                    caps[0].to_string()
                }
            }
        });
        if unresolved.is_empty() {
            Ok(rendered.into_owned())
        } else {
            Err(self.invalid(format!(
                "unresolved placeholders: {}",
                unresolved.join(", ")
            )))
        }
    }

    fn placeholders(&self) -> Vec<String> {
        let subject = self.subject.as_deref().unwrap_or_default();
        PLACEHOLDER
            .captures_iter(subject)
            .chain(PLACEHOLDER.captures_iter(&self.body))
            .map(|c| c[1].to_string())
            .collect()
    }

    fn invalid(&self, message: impl Into<String>) -> NotificationError {
        NotificationError::TemplateValidation {
            template_id: self.id.clone(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn task_template() -> Template {
        Template {
            id: "task-created".into(),
            name: "Task created".into(),
            channel_types: vec![ChannelType::Discord],
            subject: Some("New task: {{ title }}".into()),
            body: "Task {{title}} was created by {{user}}".into(),
            required_variables: vec!["title".into()],
        }
    }

    #[test]
    fn renders_subject_and_body() {
        let vars = HashMap::from([
            ("title".to_string(), "Write docs".to_string()),
            ("user".to_string(), "sam".to_string()),
        ]);
        let out = task_template().render(&vars).unwrap();
        assert_eq!(out.subject.as_deref(), Some("New task: Write docs"));
        assert_eq!(out.body, "Task Write docs was created by sam");
    }

    #[test]
    fn missing_required_variable_fails_validation() {
        let vars = HashMap::from([("user".to_string(), "sam".to_string())]);
        let err = task_template().render(&vars).unwrap_err();
        assert_eq!(err.code(), ErrorCode::TemplateValidationFailed);
        assert!(err.to_string().contains("title"));
    }

    #[test]
    fn unresolved_optional_placeholder_fails() {
        let vars = HashMap::from([("title".to_string(), "x".to_string())]);
        let err = task_template().render(&vars).unwrap_err();
        assert!(err.to_string().contains("unresolved placeholders: user"));
    }

    #[test]
    fn validate_rejects_unreferenced_required_variable() {
        let mut t = task_template();
        t.required_variables.push("due".into());
        assert!(t.validate().is_err());
        assert!(task_template().validate().is_ok());
    }

    #[test]
    fn channel_type_filter() {
        let t = task_template();
        assert!(t.supports(ChannelType::Discord));
        assert!(!t.supports(ChannelType::Webhook));
    }
}
