//! Variable interpolation for descriptors and manifests.
//!
//! Templates reference variables as `{{ .name }}`. The opening `{{-` and
//! closing `-}}` markers trim the whitespace on that side of the action.
//! Nothing else is accepted inside an action, and every reference must
//! resolve.

use crate::variables::VariableScope;
use thiserror::Error;

/// Errors produced while rendering a template.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// A referenced variable is not in scope.
    #[error("map has no entry for key {name:?}")]
    MissingVariable {
        /// The referenced name.
        name: String,
    },

    /// The template text is not a valid sequence of actions.
    #[error("malformed template at byte {offset}: {message}")]
    Malformed {
        /// Byte offset of the offending action.
        offset: usize,
        /// What is wrong with it.
        message: String,
    },

    /// The input was not UTF-8.
    #[error("template is not valid UTF-8")]
    InvalidUtf8,
}

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Render `template` against `scope`.
///
/// Either the whole template renders or an error is returned; partial output
/// is never produced.
pub fn render(template: &str, scope: &VariableScope) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    let mut offset = 0;
    let mut trim_next = false;

    while let Some(start) = rest.find(OPEN) {
        let text = &rest[..start];
        push_text(&mut out, text, trim_next);

        let after_open = &rest[start + OPEN.len()..];
        let end = after_open.find(CLOSE).ok_or_else(|| TemplateError::Malformed {
            offset: offset + start,
            message: "unclosed action".to_string(),
        })?;
        let action = &after_open[..end];

        let (action, trim_prev) = match action.strip_prefix('-') {
            Some(inner) if inner.starts_with(char::is_whitespace) => (inner, true),
            _ => (action, false),
        };
        let (action, trim_after) = match action.strip_suffix('-') {
            Some(inner) if inner.ends_with(char::is_whitespace) => (inner, true),
            _ => (action, false),
        };

        if trim_prev {
            let kept = out.trim_end().len();
            out.truncate(kept);
        }

        let name = parse_reference(action).ok_or_else(|| TemplateError::Malformed {
            offset: offset + start,
            message: format!("unsupported action {:?}", action.trim()),
        })?;
        let value = scope
            .get(name)
            .ok_or_else(|| TemplateError::MissingVariable {
                name: name.to_string(),
            })?;
        out.push_str(value);

        let consumed = start + OPEN.len() + end + CLOSE.len();
        offset += consumed;
        rest = &rest[consumed..];
        trim_next = trim_after;
    }

    push_text(&mut out, rest, trim_next);
    Ok(out)
}

/// Render raw bytes, requiring UTF-8.
pub fn render_bytes(template: &[u8], scope: &VariableScope) -> Result<Vec<u8>, TemplateError> {
    let text = std::str::from_utf8(template).map_err(|_| TemplateError::InvalidUtf8)?;
    render(text, scope).map(String::into_bytes)
}

fn push_text(out: &mut String, text: &str, trim_start: bool) {
    if trim_start {
        out.push_str(text.trim_start());
    } else {
        out.push_str(text);
    }
}

/// `.name` with an identifier name, surrounded by optional whitespace.
fn parse_reference(action: &str) -> Option<&str> {
    let name = action.trim().strip_prefix('.')?;
    let mut chars = name.chars();
    let first = chars.next()?;
    if !(first.is_ascii_alphabetic() || first == '_') {
        return None;
    }
    chars
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
        .then_some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope(pairs: &[(&str, &str)]) -> VariableScope {
        let mut scope = VariableScope::new();
        for (k, v) in pairs {
            scope.insert(*k, *v);
        }
        scope
    }

    #[test]
    fn substitutes_references() {
        let vars = scope(&[("image", "web:1"), ("app_var_namespace", "prod")]);
        let out = render("image: {{ .image }}\nns: {{.app_var_namespace}}", &vars).unwrap();
        assert_eq!(out, "image: web:1\nns: prod");
    }

    #[test]
    fn missing_variable_fails() {
        let vars = scope(&[("present", "x")]);
        let err = render("a: {{ .present }}\nb: {{ .absent }}\n", &vars).unwrap_err();
        assert_eq!(
            err,
            TemplateError::MissingVariable {
                name: "absent".to_string()
            }
        );
    }

    #[test]
    fn empty_value_is_not_missing() {
        let vars = scope(&[("blank", "")]);
        assert_eq!(render("[{{ .blank }}]", &vars).unwrap(), "[]");
    }

    #[test]
    fn trim_markers() {
        let vars = scope(&[("v", "X")]);
        assert_eq!(render("a   {{- .v -}}   b", &vars).unwrap(), "aXb");
        assert_eq!(render("a \n{{- .v }} b", &vars).unwrap(), "aX b");
        assert_eq!(render("a {{ .v -}}\n  b", &vars).unwrap(), "a Xb");
    }

    #[test]
    fn negative_number_is_not_a_trim_marker() {
        let vars = scope(&[]);
        let err = render("{{-3}}", &vars).unwrap_err();
        assert!(matches!(err, TemplateError::Malformed { offset: 0, .. }));
    }

    #[test]
    fn rejects_other_actions() {
        let vars = scope(&[("v", "X")]);
        for bad in ["{{ if .v }}", "{{ . }}", "{{ .v.w }}", "{{ v }}", "{{}}"] {
            assert!(
                matches!(render(bad, &vars), Err(TemplateError::Malformed { .. })),
                "{bad}"
            );
        }
    }

    #[test]
    fn unclosed_action_reports_offset() {
        let vars = scope(&[("v", "X")]);
        let err = render("ok {{ .v }} then {{ .v", &vars).unwrap_err();
        assert_eq!(
            err,
            TemplateError::Malformed {
                offset: 17,
                message: "unclosed action".to_string()
            }
        );
    }

    #[test]
    fn text_without_actions_passes_through() {
        let vars = scope(&[]);
        let text = "kind: Service\nmetadata:\n  name: web # } {\n";
        assert_eq!(render(text, &vars).unwrap(), text);
    }

    #[test]
    fn rejects_non_utf8() {
        let vars = scope(&[]);
        assert_eq!(
            render_bytes(&[0xff, 0xfe], &vars).unwrap_err(),
            TemplateError::InvalidUtf8
        );
    }
}
