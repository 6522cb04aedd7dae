//! Prompt templates and rendering.
//!
//! Templates use `{{key}}` tokens. Loading templates from disk and
//! front-matter parsing belong to the transport layer; this module only
//! renders already-loaded text.

use std::collections::HashMap;

use crate::error::Error;

/// A prompt template with its declared variables.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Prompt {
    template: String,
    declared: Vec<String>,
}

impl Prompt {
    /// Creates a prompt with no declared variables.
    pub fn new<S: Into<String>>(template: S) -> Self {
        Self {
            template: template.into(),
            declared: Vec::new(),
        }
    }

    /// Declares a variable the template requires a bound value for.
    pub fn with_declared_variable<S: Into<String>>(mut self, name: S) -> Self {
        self.declared.push(name.into());
        self
    }

    /// Returns the raw template text.
    #[inline]
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Returns the declared variable names.
    #[inline]
    pub fn declared_variables(&self) -> &[String] {
        &self.declared
    }
}

/// Renders a prompt against the given variable bindings.
///
/// Every declared variable must have a bound value, or rendering fails
/// with [`Error::Template`]. Undeclared bindings are substituted as well
/// when their tokens appear. Unresolved `{{` tokens remaining after
/// substitution are deliberately lenient: they log a warning and the
/// rendered text is returned as-is, leaving the decision to the caller.
pub fn render(
    prompt: &Prompt,
    variables: &HashMap<String, String>,
) -> Result<String, Error> {
    for name in &prompt.declared {
        if !variables.contains_key(name) {
            return Err(Error::Template(name.clone()));
        }
    }

    let mut rendered = prompt.template.clone();
    for (key, value) in variables {
        rendered = rendered.replace(&format!("{{{{{key}}}}}"), value);
    }

    trace!(count = variables.len(), "substituted prompt variables");

    if rendered.contains("{{") {
        warn!(
            "rendered prompt most likely still contains unreplaced \
             template tokens"
        );
        trace!("rendered text: {rendered}");
    }

    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn test_renders_declared_variables() {
        let prompt = Prompt::new("Hello {{name}}, today is {{date}}.")
            .with_declared_variable("name")
            .with_declared_variable("date");

        let rendered = render(
            &prompt,
            &bindings(&[("name", "Ada"), ("date", "Jan 01")]),
        )
        .unwrap();

        assert_eq!(rendered, "Hello Ada, today is Jan 01.");
    }

    #[test]
    fn test_unbound_declared_variable_fails() {
        let prompt =
            Prompt::new("Hello {{name}}.").with_declared_variable("name");

        let err = render(&prompt, &HashMap::new()).unwrap_err();

        assert!(matches!(err, Error::Template(name) if name == "name"));
    }

    #[test]
    fn test_leftover_tokens_warn_but_succeed() {
        let prompt = Prompt::new("{{greeting}} {{unknown}}");

        let rendered =
            render(&prompt, &bindings(&[("greeting", "Hi")])).unwrap();

        assert_eq!(rendered, "Hi {{unknown}}");
    }

    #[test]
    fn test_undeclared_bindings_still_substitute() {
        let prompt = Prompt::new("Tools:\n{{tools}}");

        let rendered =
            render(&prompt, &bindings(&[("tools", "search_web(q)")]))
                .unwrap();

        assert_eq!(rendered, "Tools:\nsearch_web(q)");
    }
}
