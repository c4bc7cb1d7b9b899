//! Generation requests and generator identifiers

use crate::error::ResolutionError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Subgenerator used when a name does not specify one
pub const DEFAULT_SUBGENERATOR: &str = "app";

/// Everything a generator needs to produce one artifact.
///
/// Options and answers are kept sorted by key, so two requests built with
/// different insertion orders compare (and fingerprint) equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationRequest {
    generator: String,
    options: BTreeMap<String, String>,
    answers: BTreeMap<String, String>,
    args: Vec<String>,
}

impl GenerationRequest {
    /// Create a request for a generator with no inputs
    pub fn new(generator: impl Into<String>) -> Self {
        Self {
            generator: generator.into(),
            ..Self::default()
        }
    }

    /// Add or replace an option
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Add or replace a prompt answer
    pub fn with_answer(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.answers.insert(key.into(), value.into());
        self
    }

    /// Append a positional argument
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn generator(&self) -> &str {
        &self.generator
    }

    pub fn options(&self) -> &BTreeMap<String, String> {
        &self.options
    }

    pub fn answers(&self) -> &BTreeMap<String, String> {
        &self.answers
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

/// A generator name split into `<package>[:<subgenerator>]`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GeneratorId {
    package: String,
    subgenerator: String,
}

impl GeneratorId {
    /// Parse and validate a generator name.
    ///
    /// Packages may be scoped (`@scope/name`); anything that could escape a
    /// search root is rejected.
    pub fn parse(name: &str) -> Result<Self, ResolutionError> {
        let invalid = |reason: &str| ResolutionError::InvalidName {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        let (package, subgenerator) = match name.rsplit_once(':') {
            Some((package, sub)) => (package, sub),
            None => (name, DEFAULT_SUBGENERATOR),
        };

        if package.is_empty() {
            return Err(invalid("package name is empty"));
        }
        if subgenerator.is_empty() {
            return Err(invalid("subgenerator name is empty"));
        }
        if package.starts_with('-') {
            return Err(invalid("package name must not start with '-'"));
        }
        if package.contains("..") || package.contains('\\') || package.contains('\0') {
            return Err(invalid("must not contain '..' or path separators"));
        }

        let slashes = package.matches('/').count();
        if slashes > 1 || (slashes == 1 && !package.starts_with('@')) {
            return Err(invalid("only scoped packages (@scope/name) may contain '/'"));
        }
        if package.starts_with('@') && slashes == 0 {
            return Err(invalid("scoped packages must have the form @scope/name"));
        }
        if package.ends_with('/') || package.starts_with("@/") {
            return Err(invalid("scope and package name must both be non-empty"));
        }

        let package_ok = package
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@' | '/'));
        if !package_ok {
            return Err(invalid(
                "package names may contain only alphanumerics, '-', '_', '.', '@' and '/'",
            ));
        }

        if !subgenerator
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(invalid(
                "subgenerator names may contain only alphanumerics, '-' and '_'",
            ));
        }

        Ok(Self {
            package: package.to_string(),
            subgenerator: subgenerator.to_string(),
        })
    }

    /// Package name, including any scope
    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn subgenerator(&self) -> &str {
        &self.subgenerator
    }
}

impl fmt::Display for GeneratorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.package, self.subgenerator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sorts_maps() {
        let a = GenerationRequest::new("svc")
            .with_option("b", "2")
            .with_option("a", "1");
        let b = GenerationRequest::new("svc")
            .with_option("a", "1")
            .with_option("b", "2");
        assert_eq!(a, b);
        let keys: Vec<_> = a.options().keys().cloned().collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn deserializes_with_missing_fields() {
        let request: GenerationRequest =
            serde_json::from_str(r#"{"generator": "svc-template"}"#).unwrap();
        assert_eq!(request.generator(), "svc-template");
        assert!(request.options().is_empty());
        assert!(request.answers().is_empty());
        assert!(request.args().is_empty());
    }

    #[test]
    fn parse_default_subgenerator() {
        let id = GeneratorId::parse("generator-springboot").unwrap();
        assert_eq!(id.package(), "generator-springboot");
        assert_eq!(id.subgenerator(), "app");
    }

    #[test]
    fn parse_scoped_with_subgenerator() {
        let id = GeneratorId::parse("@octo/generator-ecs:service").unwrap();
        assert_eq!(id.package(), "@octo/generator-ecs");
        assert_eq!(id.subgenerator(), "service");
        assert_eq!(id.to_string(), "@octo/generator-ecs:service");
    }

    #[test]
    fn parse_rejects_invalid_names() {
        let rejected = [
            "../etc",
            "a/b",
            "pkg:../x",
            "@scope",
            "@/x",
            "",
            "pkg:",
            "a\\b",
            "--registry=evil",
        ];
        for name in rejected {
            assert!(
                matches!(
                    GeneratorId::parse(name),
                    Err(ResolutionError::InvalidName { .. })
                ),
                "{name} should be rejected"
            );
        }
    }
}
