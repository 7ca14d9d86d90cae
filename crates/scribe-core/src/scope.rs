//! Document addressing
//!
//! Every document instance is identified by a three-part key rendered as
//! `namespace-lesson-component`. The first two parts never contain dashes;
//! the component keeps any remaining dashes, so the rendered form parses
//! back unambiguously.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeKey {
    pub namespace: String,
    pub lesson: String,
    pub component: String,
}

impl ScopeKey {
    pub fn new(
        namespace: impl Into<String>,
        lesson: impl Into<String>,
        component: impl Into<String>,
    ) -> Result<Self, Error> {
        let key = Self {
            namespace: namespace.into(),
            lesson: lesson.into(),
            component: component.into(),
        };
        key.validate()?;
        Ok(key)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.namespace.is_empty() || self.namespace.contains('-') {
            return Err(Error::InvalidScopeKey(format!(
                "bad namespace {:?}",
                self.namespace
            )));
        }
        if self.lesson.is_empty() || self.lesson.contains('-') {
            return Err(Error::InvalidScopeKey(format!(
                "bad lesson {:?}",
                self.lesson
            )));
        }
        if self.component.is_empty() {
            return Err(Error::InvalidScopeKey("empty component".into()));
        }
        Ok(())
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.namespace, self.lesson, self.component)
    }
}

impl FromStr for ScopeKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, rest) = s
            .split_once('-')
            .ok_or_else(|| Error::InvalidScopeKey(s.to_string()))?;
        let (lesson, component) = rest
            .split_once('-')
            .ok_or_else(|| Error::InvalidScopeKey(s.to_string()))?;
        Self::new(namespace, lesson, component)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_round_trips() {
        let key = ScopeKey::new("course42", "lesson7", "essay").unwrap();
        let parsed: ScopeKey = key.to_string().parse().unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn test_component_keeps_dashes() {
        let key: ScopeKey = "course42-lesson7-essay-part-2".parse().unwrap();
        assert_eq!(key.namespace, "course42");
        assert_eq!(key.lesson, "lesson7");
        assert_eq!(key.component, "essay-part-2");
        assert_eq!(key.to_string(), "course42-lesson7-essay-part-2");
    }

    #[test]
    fn test_rejects_malformed_keys() {
        assert!("".parse::<ScopeKey>().is_err());
        assert!("onlyone".parse::<ScopeKey>().is_err());
        assert!("two-parts".parse::<ScopeKey>().is_err());
        assert!("--x".parse::<ScopeKey>().is_err());
        assert!("a-b-".parse::<ScopeKey>().is_err());
        assert!(ScopeKey::new("has-dash", "l", "c").is_err());
    }
}
