use std::collections::HashMap;
use std::fmt::{self, Debug};

/// A snapshot of the process environment.
///
/// Credentials and endpoints are read from this snapshot instead of the
/// live process environment, so resolution is deterministic and easy to
/// test. Capture it once at startup and pass it by reference.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: HashMap<String, String>,
}

impl Environment {
    /// Captures the current process environment.
    ///
    /// Variables whose name or value is not valid Unicode are skipped.
    pub fn capture() -> Self {
        let vars = std::env::vars_os()
            .filter_map(|(key, value)| {
                Some((key.into_string().ok()?, value.into_string().ok()?))
            })
            .collect();
        Self { vars }
    }

    /// Creates an environment from the given pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars = pairs
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        Self { vars }
    }

    /// Returns the value of a variable.
    ///
    /// Empty (or whitespace-only) values are treated as unset.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .get(name)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }
}

impl Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Values may hold secrets, only print the names.
        let mut names: Vec<&str> = self.vars.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("Environment").field("vars", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_values_are_unset() {
        let env = Environment::from_pairs([("A", "1"), ("B", "  "), ("C", "")]);
        assert_eq!(env.get("A"), Some("1"));
        assert_eq!(env.get("B"), None);
        assert_eq!(env.get("C"), None);
        assert_eq!(env.get("D"), None);
    }

    #[test]
    fn test_debug_hides_values() {
        let env = Environment::from_pairs([("SECRET_KEY", "sk-123")]);
        let printed = format!("{env:?}");
        assert!(printed.contains("SECRET_KEY"));
        assert!(!printed.contains("sk-123"));
    }
}
