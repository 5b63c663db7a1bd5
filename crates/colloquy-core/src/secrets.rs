//! Secret storage, resolution, and output masking.
//!
//! Secrets are named values injected into tool execution environments and
//! scrubbed from tool output. A secret is either a static string or a
//! zero-argument resolver that may fail per call; resolver failures are
//! swallowed at this boundary and never surface to the agent.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::error::Result;

/// Constant token substituted for secret values in tool output.
pub const MASK_TOKEN: &str = "<secret-hidden>";

/// Zero-argument resolver producing a secret value on demand.
pub type SecretResolver = Arc<dyn Fn() -> Result<String> + Send + Sync>;

/// Where a secret's value comes from.
#[derive(Clone)]
pub enum SecretSource {
    /// A fixed value.
    Static(String),
    /// A resolver invoked per lookup; may fail per call.
    Dynamic(SecretResolver),
}

impl SecretSource {
    /// Convenience constructor for a static secret.
    pub fn value<T: Into<String>>(value: T) -> Self {
        Self::Static(value.into())
    }

    /// Convenience constructor wrapping a resolver closure.
    pub fn resolver<F>(resolver: F) -> Self
    where
        F: Fn() -> Result<String> + Send + Sync + 'static,
    {
        Self::Dynamic(Arc::new(resolver))
    }
}

impl fmt::Debug for SecretSource {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(_) => formatter.write_str("SecretSource::Static(..)"),
            Self::Dynamic(_) => formatter.write_str("SecretSource::Dynamic(..)"),
        }
    }
}

/// Name-keyed secret table with reference finding and output masking.
///
/// Masking is robust against resolvers whose values change or start
/// failing: every value ever observed through this manager remains
/// maskable for the manager's lifetime.
#[derive(Debug, Clone, Default)]
pub struct SecretsManager {
    sources: HashMap<String, SecretSource>,
    /// Every value observed per secret, oldest first. Kept so a value seen
    /// at injection time is still masked after the resolver moves on.
    observed_values: HashMap<String, Vec<String>>,
}

impl SecretsManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges new secrets into the table; same-named entries are replaced.
    pub fn update_secrets(&mut self, secrets: HashMap<String, SecretSource>) {
        self.sources.extend(secrets);
    }

    /// Number of registered secrets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether no secrets are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Finds registered secret names referenced in the text.
    ///
    /// Matching is a case-insensitive substring check per name; a short
    /// name that happens to be contained in a longer registered name
    /// matches independently of it.
    #[must_use]
    pub fn find_secrets_in_text(&self, text: &str) -> BTreeSet<String> {
        let lowered = text.to_lowercase();
        self.sources
            .keys()
            .filter(|name| lowered.contains(&name.to_lowercase()))
            .cloned()
            .collect()
    }

    /// Resolves the secrets referenced by a command into env-var pairs.
    ///
    /// Resolver failures are logged and that name is silently excluded;
    /// this never fails as a whole.
    pub fn get_secrets_as_env_vars(&mut self, command: &str) -> HashMap<String, String> {
        let names = self.find_secrets_in_text(command);
        names
            .into_iter()
            .filter_map(|name| {
                let value = self.resolve(&name)?;
                Some((name, value))
            })
            .collect()
    }

    /// Replaces every known secret value in the output with [`MASK_TOKEN`].
    ///
    /// Covers freshly resolvable values and every value previously
    /// observed, so a resolver that starts failing cannot leak the value
    /// it produced earlier. Longer values are replaced first so a value
    /// containing another is not partially masked.
    pub fn mask_secrets_in_output(&mut self, output: &str) -> String {
        let names: Vec<String> = self.sources.keys().cloned().collect();
        for name in names {
            // Refreshes observed_values; failures keep earlier observations.
            drop(self.resolve(&name));
        }

        let mut values: Vec<&String> = self
            .observed_values
            .values()
            .flatten()
            .filter(|value| !value.is_empty())
            .collect();
        values.sort_by(|left, right| right.len().cmp(&left.len()).then_with(|| left.cmp(right)));
        values.dedup();

        let mut masked = output.to_owned();
        for value in values {
            masked = masked.replace(value.as_str(), MASK_TOKEN);
        }
        masked
    }

    /// Renders one `export NAME=value` line per resolvable secret.
    ///
    /// Values are single-quoted when they contain characters a shell would
    /// interpret; resolver failures are skipped.
    pub fn export_all_secrets(&mut self) -> Vec<String> {
        let mut names: Vec<String> = self.sources.keys().cloned().collect();
        names.sort();
        names
            .into_iter()
            .filter_map(|name| {
                let value = self.resolve(&name)?;
                Some(format!("export {name}={}", shell_quote(&value)))
            })
            .collect()
    }

    /// Resolves one secret, recording the observed value for masking.
    ///
    /// Returns `None` on resolver failure; the failure is not persisted.
    fn resolve(&mut self, name: &str) -> Option<String> {
        let value = match self.sources.get(name)? {
            SecretSource::Static(value) => value.clone(),
            SecretSource::Dynamic(resolver) => match resolver() {
                Ok(value) => value,
                Err(error) => {
                    warn!(secret = name, %error, "secret resolver failed; skipping");
                    return None;
                }
            },
        };

        let observed = self.observed_values.entry(name.to_owned()).or_default();
        if !observed.contains(&value) {
            observed.push(value.clone());
        }
        Some(value)
    }
}

/// Quotes a value for safe interpolation into a POSIX shell line.
fn shell_quote(value: &str) -> String {
    let safe = value
        .chars()
        .all(|character| character.is_ascii_alphanumeric() || "_-./:@%+=,".contains(character));
    if safe && !value.is_empty() {
        value.to_owned()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}
