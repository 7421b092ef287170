//! Command invocations prior to signing.

/// Parameter keys added by the signer that callers may not supply.
pub const RESERVED_KEYS: [&str; 4] = ["apikey", "command", "response", "signature"];

/// A named command together with its parameters.
///
/// Keys are lowercased on insertion and empty values are dropped, so two
/// requests that differ only in key case or in empty optional arguments sign
/// identically.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CommandRequest {
    name: String,
    parameters: Vec<(String, String)>,
}

impl CommandRequest {
    /// Starts a request for `name`. The name is trimmed but otherwise kept as
    /// given, since the server matches command names case-sensitively.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into().trim().to_owned(),
            parameters: Vec::new(),
        }
    }

    /// Adds a parameter. Empty values are ignored.
    #[must_use]
    pub fn param(mut self, key: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.push(key.as_ref(), value.into());
        self
    }

    /// Adds an optional parameter, skipping it entirely when absent or empty.
    #[must_use]
    pub fn optional(self, key: impl AsRef<str>, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(inner) => self.param(key, inner),
            None => self,
        }
    }

    /// Extends the request with every pair from `pairs`.
    #[must_use]
    pub fn params<K, V>(mut self, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        for (key, value) in pairs {
            self.push(key.as_ref(), value.into());
        }
        self
    }

    fn push(&mut self, key: &str, value: String) {
        let normalised = key.trim().to_lowercase();
        if normalised.is_empty() || value.is_empty() {
            return;
        }
        self.parameters.push((normalised, value));
    }

    /// Returns the command name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns parameters in insertion order with lowercased keys.
    #[must_use]
    pub fn parameters(&self) -> &[(String, String)] {
        &self.parameters
    }

    /// Looks up the first value stored for `key`, ignoring case.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        let wanted = key.to_lowercase();
        self.parameters
            .iter()
            .find(|(candidate, _)| *candidate == wanted)
            .map(|(_, value)| value.as_str())
    }

    /// Returns `true` when no parameters are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub(crate) fn reserved_key(&self) -> Option<&str> {
        self.parameters
            .iter()
            .map(|(key, _)| key.as_str())
            .find(|key| RESERVED_KEYS.contains(key))
    }
}
