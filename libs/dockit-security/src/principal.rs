use std::fmt;

/// The acting identity a query is compiled for.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Principal(String);

impl Principal {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }

    /// The unauthenticated guest identity.
    #[must_use]
    pub fn guest() -> Self {
        Self::new("Guest")
    }

    #[must_use]
    pub fn is_guest(&self) -> bool {
        self.0 == "Guest"
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Principal {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guest_is_recognized() {
        assert!(Principal::guest().is_guest());
        assert!(!Principal::new("jane@example.com").is_guest());
    }
}
