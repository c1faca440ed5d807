use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

/// Library password. Zeroized on drop and never printed.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Password(String);

impl Password {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Treats empty input as "no password".
    pub fn from_input(input: impl Into<String>) -> Option<Self> {
        let password = Self::new(input);
        if password.is_empty() {
            None
        } else {
            Some(password)
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Password {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Password {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(***)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_is_redacted() {
        let password = Password::from("hunter2");
        assert_eq!(format!("{password:?}"), "Password(***)");
    }

    #[test]
    fn empty_input_means_no_password() {
        assert!(Password::from_input("").is_none());
        assert_eq!(
            Password::from_input("s3cret").map(|p| p.as_bytes().to_vec()),
            Some(b"s3cret".to_vec())
        );
    }
}
