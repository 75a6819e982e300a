//! Interactive input: the login password and yes/no confirmations.

use crate::error::ClientError;
use dialoguer::{Confirm, Password};

/// Source of the server password when none was given on the command line
pub trait CredentialProvider {
    fn password(&self) -> Result<String, ClientError>;
}

/// Prompts on the terminal without echoing the input
pub struct TerminalPrompt;

impl CredentialProvider for TerminalPrompt {
    fn password(&self) -> Result<String, ClientError> {
        println!("Authentication required");
        Password::new()
            .with_prompt("Password")
            .allow_empty_password(true)
            .interact()
            .map_err(|e| ClientError::Io(std::io::Error::other(e.to_string())))
    }
}

/// Fixed password, for tests that drive the login challenge
#[cfg(test)]
pub struct StaticPassword(pub String);

#[cfg(test)]
impl CredentialProvider for StaticPassword {
    fn password(&self) -> Result<String, ClientError> {
        Ok(self.0.clone())
    }
}

/// Ask a yes/no question on the terminal
pub fn confirm(prompt: &str, default: bool) -> Result<bool, ClientError> {
    Confirm::new()
        .with_prompt(prompt)
        .default(default)
        .interact()
        .map_err(|e| ClientError::Io(std::io::Error::other(e.to_string())))
}
