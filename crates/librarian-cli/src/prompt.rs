use std::io;

use color_eyre::{eyre::bail, Result};
use librarian_core::{Password, PasswordPrompt};
use tracing::debug;

/// Reads passwords from the terminal without echo. An empty reply, or a
/// terminal that cannot be read, counts as a refusal.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompt;

impl PasswordPrompt for TerminalPrompt {
    fn request(&mut self, message: &str) -> Option<String> {
        reply_or_refusal(rpassword::prompt_password(format!("{message} ")))
    }
}

fn reply_or_refusal(reply: io::Result<String>) -> Option<String> {
    match reply {
        Ok(input) if input.is_empty() => None,
        Ok(input) => Some(input),
        Err(err) => {
            debug!("password prompt unavailable: {err}");
            None
        }
    }
}

/// Asks for a new password twice and requires both answers to match.
pub fn new_password(prompt: &mut dyn PasswordPrompt, name: &str) -> Result<Password> {
    let Some(first) = prompt.request(&format!("New password for library \"{name}\":")) else {
        bail!("no password entered for library \"{name}\"");
    };
    let Some(second) = prompt.request("Repeat the password:") else {
        bail!("password confirmation cancelled");
    };
    if first != second {
        bail!("passwords do not match");
    }
    match Password::from_input(first) {
        Some(password) => Ok(password),
        None => bail!("the password cannot be empty"),
    }
}

#[cfg(test)]
mod tests {
    use librarian_core::prompt::ScriptedPrompt;

    use super::*;

    #[test]
    fn empty_or_failed_reply_is_refusal() {
        assert_eq!(reply_or_refusal(Ok(String::new())), None);
        assert_eq!(
            reply_or_refusal(Err(io::Error::new(io::ErrorKind::Other, "no tty"))),
            None
        );
        assert_eq!(reply_or_refusal(Ok("pw".into())).as_deref(), Some("pw"));
    }

    #[test]
    fn new_password_needs_matching_confirmation() {
        let mut prompt = ScriptedPrompt::new(["hunter2", "hunter2"]);
        let password = new_password(&mut prompt, "Secret").expect("matching entries");
        assert_eq!(password, Password::from("hunter2"));
        assert!(prompt.messages()[0].contains("\"Secret\""));

        let mut prompt = ScriptedPrompt::new(["hunter2", "hunter3"]);
        let err = new_password(&mut prompt, "Secret").expect_err("mismatch");
        assert!(err.to_string().contains("do not match"));
    }

    #[test]
    fn new_password_refusal_is_an_error() {
        let mut prompt = ScriptedPrompt::refusing();
        assert!(new_password(&mut prompt, "Secret").is_err());
        assert_eq!(prompt.messages().len(), 1);
    }
}
