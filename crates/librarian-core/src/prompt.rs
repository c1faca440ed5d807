use std::collections::VecDeque;

/// Capability used to ask the user for a library password.
///
/// Returning `None` is a refusal: the caller gives up on the library instead
/// of asking again.
pub trait PasswordPrompt {
    fn request(&mut self, message: &str) -> Option<String>;
}

impl<F> PasswordPrompt for F
where
    F: FnMut(&str) -> Option<String>,
{
    fn request(&mut self, message: &str) -> Option<String> {
        self(message)
    }
}

/// Prompt that replays canned answers, then refuses. Records every message it
/// was shown so tests can assert on the escalation.
#[derive(Debug, Default, Clone)]
pub struct ScriptedPrompt {
    replies: VecDeque<Option<String>>,
    messages: Vec<String>,
}

impl ScriptedPrompt {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: replies.into_iter().map(|s| Some(s.into())).collect(),
            messages: Vec::new(),
        }
    }

    /// A prompt that refuses immediately.
    pub fn refusing() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }
}

impl PasswordPrompt for ScriptedPrompt {
    fn request(&mut self, message: &str) -> Option<String> {
        self.messages.push(message.to_string());
        self.replies.pop_front().flatten()
    }
}
