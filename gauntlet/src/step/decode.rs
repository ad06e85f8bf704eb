//! Decode the final message: base64 wrapped around ROT13.

use std::fmt::Write as _;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::time::Instant;

use super::{Command, RenderContext, Step, StepEvent, StepKind};

const PLAINTEXT: &str = "persistence beats talent when talent gives up";

/// Rotates ASCII letters by 13 places.
#[must_use]
pub fn rot13(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'a'..='z' => char::from(b'a' + (c as u8 - b'a' + 13) % 26),
            'A'..='Z' => char::from(b'A' + (c as u8 - b'A' + 13) % 26),
            _ => c,
        })
        .collect()
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Final puzzle before the success screen.
#[derive(Debug)]
pub struct Decode {
    ciphertext: String,
    attempts: usize,
    feedback: Option<String>,
    completed: bool,
}

impl Decode {
    /// Creates the step with the fixed message.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ciphertext: STANDARD.encode(rot13(PLAINTEXT)),
            attempts: 0,
            feedback: None,
            completed: false,
        }
    }

    /// The encoded message shown to the candidate.
    #[must_use]
    pub fn ciphertext(&self) -> &str {
        &self.ciphertext
    }
}

impl Default for Decode {
    fn default() -> Self {
        Self::new()
    }
}

impl Step for Decode {
    fn title(&self) -> &str {
        "Step 6: Decode the message"
    }

    fn kind(&self) -> StepKind {
        StepKind::Decode
    }

    fn init(&mut self, _now: Instant) -> Option<Command> {
        None
    }

    fn handle(&mut self, event: &StepEvent) -> Option<Command> {
        let StepEvent::Input(line) = event else {
            return None;
        };
        if self.completed {
            return None;
        }
        self.attempts += 1;
        if normalize(line) == PLAINTEXT {
            self.completed = true;
        } else {
            self.feedback = Some(match self.attempts {
                1 => "Not quite.".to_string(),
                2 => "Hint: the outer layer is a very common encoding.".to_string(),
                _ => "Hint: after the outer layer, every letter moved 13 places.".to_string(),
            });
        }
        None
    }

    fn is_completed(&self) -> bool {
        self.completed
    }

    fn render(&self, ctx: &RenderContext<'_>) -> String {
        let theme = ctx.theme;
        let mut out = String::from("One last thing. What does this say?\n\n");
        let _ = writeln!(out, "    {}", theme.accent(&self.ciphertext));
        if let Some(feedback) = &self.feedback {
            let _ = writeln!(out, "\n{}", theme.warn(feedback));
        }
        out.push_str("\nType the decoded message and press Enter.\n");
        out
    }
}
