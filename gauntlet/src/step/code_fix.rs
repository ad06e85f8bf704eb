//! Repair a broken async snippet.
//!
//! Submissions are checked with a textual heuristic; nothing is executed.

use std::fmt::Write as _;

use tokio::time::Instant;

use super::{Command, RenderContext, Step, StepEvent, StepKind};

/// The snippet shown to the candidate.
pub const BROKEN_CODE: &str = "\
async function fetchUserData(users) {
  const userData = [];

  for (const user of users) {
    fetchUser(user).then(data => {
      userData.push(data);
    });
  }

  return userData;
}

// Mock function (don't modify)
function fetchUser(user) {
  return Promise.resolve({ id: user, name: 'User ' + user });
}";

/// Returns `true` if the submission waits for the fetches.
#[must_use]
pub fn is_fixed(code: &str) -> bool {
    code.contains("Promise.all") || code.contains("await fetchUser")
}

/// Edit buffer plus submission state.
#[derive(Debug, Default)]
pub struct CodeFix {
    buffer: Vec<String>,
    feedback: Option<String>,
    completed: bool,
}

impl CodeFix {
    /// Creates the step with an empty buffer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buffer: Vec::new(),
            feedback: None,
            completed: false,
        }
    }

    /// Current buffer contents.
    #[must_use]
    pub fn buffer(&self) -> String {
        self.buffer.join("\n")
    }

    fn edit(&mut self, line: &str) {
        match line.trim() {
            ":submit" => {
                if self.buffer.is_empty() {
                    self.feedback = Some("Nothing to submit yet.".to_string());
                } else if is_fixed(&self.buffer()) {
                    self.completed = true;
                    self.feedback = Some("Well done! The async code is fixed.".to_string());
                } else {
                    self.feedback = Some(
                        "Still broken: the function returns before the users are fetched."
                            .to_string(),
                    );
                }
            }
            ":reset" => {
                self.buffer = BROKEN_CODE.lines().map(str::to_string).collect();
                self.feedback = Some("Buffer reset to the original code.".to_string());
            }
            ":clear" => {
                self.buffer.clear();
                self.feedback = None;
            }
            ":undo" => {
                self.buffer.pop();
                self.feedback = None;
            }
            _ => {
                self.buffer.push(line.to_string());
                self.feedback = None;
            }
        }
    }
}

impl Step for CodeFix {
    fn title(&self) -> &str {
        "Step 4: Fix the code"
    }

    fn kind(&self) -> StepKind {
        StepKind::CodeFix
    }

    fn init(&mut self, _now: Instant) -> Option<Command> {
        None
    }

    fn handle(&mut self, event: &StepEvent) -> Option<Command> {
        if let StepEvent::Input(line) = event {
            if !self.completed {
                self.edit(line);
            }
        }
        None
    }

    fn is_completed(&self) -> bool {
        self.completed
    }

    fn render(&self, ctx: &RenderContext<'_>) -> String {
        let theme = ctx.theme;
        let mut out = String::from("This function should return every user's data, but it doesn't:\n\n");
        for line in BROKEN_CODE.lines() {
            let _ = writeln!(out, "    {}", theme.accent(line));
        }
        out.push_str("\nYour version:\n\n");
        if self.buffer.is_empty() {
            let _ = writeln!(out, "    {}", theme.dim("(empty)"));
        }
        for (i, line) in self.buffer.iter().enumerate() {
            let _ = writeln!(out, "{:>3} {line}", i + 1);
        }
        if let Some(feedback) = &self.feedback {
            let style = if self.completed { theme.good(feedback) } else { theme.warn(feedback) };
            let _ = writeln!(out, "\n{style}");
        }
        out.push_str(&theme.dim(
            "\nType lines to append. :submit to check, :undo drops the last line, :reset loads the original, :clear empties.",
        ));
        out.push('\n');
        out
    }
}
