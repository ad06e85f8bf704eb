//! Password with progressively revealed constraints.

use std::fmt::Write as _;

use tokio::time::Instant;

use super::{Command, RenderContext, Step, StepEvent, StepKind};

const SPECIAL_CHARS: &str = r#"!@#$%^&*()-_=+[]{};:'",.<>/?"#;
const FOUNDERS: [&str; 4] = ["SIMON", "TOMAS", "NICOLAS", "EUGENIO"];
const LANGUAGES: [&str; 15] = [
    "PYTHON",
    "JAVA",
    "JAVASCRIPT",
    "C",
    "CPP",
    "CSHARP",
    "PHP",
    "RUBY",
    "GO",
    "SWIFT",
    "KOTLIN",
    "RUST",
    "SCALA",
    "PERL",
    "TYPESCRIPT",
];

struct Rule {
    description: &'static str,
    check: fn(&str) -> Result<(), String>,
}

fn roman_value(c: char) -> Option<u32> {
    match c {
        'I' => Some(1),
        'V' => Some(5),
        'X' => Some(10),
        'L' => Some(50),
        'C' => Some(100),
        'D' => Some(500),
        'M' => Some(1000),
        _ => None,
    }
}

fn min_length(s: &str) -> Result<(), String> {
    let n = s.chars().count();
    if n < 8 {
        return Err(format!("Too short: {n}/8 characters"));
    }
    Ok(())
}

fn has_digit(s: &str) -> Result<(), String> {
    if s.chars().any(|c| c.is_ascii_digit()) {
        return Ok(());
    }
    Err("No numbers found".to_string())
}

fn has_special(s: &str) -> Result<(), String> {
    if s.chars().any(|c| SPECIAL_CHARS.contains(c)) {
        return Ok(());
    }
    Err("No special characters found".to_string())
}

fn digit_sum(s: &str) -> Result<(), String> {
    let sum: u32 = s.chars().filter_map(|c| c.to_digit(10)).sum();
    if sum != 35 {
        return Err(format!("Sum is {sum}, not 35"));
    }
    Ok(())
}

fn has_roman(s: &str) -> Result<(), String> {
    if s.chars().any(|c| roman_value(c).is_some()) {
        return Ok(());
    }
    Err("No Roman numerals found".to_string())
}

fn roman_sum(s: &str) -> Result<(), String> {
    let sum: u32 = s.chars().filter_map(roman_value).sum();
    if sum <= 10 || sum >= 100 {
        return Err(format!("Roman numeral sum is {sum}, must be < 100 and > 10"));
    }
    Ok(())
}

fn has_founder(s: &str) -> Result<(), String> {
    if FOUNDERS.iter().any(|f| s.contains(f)) {
        return Ok(());
    }
    Err("No founder name found".to_string())
}

fn has_language(s: &str) -> Result<(), String> {
    let upper = s.to_uppercase();
    if LANGUAGES.iter().any(|l| upper.contains(l)) {
        return Ok(());
    }
    Err("No programming language found".to_string())
}

fn has_triangle_area(s: &str) -> Result<(), String> {
    // (4 * 10) / 2
    if s.to_lowercase().contains("twenty") {
        return Ok(());
    }
    Err("Missing the area of the triangle".to_string())
}

const RULES: [Rule; 9] = [
    Rule {
        description: "Password must be at least 8 characters long",
        check: min_length,
    },
    Rule {
        description: "Password must contain at least 1 number",
        check: has_digit,
    },
    Rule {
        description: "Password must contain at least 1 special character",
        check: has_special,
    },
    Rule {
        description: "The sum of all numbers must be 35",
        check: digit_sum,
    },
    Rule {
        description: "Password must contain Roman numerals",
        check: has_roman,
    },
    Rule {
        description: "The Roman numerals must sum to less than 100 and more than 10",
        check: roman_sum,
    },
    Rule {
        description: "Password must contain one of the founders' names in uppercase",
        check: has_founder,
    },
    Rule {
        description: "Password must contain a programming language",
        check: has_language,
    },
    Rule {
        description: "Password must contain the area of a triangle with height 10 and base 4 (lowercase text)",
        check: has_triangle_area,
    },
];

/// Finds a password that satisfies every rule. Rules only become visible
/// once all earlier ones hold.
#[derive(Debug)]
pub struct Password {
    attempt: String,
    revealed: usize,
    error: Option<String>,
    completed: bool,
}

impl Password {
    /// Creates the step with the first rule visible.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            attempt: String::new(),
            revealed: 1,
            error: None,
            completed: false,
        }
    }

    /// Number of rules currently shown.
    #[must_use]
    pub const fn revealed(&self) -> usize {
        self.revealed
    }

    fn submit(&mut self, attempt: &str) {
        self.attempt = attempt.to_string();
        let first_unmet = RULES
            .iter()
            .enumerate()
            .find_map(|(i, rule)| (rule.check)(attempt).err().map(|e| (i, e)));

        match first_unmet {
            Some((i, err)) => {
                if i + 1 > self.revealed {
                    self.revealed = i + 1;
                    self.error = Some(format!("New constraint revealed! {err}"));
                } else {
                    self.error = Some(err);
                }
            }
            None => {
                self.revealed = RULES.len();
                self.error = None;
                self.completed = true;
            }
        }
    }
}

impl Default for Password {
    fn default() -> Self {
        Self::new()
    }
}

impl Step for Password {
    fn title(&self) -> &str {
        "Step 2: Create a password"
    }

    fn kind(&self) -> StepKind {
        StepKind::Password
    }

    fn init(&mut self, _now: Instant) -> Option<Command> {
        None
    }

    fn handle(&mut self, event: &StepEvent) -> Option<Command> {
        if let StepEvent::Input(line) = event {
            if !self.completed {
                self.submit(line);
            }
        }
        None
    }

    fn is_completed(&self) -> bool {
        self.completed
    }

    fn render(&self, ctx: &RenderContext<'_>) -> String {
        let theme = ctx.theme;
        let mut out = String::from("Create a password that meets all constraints:\n\n");
        for rule in RULES.iter().take(self.revealed) {
            let line = if (rule.check)(&self.attempt).is_ok() {
                theme.good(&format!("[x] {}", rule.description))
            } else {
                theme.bad(&format!("[ ] {}", rule.description))
            };
            let _ = writeln!(out, "  {line}");
        }
        if !self.attempt.is_empty() {
            let _ = writeln!(out, "\nLast attempt: {}", theme.accent(&self.attempt));
        }
        if let Some(error) = &self.error {
            let _ = writeln!(out, "\n{}", theme.warn(error));
        }
        out.push_str("\nEnter a password and press Enter.\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // digits sum to 35; roman letters X + V + the I of EUGENIO = 16
    const WINNING: &str = "9998!XVtwentyRUSTEUGENIO";

    fn submit(step: &mut Password, s: &str) {
        step.handle(&StepEvent::Input(s.to_string()));
    }

    #[test]
    fn test_reveals_progressively() {
        let mut step = Password::new();
        submit(&mut step, "short");
        assert_eq!(step.revealed(), 1);
        assert_eq!(step.error.as_deref(), Some("Too short: 5/8 characters"));

        submit(&mut step, "longenough");
        assert_eq!(step.revealed(), 2);
        assert!(!step.is_completed());
    }

    #[test]
    fn test_revealed_never_shrinks() {
        let mut step = Password::new();
        submit(&mut step, "longenough1!");
        let revealed = step.revealed();
        submit(&mut step, "x");
        assert_eq!(step.revealed(), revealed);
    }

    #[test]
    fn test_roman_sum_bounds() {
        assert!((RULES[5].check)("XI").is_ok());
        assert!((RULES[5].check)("X").is_err());
        assert!((RULES[5].check)("C").is_err());
    }

    #[test]
    fn test_founder_requires_uppercase() {
        assert!((RULES[6].check)("tomas").is_err());
        assert!((RULES[6].check)("xTOMASx").is_ok());
    }

    #[test]
    fn test_full_password_completes() {
        let mut step = Password::new();
        submit(&mut step, WINNING);
        assert!(step.is_completed(), "error: {:?}", step.error);
        assert_eq!(step.revealed(), RULES.len());
    }
}
