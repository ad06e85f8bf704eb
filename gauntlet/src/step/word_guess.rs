//! Five-letter word guessing.

use std::fmt::Write as _;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::Instant;

use super::{Command, RenderContext, Step, StepEvent, StepKind};

const WORD_LEN: usize = 5;
const MAX_GUESSES: usize = 6;

/// Candidate words with an acrostic hint for each.
const WORDS: [(&str, &str); 16] = [
    ("asado", "Ahora salimos a disfrutar olores"),
    ("birra", "Bajá inmediatamente Ricardo! Retrasas amigos"),
    ("morfi", "Mirá, Oscar recién freía ingredientes"),
    ("guita", "Gastamos últimamente ingresos tantos, amigo"),
    ("pibes", "Papá invita bebidas esta semana"),
    ("chori", "Compramos hamburguesas ¡o rica inquisición!"),
    ("locro", "Llevamos ollas con rica ofrenda"),
    ("garca", "Gastón ahora reclama comida ajena"),
    ("mango", "Mamá anduvo negociando ganancias obvias"),
    ("piola", "Pablo invita otra linda aventura"),
    ("yerba", "Ya estamos reuniendo bebidas argentinas"),
    ("flaco", "Fernando llegó a comprar ovejas"),
    ("posta", "Pablo ordena sequía, tormenta aparece"),
    ("amigo", "Alguien mencionó interesantes grandes obstáculos"),
    ("cheto", "Cada hermano evita tomar ómnibus"),
    ("mates", "Muchos argentinos toman esta semana"),
];

/// Per-letter verdict for one guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    /// Right letter, right place.
    Correct,
    /// Letter occurs elsewhere in the answer.
    Present,
    /// Letter does not occur (or all occurrences are accounted for).
    Absent,
}

/// Scores a guess against the answer, accounting for repeated letters.
#[must_use]
pub fn score(guess: &str, answer: &str) -> [Mark; WORD_LEN] {
    let guess: Vec<char> = guess.chars().collect();
    let answer: Vec<char> = answer.chars().collect();
    let mut marks = [Mark::Absent; WORD_LEN];
    let mut unmatched: Vec<char> = Vec::with_capacity(WORD_LEN);

    for i in 0..WORD_LEN {
        if guess.get(i) == answer.get(i) {
            marks[i] = Mark::Correct;
        } else if let Some(&c) = answer.get(i) {
            unmatched.push(c);
        }
    }
    for i in 0..WORD_LEN {
        if marks[i] == Mark::Correct {
            continue;
        }
        if let Some(pos) = guess.get(i).and_then(|g| unmatched.iter().position(|c| c == g)) {
            unmatched.swap_remove(pos);
            marks[i] = Mark::Present;
        }
    }
    marks
}

/// Guess the secret word in six tries.
#[derive(Debug)]
pub struct WordGuess {
    answer: &'static str,
    hint: &'static str,
    guesses: Vec<(String, [Mark; WORD_LEN])>,
    feedback: Option<String>,
    completed: bool,
    exhausted: bool,
}

impl WordGuess {
    /// Picks the word with a seeded RNG.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        Self::with_index(rng.random_range(0..WORDS.len()))
    }

    /// Uses a fixed word from the list (wraps around).
    #[must_use]
    pub fn with_index(index: usize) -> Self {
        let (answer, hint) = WORDS[index % WORDS.len()];
        Self {
            answer,
            hint,
            guesses: Vec::with_capacity(MAX_GUESSES),
            feedback: None,
            completed: false,
            exhausted: false,
        }
    }

    /// The secret word.
    #[must_use]
    pub const fn answer(&self) -> &'static str {
        self.answer
    }

    fn guess(&mut self, raw: &str) -> Option<Command> {
        let guess = raw.trim().to_lowercase();
        if guess.chars().count() != WORD_LEN || !guess.chars().all(|c| c.is_ascii_alphabetic()) {
            self.feedback = Some(format!("Guesses must be {WORD_LEN} letters."));
            return None;
        }

        let marks = score(&guess, self.answer);
        let won = guess == self.answer;
        self.guesses.push((guess, marks));
        if won {
            self.completed = true;
            self.feedback = Some("Correct!".to_string());
            return None;
        }
        if self.guesses.len() >= MAX_GUESSES {
            self.exhausted = true;
            return Some(Command::Fail(format!(
                "You've run out of guesses! The word was: {}",
                self.answer
            )));
        }
        self.feedback = None;
        None
    }
}

impl Step for WordGuess {
    fn title(&self) -> &str {
        "Step 1: Guess the word"
    }

    fn kind(&self) -> StepKind {
        StepKind::WordGuess
    }

    fn init(&mut self, _now: Instant) -> Option<Command> {
        None
    }

    fn handle(&mut self, event: &StepEvent) -> Option<Command> {
        match event {
            StepEvent::Input(line) if !self.completed && !self.exhausted => self.guess(line),
            _ => None,
        }
    }

    fn is_completed(&self) -> bool {
        self.completed
    }

    fn render(&self, ctx: &RenderContext<'_>) -> String {
        let theme = ctx.theme;
        let mut out = String::new();
        let _ = writeln!(out, "Hint: {}", theme.dim(self.hint));
        out.push('\n');
        for (guess, marks) in &self.guesses {
            out.push_str("  ");
            for (c, mark) in guess.chars().zip(marks) {
                let cell = format!("[{}]", c.to_ascii_uppercase());
                let styled = match mark {
                    Mark::Correct => theme.good(&cell),
                    Mark::Present => theme.warn(&cell),
                    Mark::Absent => theme.dim(&cell),
                };
                out.push_str(&styled);
            }
            if !theme.is_ansi() {
                let legend: String = marks
                    .iter()
                    .map(|m| match m {
                        Mark::Correct => '=',
                        Mark::Present => '~',
                        Mark::Absent => '.',
                    })
                    .collect();
                let _ = write!(out, "  {legend}");
            }
            out.push('\n');
        }
        for _ in self.guesses.len()..MAX_GUESSES {
            out.push_str("  [ ][ ][ ][ ][ ]\n");
        }
        out.push('\n');
        if let Some(feedback) = &self.feedback {
            let _ = writeln!(out, "{}", theme.warn(feedback));
        }
        let _ = writeln!(
            out,
            "Type a {WORD_LEN}-letter word and press Enter ({} left).",
            MAX_GUESSES - self.guesses.len()
        );
        out
    }
}
