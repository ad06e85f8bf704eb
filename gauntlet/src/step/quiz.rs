//! Timed arithmetic quiz.
//!
//! The only self-scheduling step: `init` asks for a wake-up at the time
//! limit, and expiry below the pass threshold is reported as
//! [`Command::Fail`] rather than through `is_completed`.

use std::fmt::Write as _;
use std::time::Duration;

use tokio::time::Instant;

use super::{Command, RenderContext, Step, StepEvent, StepKind};
use crate::presentation::clock;

const QUESTIONS: [(&str, u32); 10] = [
    ("What is 7 + 12?", 19),
    ("What is 15 + 4?", 19),
    ("What is 8 + 9?", 17),
    ("What is 3 + 5 - 2?", 6),
    ("What is 12 - 4 + 7?", 15),
    ("What is 3 × 5 + 2?", 17),
    ("What is 8 + 2 × 6?", 20),
    ("What is 4 × 3 - 7?", 5),
    ("What is 18 - 6 × 2?", 6),
    ("What is 3 × (4 + 2)?", 18),
];

/// Number of questions in the quiz.
pub const QUESTION_COUNT: usize = QUESTIONS.len();

const CHOICES: usize = 4;

/// Four distinct positive options including `answer`, rotated by `seed`.
fn choices_for(answer: u32, seed: usize) -> [u32; CHOICES] {
    let mut options = [answer; CHOICES];
    let mut filled = 1;
    for offset in [3_i64, 1, -2, 2, -1, 4, 5] {
        if filled == CHOICES {
            break;
        }
        let candidate = i64::from(answer) + offset;
        let Ok(candidate) = u32::try_from(candidate) else {
            continue;
        };
        if candidate > 0 && !options[..filled].contains(&candidate) {
            options[filled] = candidate;
            filled += 1;
        }
    }
    options.rotate_left(seed % CHOICES);
    options
}

/// Ten questions against the clock.
#[derive(Debug)]
pub struct Quiz {
    time_limit: Duration,
    pass_threshold: usize,
    current: usize,
    correct: usize,
    deadline: Option<Instant>,
    finished: bool,
    completed: bool,
    feedback: Option<String>,
}

impl Quiz {
    /// Creates a quiz with the given time limit and pass mark.
    #[must_use]
    pub const fn new(time_limit: Duration, pass_threshold: usize) -> Self {
        Self {
            time_limit,
            pass_threshold,
            current: 0,
            correct: 0,
            deadline: None,
            finished: false,
            completed: false,
            feedback: None,
        }
    }

    /// Number of correct answers so far.
    #[must_use]
    pub const fn correct(&self) -> usize {
        self.correct
    }

    /// Options offered for the current question.
    #[must_use]
    pub fn current_choices(&self) -> Option<[u32; CHOICES]> {
        QUESTIONS
            .get(self.current)
            .map(|(_, answer)| choices_for(*answer, self.current))
    }

    fn fail(&mut self, prefix: &str) -> Option<Command> {
        self.finished = true;
        let reason = format!(
            "{prefix} You got {} out of {QUESTION_COUNT} correct. Need at least {} to pass.",
            self.correct, self.pass_threshold
        );
        self.feedback = Some(reason.clone());
        Some(Command::Fail(reason))
    }

    fn answer(&mut self, line: &str) -> Option<Command> {
        let choices = self.current_choices()?;
        let picked = line
            .trim()
            .parse::<usize>()
            .ok()
            .filter(|n| (1..=CHOICES).contains(n));
        let Some(picked) = picked else {
            self.feedback = Some(format!("Answer with a number from 1 to {CHOICES}."));
            return None;
        };

        if choices[picked - 1] == QUESTIONS[self.current].1 {
            self.correct += 1;
        }
        self.current += 1;
        self.feedback = None;

        if self.correct >= self.pass_threshold {
            self.finished = true;
            self.completed = true;
            return None;
        }
        if self.current >= QUESTION_COUNT {
            return self.fail("Quiz over!");
        }
        None
    }

    fn expire(&mut self, now: Instant) -> Option<Command> {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                if self.correct >= self.pass_threshold {
                    self.finished = true;
                    self.completed = true;
                    None
                } else {
                    self.fail("Time's up!")
                }
            }
            _ => None,
        }
    }
}

impl Step for Quiz {
    fn title(&self) -> &str {
        "Step 3: Quick maths"
    }

    fn kind(&self) -> StepKind {
        StepKind::Quiz
    }

    fn init(&mut self, now: Instant) -> Option<Command> {
        self.deadline = Some(now + self.time_limit);
        Some(Command::Schedule(self.time_limit))
    }

    fn handle(&mut self, event: &StepEvent) -> Option<Command> {
        if self.finished {
            return None;
        }
        match event {
            StepEvent::Input(line) => self.answer(line),
            StepEvent::Tick(now) => self.expire(*now),
        }
    }

    fn is_completed(&self) -> bool {
        self.completed
    }

    fn render(&self, ctx: &RenderContext<'_>) -> String {
        let theme = ctx.theme;
        let mut out = String::new();
        if let Some(deadline) = self.deadline {
            let left = deadline.saturating_duration_since(ctx.now);
            let _ = writeln!(out, "Time remaining: {}", theme.warn(&clock(left)));
        }
        let _ = writeln!(
            out,
            "Score: {}/{QUESTION_COUNT} (need {})\n",
            self.correct, self.pass_threshold
        );

        if let (false, Some((question, _)), Some(choices)) =
            (self.finished, QUESTIONS.get(self.current), self.current_choices())
        {
            let _ = writeln!(
                out,
                "Question {}/{QUESTION_COUNT}: {}\n",
                self.current + 1,
                theme.bold(question)
            );
            for (i, choice) in choices.iter().enumerate() {
                let _ = writeln!(out, "  {}) {choice}", i + 1);
            }
            out.push_str("\nType the number of your answer and press Enter.\n");
        }
        if let Some(feedback) = &self.feedback {
            let _ = writeln!(out, "\n{}", theme.warn(feedback));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn correct_option(quiz: &Quiz) -> String {
        let choices = quiz.current_choices().unwrap();
        let answer = QUESTIONS[quiz.current].1;
        let idx = choices.iter().position(|c| *c == answer).unwrap();
        (idx + 1).to_string()
    }

    fn wrong_option(quiz: &Quiz) -> String {
        let choices = quiz.current_choices().unwrap();
        let answer = QUESTIONS[quiz.current].1;
        let idx = choices.iter().position(|c| *c != answer).unwrap();
        (idx + 1).to_string()
    }

    #[test]
    fn test_choices_are_distinct_and_include_answer() {
        for (i, (_, answer)) in QUESTIONS.iter().enumerate() {
            let choices = choices_for(*answer, i);
            assert!(choices.contains(answer));
            for (a, x) in choices.iter().enumerate() {
                assert!(*x > 0);
                assert!(!choices[a + 1..].contains(x));
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_init_schedules_time_limit() {
        let mut quiz = Quiz::new(Duration::from_secs(60), 7);
        assert_eq!(
            quiz.init(Instant::now()),
            Some(Command::Schedule(Duration::from_secs(60)))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_seven_correct_completes() {
        let mut quiz = Quiz::new(Duration::from_secs(60), 7);
        quiz.init(Instant::now());
        for _ in 0..7 {
            let line = correct_option(&quiz);
            assert_eq!(quiz.handle(&StepEvent::Input(line)), None);
        }
        assert!(quiz.is_completed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_six_correct_then_expiry_fails() {
        let start = Instant::now();
        let mut quiz = Quiz::new(Duration::from_secs(60), 7);
        quiz.init(start);
        for _ in 0..6 {
            let line = correct_option(&quiz);
            quiz.handle(&StepEvent::Input(line));
        }
        assert_eq!(
            quiz.handle(&StepEvent::Tick(start + Duration::from_secs(30))),
            None
        );
        let cmd = quiz.handle(&StepEvent::Tick(start + Duration::from_secs(60)));
        let Some(Command::Fail(reason)) = cmd else {
            panic!("expected failure, got {cmd:?}");
        };
        assert!(reason.contains("6 out of 10"), "{reason}");
        assert!(!quiz.is_completed());
        // the failure is reported once
        assert_eq!(
            quiz.handle(&StepEvent::Tick(start + Duration::from_secs(61))),
            None
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_answers_run_out_below_threshold() {
        let mut quiz = Quiz::new(Duration::from_secs(60), 7);
        quiz.init(Instant::now());
        for _ in 0..9 {
            let line = wrong_option(&quiz);
            assert_eq!(quiz.handle(&StepEvent::Input(line)), None);
        }
        let line = wrong_option(&quiz);
        let cmd = quiz.handle(&StepEvent::Input(line));
        assert!(matches!(cmd, Some(Command::Fail(ref r)) if r.contains("0 out of 10")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_answer_is_feedback_only() {
        let mut quiz = Quiz::new(Duration::from_secs(60), 7);
        quiz.init(Instant::now());
        quiz.handle(&StepEvent::Input("9".to_string()));
        assert_eq!(quiz.current, 0);
        assert!(quiz.feedback.is_some());
    }
}
