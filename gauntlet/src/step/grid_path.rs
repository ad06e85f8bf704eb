//! Route through an obstacle grid with right/down moves.

use std::fmt::Write as _;

use tokio::time::Instant;

use super::{Command, RenderContext, Step, StepEvent, StepKind};

const SIZE: usize = 6;

/// `1` marks an obstacle. Indexed `GRID[y][x]`.
const GRID: [[u8; SIZE]; SIZE] = [
    [0, 0, 1, 0, 0, 0],
    [0, 1, 0, 0, 1, 0],
    [0, 0, 0, 1, 0, 0],
    [1, 0, 0, 0, 0, 1],
    [0, 1, 0, 0, 1, 0],
    [0, 0, 0, 0, 0, 0],
];

/// Why a submitted path was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// Something other than `R` or `D`.
    InvalidMove(char),
    /// No moves given.
    Empty,
    /// Walked off the grid.
    OutOfBounds,
    /// Stepped onto an obstacle at `(x, y)`.
    Obstacle(usize, usize),
    /// Valid walk that stops short.
    WrongEnd(usize, usize),
}

impl std::fmt::Display for PathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidMove(c) => write!(f, "Path should contain only \"R\" or \"D\" moves (found '{c}')"),
            Self::Empty => f.write_str("Enter at least one move"),
            Self::OutOfBounds => f.write_str("Path goes out of bounds"),
            Self::Obstacle(x, y) => write!(f, "Path hits an obstacle at position ({x},{y})"),
            Self::WrongEnd(x, y) => write!(
                f,
                "Path ends at ({x},{y}), not the destination ({},{})",
                SIZE - 1,
                SIZE - 1
            ),
        }
    }
}

/// Walks `moves` from the top-left corner and checks it reaches the
/// bottom-right corner. Separators (spaces, commas, quotes, brackets) are
/// ignored and moves are case-insensitive.
///
/// # Errors
///
/// Returns the first [`PathError`] encountered along the walk.
pub fn walk(moves: &str) -> Result<(), PathError> {
    let (mut x, mut y) = (0_usize, 0_usize);
    let mut any = false;
    for c in moves.chars() {
        if c.is_whitespace() || matches!(c, ',' | '"' | '\'' | '[' | ']') {
            continue;
        }
        any = true;
        match c.to_ascii_uppercase() {
            'R' => x += 1,
            'D' => y += 1,
            other => return Err(PathError::InvalidMove(other)),
        }
        if x >= SIZE || y >= SIZE {
            return Err(PathError::OutOfBounds);
        }
        if GRID[y][x] == 1 {
            return Err(PathError::Obstacle(x, y));
        }
    }
    if !any {
        return Err(PathError::Empty);
    }
    if (x, y) != (SIZE - 1, SIZE - 1) {
        return Err(PathError::WrongEnd(x, y));
    }
    Ok(())
}

/// Grid navigation puzzle.
#[derive(Debug, Default)]
pub struct GridPath {
    last: Option<String>,
    feedback: Option<String>,
    completed: bool,
}

impl GridPath {
    /// Creates the step.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last: None,
            feedback: None,
            completed: false,
        }
    }
}

impl Step for GridPath {
    fn title(&self) -> &str {
        "Step 5: Find the path"
    }

    fn kind(&self) -> StepKind {
        StepKind::GridPath
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
        self.last = Some(line.trim().to_string());
        match walk(line) {
            Ok(()) => {
                self.completed = true;
                self.feedback =
                    Some("Congratulations! Your path successfully navigates the grid.".to_string());
            }
            Err(e) => self.feedback = Some(e.to_string()),
        }
        None
    }

    fn is_completed(&self) -> bool {
        self.completed
    }

    fn render(&self, ctx: &RenderContext<'_>) -> String {
        let theme = ctx.theme;
        let mut out = String::from(
            "Get from the top-left to the bottom-right corner moving only right (R) or down (D).\nCells marked # are blocked.\n\n",
        );
        for row in &GRID {
            out.push_str("    ");
            for cell in row {
                out.push_str(if *cell == 1 { "# " } else { ". " });
            }
            out.push('\n');
        }
        if let Some(last) = &self.last {
            let _ = writeln!(out, "\nLast path: {}", theme.accent(last));
        }
        if let Some(feedback) = &self.feedback {
            let styled = if self.completed { theme.good(feedback) } else { theme.bad(feedback) };
            let _ = writeln!(out, "\n{styled}");
        }
        out.push_str("\nEnter your moves, e.g. RDRD..., and press Enter.\n");
        out
    }
}
