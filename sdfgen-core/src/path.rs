//! Path commands: parsing, normalization, and flattening.
//!
//! Accepts the SVG-like subset emitted by glyph outline extractors:
//! `M x,y`, `L x,y`, `Q cx,cy,x,y`, `C c1x,c1y,c2x,c2y,x,y` and `Z`
//! (absolute coordinates only). Arguments are separated by any mix of
//! commas and whitespace; the next command letter terminates the
//! previous command's arguments.
//!
//! Malformed input fails fast with a [`PathError`] instead of being
//! skipped, so a bad outline never produces a silently different
//! segment set.

use std::fmt;

use crate::error::PathError;
use crate::outline::{LineSegment, Outline};

/// Number of evaluated points per Bezier curve (so `n - 1` segments).
pub const DEFAULT_CURVE_SUBDIVISIONS: usize = 16;

/// A point in outline space.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// One parsed command of the outline command stream.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PathCommand {
    MoveTo(Point),
    LineTo(Point),
    QuadTo { control: Point, end: Point },
    CubicTo { control1: Point, control2: Point, end: Point },
    Close,
}

impl PathCommand {
    /// The command letter used in path strings.
    pub fn letter(&self) -> char {
        match self {
            PathCommand::MoveTo(_) => 'M',
            PathCommand::LineTo(_) => 'L',
            PathCommand::QuadTo { .. } => 'Q',
            PathCommand::CubicTo { .. } => 'C',
            PathCommand::Close => 'Z',
        }
    }

    fn arity(letter: char) -> Option<usize> {
        match letter {
            'M' | 'L' => Some(2),
            'Q' => Some(4),
            'C' => Some(6),
            'Z' => Some(0),
            _ => None,
        }
    }

    fn from_args(letter: char, a: &[f64]) -> Self {
        match letter {
            'M' => PathCommand::MoveTo(Point::new(a[0], a[1])),
            'L' => PathCommand::LineTo(Point::new(a[0], a[1])),
            'Q' => PathCommand::QuadTo {
                control: Point::new(a[0], a[1]),
                end: Point::new(a[2], a[3]),
            },
            'C' => PathCommand::CubicTo {
                control1: Point::new(a[0], a[1]),
                control2: Point::new(a[2], a[3]),
                end: Point::new(a[4], a[5]),
            },
            _ => PathCommand::Close,
        }
    }
}

impl fmt::Display for PathCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathCommand::MoveTo(p) => write!(f, "M{},{}", p.x, p.y),
            PathCommand::LineTo(p) => write!(f, "L{},{}", p.x, p.y),
            PathCommand::QuadTo { control, end } => {
                write!(f, "Q{},{},{},{}", control.x, control.y, end.x, end.y)
            }
            PathCommand::CubicTo { control1, control2, end } => write!(
                f,
                "C{},{},{},{},{},{}",
                control1.x, control1.y, control2.x, control2.y, end.x, end.y
            ),
            PathCommand::Close => f.write_str("Z"),
        }
    }
}

/// Render a command list back into path syntax accepted by [`parse_path`].
pub fn to_path_string(commands: &[PathCommand]) -> String {
    commands
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

// ───────────────────────────────────────────────────────────────────
// Parsing
// ───────────────────────────────────────────────────────────────────

/// `e`/`E` belong to numbers (`1e3`); every other letter starts a command.
fn is_command_char(ch: char) -> bool {
    ch.is_ascii_alphabetic() && ch != 'e' && ch != 'E'
}

/// Parse a path string into commands.
pub fn parse_path(path: &str) -> Result<Vec<PathCommand>, PathError> {
    let mut commands = Vec::new();
    let mut pending: Option<(char, usize)> = None;

    for (offset, ch) in path.char_indices() {
        if !is_command_char(ch) {
            continue;
        }
        match pending {
            Some((letter, start)) => {
                commands.push(parse_command(letter, &path[start..offset])?);
            }
            None => check_leading(&path[..offset])?,
        }
        if PathCommand::arity(ch).is_none() {
            return Err(PathError::UnknownCommand { command: ch, offset });
        }
        pending = Some((ch, offset + ch.len_utf8()));
    }

    match pending {
        Some((letter, start)) => commands.push(parse_command(letter, &path[start..])?),
        None => check_leading(path)?,
    }

    Ok(commands)
}

fn check_leading(text: &str) -> Result<(), PathError> {
    match text.find(|c: char| !(c.is_whitespace() || c == ',')) {
        Some(offset) => Err(PathError::MissingCommand { offset }),
        None => Ok(()),
    }
}

fn parse_command(letter: char, args: &str) -> Result<PathCommand, PathError> {
    let expected = PathCommand::arity(letter).unwrap_or(0);
    let values = args
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .map(|token| match token.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => Err(PathError::InvalidNumber {
                command: letter,
                token: token.to_string(),
            }),
        })
        .collect::<Result<Vec<f64>, PathError>>()?;

    if values.len() != expected {
        return Err(PathError::ArgumentCount {
            command: letter,
            expected,
            found: values.len(),
        });
    }
    Ok(PathCommand::from_args(letter, &values))
}

// ───────────────────────────────────────────────────────────────────
// Normalized segments
// ───────────────────────────────────────────────────────────────────

/// A drawable piece of the outline with its start point made explicit.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PathSegment {
    Line { start: Point, end: Point },
    Quad { start: Point, control: Point, end: Point },
    Cubic { start: Point, control1: Point, control2: Point, end: Point },
}

impl PathSegment {
    pub fn start(&self) -> Point {
        match *self {
            PathSegment::Line { start, .. }
            | PathSegment::Quad { start, .. }
            | PathSegment::Cubic { start, .. } => start,
        }
    }

    pub fn end(&self) -> Point {
        match *self {
            PathSegment::Line { end, .. }
            | PathSegment::Quad { end, .. }
            | PathSegment::Cubic { end, .. } => end,
        }
    }

    /// Emit the straight line segments approximating this piece.
    ///
    /// Curves are sampled at `t = i / (subdivisions - 1)`; values below 2
    /// are raised to 2 (a single chord).
    pub fn flatten_into(&self, subdivisions: usize, emit: &mut impl FnMut(LineSegment)) {
        let subdivisions = subdivisions.max(2);
        match *self {
            PathSegment::Line { start, end } => emit(LineSegment::new(start, end)),
            PathSegment::Quad { start, control, end } => {
                sample_curve(start, subdivisions, emit, |t| {
                    quadratic_point(start, control, end, t)
                });
            }
            PathSegment::Cubic { start, control1, control2, end } => {
                sample_curve(start, subdivisions, emit, |t| {
                    cubic_point(start, control1, control2, end, t)
                });
            }
        }
    }
}

fn sample_curve(
    start: Point,
    subdivisions: usize,
    emit: &mut impl FnMut(LineSegment),
    point_at: impl Fn(f64) -> Point,
) {
    let last = (subdivisions - 1) as f64;
    let mut prev = start;
    for i in 1..subdivisions {
        let p = point_at(i as f64 / last);
        emit(LineSegment::new(prev, p));
        prev = p;
    }
}

/// Point on a quadratic Bezier at `t` in [0, 1].
pub fn quadratic_point(p0: Point, p1: Point, p2: Point, t: f64) -> Point {
    let t2 = 1.0 - t;
    Point {
        x: t2 * t2 * p0.x + 2.0 * t2 * t * p1.x + t * t * p2.x,
        y: t2 * t2 * p0.y + 2.0 * t2 * t * p1.y + t * t * p2.y,
    }
}

/// Point on a cubic Bezier at `t` in [0, 1].
pub fn cubic_point(p0: Point, p1: Point, p2: Point, p3: Point, t: f64) -> Point {
    let t2 = 1.0 - t;
    Point {
        x: t2 * t2 * t2 * p0.x + 3.0 * t2 * t2 * t * p1.x + 3.0 * t2 * t * t * p2.x
            + t * t * t * p3.x,
        y: t2 * t2 * t2 * p0.y + 3.0 * t2 * t2 * t * p1.y + 3.0 * t2 * t * t * p2.y
            + t * t * t * p3.y,
    }
}

/// Walk parsed commands, yielding normalized segments.
///
/// `Z` becomes a line back to the most recent `M` point; zero-length
/// lines (explicit or from `Z`) are dropped. `Z` leaves the current point
/// where it was, so a drawing command after it starts from the last point
/// drawn before the close.
pub fn visit_commands(
    commands: &[PathCommand],
    mut visit: impl FnMut(PathSegment),
) -> Result<(), PathError> {
    let mut subpath_start: Option<Point> = None;
    let mut current: Option<Point> = None;

    for command in commands {
        let from = match command {
            PathCommand::MoveTo(p) => {
                subpath_start = Some(*p);
                current = Some(*p);
                continue;
            }
            other => current.ok_or(PathError::NoCurrentPoint {
                command: other.letter(),
            })?,
        };

        let segment = match *command {
            PathCommand::LineTo(end) => PathSegment::Line { start: from, end },
            PathCommand::QuadTo { control, end } => PathSegment::Quad {
                start: from,
                control,
                end,
            },
            PathCommand::CubicTo { control1, control2, end } => PathSegment::Cubic {
                start: from,
                control1,
                control2,
                end,
            },
            PathCommand::Close => {
                let end = subpath_start.ok_or(PathError::NoCurrentPoint { command: 'Z' })?;
                PathSegment::Line { start: from, end }
            }
            PathCommand::MoveTo(_) => continue,
        };

        if !matches!(command, PathCommand::Close) {
            current = Some(segment.end());
        }
        if let PathSegment::Line { start, end } = segment {
            // Some fonts carry zero-length line commands.
            if start == end {
                continue;
            }
        }
        visit(segment);
    }
    Ok(())
}

/// Parse `path` and yield its normalized segments.
pub fn for_each_command(path: &str, visit: impl FnMut(PathSegment)) -> Result<(), PathError> {
    let commands = parse_path(path)?;
    visit_commands(&commands, visit)
}

/// Stream the flattened line segments of `path` in path order (unsorted).
pub fn path_to_line_segments(
    path: &str,
    subdivisions: usize,
    mut emit: impl FnMut(LineSegment),
) -> Result<(), PathError> {
    check_subdivisions(subdivisions)?;
    for_each_command(path, |segment| segment.flatten_into(subdivisions, &mut emit))
}

/// Flatten commands into a `max_x`-sorted [`Outline`].
pub fn flatten(commands: &[PathCommand], subdivisions: usize) -> Result<Outline, PathError> {
    check_subdivisions(subdivisions)?;
    let mut segments = Vec::new();
    visit_commands(commands, |segment| {
        segment.flatten_into(subdivisions, &mut |line: LineSegment| segments.push(line))
    })?;
    log::debug!(
        "Flattened {} commands into {} segments",
        commands.len(),
        segments.len()
    );
    Ok(Outline::from_segments(segments))
}

fn check_subdivisions(subdivisions: usize) -> Result<(), PathError> {
    if subdivisions < 2 {
        return Err(PathError::InvalidSubdivisions(subdivisions));
    }
    Ok(())
}

// ───────────────────────────────────────────────────────────────────
// Builder
// ───────────────────────────────────────────────────────────────────

/// Fluent construction of command lists.
///
/// ```
/// use sdfgen_core::PathBuilder;
/// let commands = PathBuilder::new()
///     .move_to(0.0, 0.0)
///     .line_to(64.0, 64.0)
///     .line_to(0.0, 64.0)
///     .close()
///     .build();
/// assert_eq!(commands.len(), 4);
/// ```
#[derive(Clone, Debug, Default)]
pub struct PathBuilder {
    commands: Vec<PathCommand>,
}

impl PathBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn move_to(&mut self, x: f64, y: f64) -> &mut Self {
        self.commands.push(PathCommand::MoveTo(Point::new(x, y)));
        self
    }

    pub fn line_to(&mut self, x: f64, y: f64) -> &mut Self {
        self.commands.push(PathCommand::LineTo(Point::new(x, y)));
        self
    }

    pub fn quad_to(&mut self, cx: f64, cy: f64, x: f64, y: f64) -> &mut Self {
        self.commands.push(PathCommand::QuadTo {
            control: Point::new(cx, cy),
            end: Point::new(x, y),
        });
        self
    }

    pub fn cubic_to(&mut self, c1x: f64, c1y: f64, c2x: f64, c2y: f64, x: f64, y: f64) -> &mut Self {
        self.commands.push(PathCommand::CubicTo {
            control1: Point::new(c1x, c1y),
            control2: Point::new(c2x, c2y),
            end: Point::new(x, y),
        });
        self
    }

    pub fn close(&mut self) -> &mut Self {
        self.commands.push(PathCommand::Close);
        self
    }

    pub fn build(&self) -> Vec<PathCommand> {
        self.commands.clone()
    }
}

// ===================================================================
// Tests
// ===================================================================
