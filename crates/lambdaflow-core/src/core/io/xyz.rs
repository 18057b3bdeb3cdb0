use super::traits::TrajectoryFile;
use crate::core::models::state::Frame;
use crate::core::models::trajectory::Trajectory;
use nalgebra::Point3;
use std::io::{self, BufRead, Write};
use thiserror::Error;

const TIME_KEY: &str = "time=";

#[derive(Debug, Error)]
pub enum XyzError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("Inconsistent data: {0}")]
    Inconsistency(String),
}

/// Multi-frame XYZ text.
///
/// Each frame is an atom-count line, a comment line carrying the frame time in
/// picoseconds (`time=<ps>`), and one `name x y z` line per atom.
pub struct XyzFile;

impl TrajectoryFile for XyzFile {
    type Error = XyzError;
    const EXTENSION: &'static str = "xyz";

    fn read_from(reader: &mut impl BufRead) -> Result<Trajectory, Self::Error> {
        let mut trajectory = Trajectory::default();
        let mut lines = reader.lines().enumerate();

        while let Some((idx, line)) = lines.next() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let count: usize = line.trim().parse().map_err(|_| XyzError::Parse {
                line: idx + 1,
                message: format!("expected an atom count, found '{}'", line.trim()),
            })?;

            let (comment_idx, comment) = next_line(&mut lines, "frame comment")?;
            let time = parse_time(&comment).ok_or_else(|| XyzError::Parse {
                line: comment_idx + 1,
                message: "frame comment does not carry a time".to_string(),
            })?;

            let mut names = Vec::with_capacity(count);
            let mut positions = Vec::with_capacity(count);
            for _ in 0..count {
                let (atom_idx, atom_line) = next_line(&mut lines, "atom record")?;
                let (name, position) = parse_atom(&atom_line).ok_or_else(|| XyzError::Parse {
                    line: atom_idx + 1,
                    message: format!("malformed atom record '{}'", atom_line.trim()),
                })?;
                names.push(name);
                positions.push(position);
            }

            let frame = Trajectory {
                atom_names: names,
                frames: vec![Frame { time, positions }],
            };
            if !trajectory.extend_from(frame) {
                return Err(XyzError::Inconsistency(format!(
                    "frame at t = {} ps describes different atoms",
                    time
                )));
            }
        }

        Ok(trajectory)
    }

    fn write_to(trajectory: &Trajectory, writer: &mut impl Write) -> Result<(), Self::Error> {
        for frame in &trajectory.frames {
            if frame.positions.len() != trajectory.atom_names.len() {
                return Err(XyzError::Inconsistency(format!(
                    "frame at t = {} ps has {} positions for {} atoms",
                    frame.time,
                    frame.positions.len(),
                    trajectory.atom_names.len()
                )));
            }
            writeln!(writer, "{}", frame.positions.len())?;
            writeln!(writer, "{}{}", TIME_KEY, frame.time)?;
            for (name, p) in trajectory.atom_names.iter().zip(&frame.positions) {
                writeln!(writer, "{:<4} {:>16.8} {:>16.8} {:>16.8}", name, p.x, p.y, p.z)?;
            }
        }
        Ok(())
    }
}

fn next_line(
    lines: &mut impl Iterator<Item = (usize, io::Result<String>)>,
    expected: &str,
) -> Result<(usize, String), XyzError> {
    match lines.next() {
        Some((idx, line)) => Ok((idx, line?)),
        None => Err(XyzError::Inconsistency(format!(
            "unexpected end of file, expected {}",
            expected
        ))),
    }
}

fn parse_time(comment: &str) -> Option<f64> {
    comment
        .split_whitespace()
        .find_map(|token| token.strip_prefix(TIME_KEY))
        .and_then(|value| value.parse().ok())
}

fn parse_atom(line: &str) -> Option<(String, Point3<f64>)> {
    let mut fields = line.split_whitespace();
    let name = fields.next()?.to_string();
    let x = fields.next()?.parse().ok()?;
    let y = fields.next()?.parse().ok()?;
    let z = fields.next()?.parse().ok()?;
    Some((name, Point3::new(x, y, z)))
}
