use std::io::Write;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use tracing::info;

pub const BOOT_MESSAGES: [&str; 12] = [
    "C:\\> Starting quantum flux capacitor...",
    "C:\\> Downloading more RAM...",
    "C:\\> Convincing pixels to cooperate...",
    "C:\\> Bribing the GPU with cookies...",
    "C:\\> Teaching triangles to dance...",
    "C:\\> Inflating polygon balloons...",
    "C:\\> Asking nicely for vertices to align...",
    "C:\\> Loading portfolio.exe...",
    "C:\\> Calibrating artistic algorithms...",
    "C:\\> Summoning 3D spirits...",
    "C:\\> Rudra.exe is starting...",
    "C:\\> Welcome to the matrix...",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootStep {
    Line(&'static str),
    Cursor,
    Done,
}

/// Retro terminal messages printed before the desk appears.
#[derive(Debug, Clone)]
pub struct BootSequence {
    pub interval: Duration,
    pub cursor_delay: Duration,
    pub hold: Duration,
}

impl Default for BootSequence {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            cursor_delay: Duration::from_secs(1),
            hold: Duration::from_secs(2),
        }
    }
}

impl BootSequence {
    /// Every step with its offset from the start of the sequence.
    pub fn timeline(&self) -> Vec<(Duration, BootStep)> {
        let mut steps = Vec::with_capacity(BOOT_MESSAGES.len() + 2);
        let mut at = Duration::ZERO;
        for message in BOOT_MESSAGES {
            at += self.interval;
            steps.push((at, BootStep::Line(message)));
        }
        at += self.cursor_delay;
        steps.push((at, BootStep::Cursor));
        at += self.hold;
        steps.push((at, BootStep::Done));
        steps
    }

    /// Plays the sequence on `writer`. `wait_for_key` blocks for at most the
    /// given duration and reports whether a key was pressed; a key press ends
    /// the sequence early. Returns whether it was skipped.
    pub fn play<W, F>(&self, writer: &mut W, mut wait_for_key: F) -> Result<bool>
    where
        W: Write,
        F: FnMut(Duration) -> Result<bool>,
    {
        let start = Instant::now();
        for (offset, step) in self.timeline() {
            let deadline = start + offset;
            loop {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                if wait_for_key(deadline - now)? {
                    info!("boot sequence skipped");
                    return Ok(true);
                }
            }
            render_step(writer, step)?;
        }
        Ok(false)
    }
}

fn render_step<W: Write>(writer: &mut W, step: BootStep) -> Result<()> {
    match step {
        BootStep::Line(text) => crossterm::queue!(
            writer,
            SetForegroundColor(Color::Green),
            Print(text),
            Print("\r\n"),
            ResetColor
        )?,
        BootStep::Cursor => crossterm::queue!(
            writer,
            SetForegroundColor(Color::Green),
            Print("\u{2588}"),
            ResetColor
        )?,
        BootStep::Done => {}
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instant() -> BootSequence {
        BootSequence {
            interval: Duration::ZERO,
            cursor_delay: Duration::ZERO,
            hold: Duration::ZERO,
        }
    }

    #[test]
    fn timeline_follows_message_cadence() {
        let timeline = BootSequence::default().timeline();
        assert_eq!(timeline.len(), 14);
        assert_eq!(
            timeline[0],
            (Duration::from_millis(500), BootStep::Line(BOOT_MESSAGES[0]))
        );
        assert_eq!(timeline[11].0, Duration::from_secs(6));
        assert_eq!(timeline[12], (Duration::from_secs(7), BootStep::Cursor));
        assert_eq!(timeline[13], (Duration::from_secs(9), BootStep::Done));
    }

    #[test]
    fn plays_every_message_in_order() {
        let mut out = Vec::new();
        let skipped = instant().play(&mut out, |_| Ok(false)).unwrap();
        assert!(!skipped);

        let output = String::from_utf8(out).unwrap();
        let mut last = 0;
        for message in BOOT_MESSAGES {
            let position = output[last..].find(message).map(|p| p + last).unwrap();
            last = position;
        }
        assert!(output.contains('\u{2588}'));
    }

    #[test]
    fn key_press_skips_remaining_steps() {
        let sequence = BootSequence {
            interval: Duration::from_millis(50),
            ..instant()
        };
        let mut out = Vec::new();
        let mut calls = 0;
        let skipped = sequence
            .play(&mut out, |_| {
                calls += 1;
                Ok(true)
            })
            .unwrap();
        assert!(skipped);
        assert_eq!(calls, 1);
        assert!(out.is_empty());
    }
}
