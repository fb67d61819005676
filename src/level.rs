use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::input::Direction;

/// How long a single beat stays hittable, in seconds.
pub const BEAT_WINDOW: f64 = 0.25;

/// One entry of a beat map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LevelEvent {
    Beat { time: f64, direction: Direction },
    Sustain { from: f64, to: f64, direction: Direction },
}

impl LevelEvent {
    pub fn start(&self) -> f64 {
        match *self {
            Self::Beat { time, .. } => time,
            Self::Sustain { from, .. } => from,
        }
    }

    pub fn duration(&self) -> f64 {
        match *self {
            Self::Beat { .. } => BEAT_WINDOW,
            Self::Sustain { from, to, .. } => to - from,
        }
    }

    pub fn direction(&self) -> Direction {
        match *self {
            Self::Beat { direction, .. } | Self::Sustain { direction, .. } => direction,
        }
    }
}

/// Parses a beat map: one `from<TAB>to<TAB>direction` line per event. Equal
/// `from` and `to` describe a beat, anything else a sustain. Blank lines are
/// skipped.
pub fn parse_level(text: &str) -> Result<Vec<LevelEvent>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            parse_line(line.trim()).with_context(|| format!("line {}", index + 1))
        })
        .collect()
}

fn parse_line(line: &str) -> Result<LevelEvent> {
    let mut fields = line.split('\t').map(str::trim);
    let mut next = |what: &str| {
        fields
            .next()
            .filter(|field| !field.is_empty())
            .ok_or_else(|| anyhow!("missing {what}"))
    };
    let from_text = next("start time")?;
    let to_text = next("end time")?;
    let direction = next("direction")?.parse::<Direction>()?;

    let from = parse_seconds(from_text)?;
    if from_text == to_text {
        return Ok(LevelEvent::Beat {
            time: from,
            direction,
        });
    }
    let to = parse_seconds(to_text)?;
    if to < from {
        return Err(anyhow!("sustain ends at {to} before it starts at {from}"));
    }
    Ok(LevelEvent::Sustain {
        from,
        to,
        direction,
    })
}

fn parse_seconds(text: &str) -> Result<f64> {
    let value = text
        .parse::<f64>()
        .map_err(|err| anyhow!("invalid time `{text}`: {err}"))?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(anyhow!("invalid time `{text}`"))
    }
}
