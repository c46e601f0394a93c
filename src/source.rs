//! JSON-lines frame source.
//!
//! Each line is one tagged event: a landmark frame, a pointer drag or a
//! wheel step. Bad lines surface as `FrameError` and are skipped by callers.

use serde::Deserialize;
use std::io::BufRead;
use std::time::Instant;
use thiserror::Error;

use crate::landmarks::{Frame, Hand, LANDMARK_COUNT, Landmark};
use crate::pointer::{Drag, PointerEvent};

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("malformed input line: {0}")]
    Json(#[from] serde_json::Error),
    #[error("hand has {0} landmarks, expected {LANDMARK_COUNT}")]
    LandmarkCount(usize),
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    Frame(Frame),
    Pointer(PointerEvent),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Line {
    Frame {
        #[serde(default)]
        t: Option<u64>,
        #[serde(default)]
        hands: Vec<Vec<Landmark>>,
    },
    Drag(Drag),
    Wheel {
        delta_y: f32,
    },
}

impl TryFrom<Vec<Landmark>> for Hand {
    type Error = FrameError;

    fn try_from(points: Vec<Landmark>) -> Result<Self, Self::Error> {
        let got = points.len();
        let landmarks: [Landmark; LANDMARK_COUNT] = points
            .try_into()
            .map_err(|_| FrameError::LandmarkCount(got))?;
        Ok(Hand::new(landmarks))
    }
}

/// Parses one line. Blank lines yield `Ok(None)`; frames without a `t`
/// are stamped with `arrival_ms`.
pub fn parse_line(line: &str, arrival_ms: u64) -> Result<Option<InputEvent>, FrameError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let event = match serde_json::from_str::<Line>(line)? {
        Line::Frame { t, hands } => {
            let hands = hands
                .into_iter()
                .map(Hand::try_from)
                .collect::<Result<Vec<_>, _>>()?;
            InputEvent::Frame(Frame::new(t.unwrap_or(arrival_ms), hands))
        }
        Line::Drag(drag) => InputEvent::Pointer(PointerEvent::Drag(drag)),
        Line::Wheel { delta_y } => InputEvent::Pointer(PointerEvent::Wheel { delta_y }),
    };
    Ok(Some(event))
}

/// Iterates parsed events from a line reader, stamping untimed frames with
/// strictly increasing milliseconds since the reader was created.
pub struct EventReader<R> {
    input: R,
    started: Instant,
    last_arrival_ms: Option<u64>,
    line: String,
}

impl<R: BufRead> EventReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            started: Instant::now(),
            last_arrival_ms: None,
            line: String::new(),
        }
    }

    fn arrival_ms(&mut self) -> u64 {
        let now = self.started.elapsed().as_millis() as u64;
        let t = match self.last_arrival_ms {
            Some(last) if now <= last => last + 1,
            _ => now,
        };
        self.last_arrival_ms = Some(t);
        t
    }
}

impl<R: BufRead> Iterator for EventReader<R> {
    type Item = Result<InputEvent, FrameError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.line.clear();
            match self.input.read_line(&mut self.line) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e.into())),
            }
            if self.line.trim().is_empty() {
                continue;
            }
            let arrival = self.arrival_ms();
            match parse_line(&self.line, arrival) {
                Ok(Some(event)) => return Some(Ok(event)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pointer::DragMode;
    use std::io::Cursor;

    fn hand_json(n: usize) -> String {
        let pts: Vec<String> = (0..n)
            .map(|i| format!(r#"{{"x":{},"y":0.5}}"#, i as f32 / 100.0))
            .collect();
        format!("[{}]", pts.join(","))
    }

    #[test]
    fn parses_timed_frame() {
        let line = format!(r#"{{"type":"frame","t":120,"hands":[{}]}}"#, hand_json(21));
        let Some(InputEvent::Frame(frame)) = parse_line(&line, 7).unwrap() else {
            panic!("expected a frame");
        };
        assert_eq!(frame.timestamp_ms, 120);
        assert_eq!(frame.hands.len(), 1);
        assert_eq!(frame.hands[0].landmark(3).x, 0.03);
        assert_eq!(frame.hands[0].landmark(3).z, 0.0);
    }

    #[test]
    fn untimed_frame_uses_arrival_time() {
        let Some(InputEvent::Frame(frame)) =
            parse_line(r#"{"type":"frame","hands":[]}"#, 42).unwrap()
        else {
            panic!("expected a frame");
        };
        assert_eq!(frame, Frame::new(42, Vec::new()));
    }

    #[test]
    fn wrong_landmark_count_is_rejected() {
        let line = format!(r#"{{"type":"frame","hands":[{}]}}"#, hand_json(20));
        let err = parse_line(&line, 0).unwrap_err();
        assert!(matches!(err, FrameError::LandmarkCount(20)));
    }

    #[test]
    fn parses_pointer_events() {
        let drag = parse_line(r#"{"type":"drag","mode":"scale","dx":1,"dy":-2}"#, 0)
            .unwrap()
            .unwrap();
        let InputEvent::Pointer(PointerEvent::Drag(d)) = drag else {
            panic!("expected a drag");
        };
        assert_eq!(d.mode(), DragMode::Scale);
        assert_eq!(d.dy, -2.0);

        let drag = parse_line(
            r#"{"type":"drag","button":0,"modifiers":{"shift":true},"dx":1,"dy":0}"#,
            0,
        )
        .unwrap()
        .unwrap();
        let InputEvent::Pointer(PointerEvent::Drag(d)) = drag else {
            panic!("expected a drag");
        };
        assert_eq!(d.mode(), DragMode::Translate);

        let wheel = parse_line(r#"{"type":"wheel","delta_y":-120}"#, 0).unwrap();
        assert_eq!(
            wheel,
            Some(InputEvent::Pointer(PointerEvent::Wheel { delta_y: -120.0 }))
        );
    }

    #[test]
    fn garbage_and_unknown_types_fail() {
        assert!(matches!(parse_line("{nope", 0), Err(FrameError::Json(_))));
        assert!(parse_line(r#"{"type":"touch"}"#, 0).is_err());
        assert!(parse_line("   ", 0).unwrap().is_none());
    }

    #[test]
    fn reader_skips_blanks_and_keeps_untimed_frames_ordered() {
        let input = "\n{\"type\":\"frame\",\"hands\":[]}\n\n{bad}\n{\"type\":\"frame\",\"hands\":[]}\n";
        let events: Vec<_> = EventReader::new(Cursor::new(input)).collect();
        assert_eq!(events.len(), 3);
        assert!(events[1].is_err());
        let ts: Vec<u64> = events
            .iter()
            .filter_map(|e| match e {
                Ok(InputEvent::Frame(f)) => Some(f.timestamp_ms),
                _ => None,
            })
            .collect();
        assert_eq!(ts.len(), 2);
        assert!(ts[1] > ts[0]);
    }
}
