use std::cell::RefCell;
use std::rc::Rc;
use std::sync::mpsc::Sender;

use serde::{Deserialize, Serialize};

use crate::timer::{ColorTag, Phase};

/// Every observable change in the engine produces an Event.
///
/// Events for one transition arrive in a fixed order: the phase change, then
/// the sound cues it triggers. A tick that advances the phase emits no `Tick`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Tick {
        remaining_ms: u64,
        phase: Phase,
        current_set: u32,
        current_cycle: u32,
        total_elapsed_ms: u64,
        /// 0.0 .. 100.0 within the current phase.
        progress_pct: f64,
    },
    PhaseChange {
        phase: Phase,
        remaining_ms: u64,
        current_set: u32,
        current_cycle: u32,
        label: String,
        color: ColorTag,
        running: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        paused: Option<bool>,
        #[serde(default, skip_serializing_if = "is_false")]
        reset: bool,
        #[serde(default, skip_serializing_if = "is_false")]
        stopped: bool,
    },
    Complete {
        total_time_ms: u64,
        total_cycles: u32,
        total_sets: u32,
    },
    Sound {
        cue: SoundCue,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoundCue {
    /// 3, 2 and 1 seconds before a phase ends.
    Countdown,
    /// Any phase initialization.
    PhaseChange,
    /// Only when entering `Exercise`.
    ExerciseBeep,
    Halfway,
    WorkoutComplete,
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Subscriber to engine events.
pub trait EventSink {
    fn on_event(&mut self, event: &Event);
}

impl EventSink for Sender<Event> {
    fn on_event(&mut self, event: &Event) {
        // A dropped receiver just means nobody is listening any more.
        let _ = self.send(event.clone());
    }
}

/// Records every event it sees. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Rc<RefCell<Vec<Event>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    /// Remove and return everything recorded so far.
    pub fn drain(&self) -> Vec<Event> {
        self.events.borrow_mut().drain(..).collect()
    }

    pub fn sounds(&self) -> Vec<SoundCue> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                Event::Sound { cue } => Some(*cue),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for EventLog {
    fn on_event(&mut self, event: &Event) {
        self.events.borrow_mut().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_snake_case_tags() {
        let json = serde_json::to_value(Event::Sound {
            cue: SoundCue::ExerciseBeep,
        })
        .unwrap();
        assert_eq!(json["type"], "sound");
        assert_eq!(json["cue"], "exercise_beep");
    }

    #[test]
    fn phase_change_omits_unset_flags() {
        let event = Event::PhaseChange {
            phase: Phase::Rest,
            remaining_ms: 10_000,
            current_set: 1,
            current_cycle: 1,
            label: "Rest".into(),
            color: ColorTag::Rest,
            running: true,
            paused: None,
            reset: false,
            stopped: false,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "phase_change");
        assert!(json.get("paused").is_none());
        assert!(json.get("reset").is_none());
        let back: Event = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn channel_sink_forwards_events() {
        let (tx, rx) = std::sync::mpsc::channel();
        let mut sink = tx;
        sink.on_event(&Event::Sound {
            cue: SoundCue::Countdown,
        });
        assert_eq!(
            rx.try_recv().unwrap(),
            Event::Sound {
                cue: SoundCue::Countdown
            }
        );
    }
}
