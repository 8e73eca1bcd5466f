//! Stopping a run mid-command releases everything promptly.

mod common;

use std::thread;
use std::time::{Duration, Instant};

use common::Harness;
use screen_replay::backend::mock::{InputEvent, RecordedInput};
use screen_replay::backend::{Key, MouseButton, NamedKey};
use screen_replay::ocr::ScriptedRecognizer;
use screen_replay::{Outcome, WindowBox};

const STOP_AFTER: Duration = Duration::from_millis(150);
const RELEASE_SLACK: Duration = Duration::from_millis(100);

/// Run `line` on a worker, set the stop flag after [`STOP_AFTER`], and
/// return the outcome, the stop instant and the recorded input
fn interrupt(line: &'static str) -> (Outcome, Instant, Vec<RecordedInput>, Duration) {
    let h = Harness::new(vec![], ScriptedRecognizer::always(""));
    let mut processor = h.processor;
    let stop = processor.stop_flag();
    let started = Instant::now();

    let worker = thread::spawn(move || {
        let outcome = processor.process(line, Some(WindowBox::new(0, 0, 800, 600)));
        (outcome, processor)
    });

    thread::sleep(STOP_AFTER);
    let stopped_at = Instant::now();
    stop.set();
    let (outcome, _processor) = worker.join().unwrap();

    (outcome, stopped_at, h.input.timed_events(), started.elapsed())
}

fn is_press(event: &InputEvent) -> bool {
    matches!(
        event,
        InputEvent::KeyDown(_) | InputEvent::ButtonDown(_) | InputEvent::MouseMove(..) | InputEvent::Scroll(_)
    )
}

fn assert_released_promptly(events: &[RecordedInput], release: &InputEvent, stopped_at: Instant) {
    let released = events
        .iter()
        .find(|r| &r.event == release)
        .unwrap_or_else(|| panic!("{:?} never sent", release));
    assert!(released.at >= stopped_at);
    assert!(
        released.at.duration_since(stopped_at) < RELEASE_SLACK,
        "released {:?} after stop",
        released.at.duration_since(stopped_at)
    );
    assert!(
        events.iter().filter(|r| r.at > stopped_at).all(|r| !is_press(&r.event)),
        "press after stop: {:?}",
        events
    );
}

#[test]
fn key_hold_releases_on_stop() {
    let (outcome, stopped_at, events, elapsed) = interrupt("press shift 5");
    let shift = Key::Named(NamedKey::Shift);

    assert_eq!(outcome, Outcome::Interrupted);
    assert!(elapsed < Duration::from_secs(2));
    assert_eq!(
        events.iter().map(|r| r.event.clone()).collect::<Vec<_>>(),
        vec![InputEvent::KeyDown(shift), InputEvent::KeyUp(shift)]
    );
    assert_released_promptly(&events, &InputEvent::KeyUp(shift), stopped_at);
}

#[test]
fn chord_hold_releases_both_keys() {
    let (outcome, stopped_at, events, _) = interrupt("press ctrl a 5");
    let ctrl = Key::Named(NamedKey::Ctrl);

    assert_eq!(outcome, Outcome::Interrupted);
    assert_eq!(
        events.iter().map(|r| r.event.clone()).collect::<Vec<_>>(),
        vec![
            InputEvent::KeyDown(ctrl),
            InputEvent::KeyDown(Key::Char('a')),
            InputEvent::KeyUp(Key::Char('a')),
            InputEvent::KeyUp(ctrl),
        ]
    );
    assert_released_promptly(&events, &InputEvent::KeyUp(ctrl), stopped_at);
}

#[test]
fn click_hold_releases_button_on_stop() {
    let (outcome, stopped_at, events, elapsed) = interrupt("click 40 30 5 offset");

    assert_eq!(outcome, Outcome::Interrupted);
    assert!(elapsed < Duration::from_secs(2));
    assert_eq!(
        events.iter().map(|r| r.event.clone()).collect::<Vec<_>>(),
        vec![
            InputEvent::MouseMove(40, 30),
            InputEvent::ButtonDown(MouseButton::Left),
            InputEvent::ButtonUp(MouseButton::Left),
        ]
    );
    assert_released_promptly(&events, &InputEvent::ButtonUp(MouseButton::Left), stopped_at);
}

#[test]
fn long_wait_ends_early() {
    let (outcome, _, events, elapsed) = interrupt("wait 30");
    assert_eq!(outcome, Outcome::Interrupted);
    assert!(elapsed < Duration::from_secs(2));
    assert!(events.is_empty());
}

#[test]
fn stopped_processor_refuses_further_lines() {
    let mut h = Harness::new(vec![], ScriptedRecognizer::always(""));
    h.processor.stop_flag().set();
    assert_eq!(
        h.processor.process("click 1 1 offset", Some(WindowBox::new(0, 0, 10, 10))),
        Outcome::Interrupted
    );
    assert!(h.input.events().is_empty());
}
