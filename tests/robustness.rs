//! Hostile arguments and failing backends end a command cleanly.

mod common;

use std::fs;

use common::Harness;
use screen_replay::backend::mock::{InputEvent, RecordingInput};
use screen_replay::backend::{Key, NamedKey};
use screen_replay::command::WaitParams;
use screen_replay::ocr::ScriptedRecognizer;
use screen_replay::{Command, Outcome, WindowBox};

const BOX: WindowBox = WindowBox::new(500, 300, 800, 600);

fn skipped(outcome: &Outcome) -> bool {
    matches!(outcome, Outcome::Skipped { .. })
}

#[test]
fn absurd_waits_are_skipped() {
    let mut h = Harness::new(vec![], ScriptedRecognizer::always(""));
    for line in ["wait 1e20", "wait 1e19", "wait 86401", "click 1 1 1e20 offset", "press ctrl a 1e19"] {
        let outcome = h.processor.process(line, Some(BOX));
        assert!(skipped(&outcome), "{}: {:?}", line, outcome);
    }
    assert!(h.events().is_empty());
}

#[test]
fn built_wait_beyond_a_day_is_skipped() {
    let mut h = Harness::new(vec![], ScriptedRecognizer::always(""));
    for seconds in [1e20, 1e19, f64::INFINITY] {
        let outcome = h.processor.dispatch(&Command::Wait(WaitParams { seconds }), None);
        assert!(skipped(&outcome), "{}: {:?}", seconds, outcome);
    }
}

#[test]
fn click_past_screen_space_sends_nothing() {
    let mut h = Harness::new(vec![], ScriptedRecognizer::always(""));
    let outcome = h.processor.process("click 2147483647 0 offset", Some(BOX));
    assert!(skipped(&outcome), "{:?}", outcome);
    assert!(h.events().is_empty());

    let outcome = h.processor.process("click -2147483648 0 offset", Some(BOX));
    assert!(skipped(&outcome), "{:?}", outcome);
    assert!(h.events().is_empty());
}

#[test]
fn screenshot_past_screen_space_is_skipped() {
    let mut h = Harness::new(vec![], ScriptedRecognizer::always(""));
    let outcome = h.processor.process("screenshot 2147483647 0 10 10 offset", Some(BOX));
    assert!(skipped(&outcome), "{:?}", outcome);
    assert!(h.capture.captures().is_empty());
    assert_eq!(h.processor.state().last_screenshot, None);
}

#[test]
fn drag_past_screen_space_never_presses() {
    let mut h = Harness::new(vec![], ScriptedRecognizer::always(""));
    // Reference-sized window at the far right edge: scale 1, second point overflows
    let edge = WindowBox::new(i32::MAX - 100, 0, 2560, 1440);
    let outcome = h.processor.process("drag 10 0 200 0", Some(edge));
    assert!(skipped(&outcome), "{:?}", outcome);
    assert!(h.events().is_empty());
}

#[test]
fn test_text_out_of_range_still_records_failure() {
    let mut h = Harness::new(vec![], ScriptedRecognizer::always("x"));
    let outcome = h
        .processor
        .process(r#"testtext "edge" 2147483647 0 10 10 ocr "x" exact offset"#, Some(BOX));
    assert!(skipped(&outcome), "{:?}", outcome);
    assert_eq!(h.processor.state().test_results.len(), 1);
    assert_eq!(h.recognizer.call_count(), 0);
}

#[test]
fn stuck_key_still_releases_modifier() {
    let mut h = Harness::with_input(RecordingInput::new().failing_release(Key::Char('a')));
    let ctrl = Key::Named(NamedKey::Ctrl);

    let outcome = h.processor.process("press ctrl a 0.05", None);
    assert!(matches!(outcome, Outcome::Failed { .. }), "{:?}", outcome);
    assert_eq!(
        h.events(),
        vec![
            InputEvent::KeyDown(ctrl),
            InputEvent::KeyDown(Key::Char('a')),
            InputEvent::KeyUp(Key::Char('a')),
            InputEvent::KeyUp(ctrl),
        ]
    );
}

#[test]
fn oversized_capture_fails_without_panicking() {
    let mut h = Harness::new(vec![], ScriptedRecognizer::always(""));
    let outcome = h.processor.process("screenshot 0 0 100000 100000 offset", Some(BOX));
    match outcome {
        Outcome::Failed { reason } => assert!(reason.contains("too large"), "{}", reason),
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(h.processor.state().last_screenshot, None);
}

#[test]
fn kept_session_retains_export_after_drop() {
    let h = Harness::new(vec![], ScriptedRecognizer::always("OK"));
    let mut processor = h.processor;
    processor.process(r#"testtext "status" 0 0 50 20 ocr "OK" exact offset"#, Some(BOX));
    assert_eq!(processor.process("exportresult", None), Outcome::Completed);

    let (state, session) = processor.into_parts();
    let export = state.last_export.clone().unwrap();
    drop(session.keep(true));

    assert!(export.is_file());
    assert!(fs::read_to_string(export).unwrap().starts_with("number,"));
}
