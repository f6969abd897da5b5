use crate::engine::Engine;
use std::thread;
use std::time::Duration;

/// Run a script file to completion. If the script scheduled background
/// tasks, keep pumping them afterwards, sleeping until the next task is
/// due; this is the host equivalent of the firmware main loop.

pub fn run(source: &str, filename: Option<&str>) {
    let mut engine = Engine::new();

    if let Err(error) = engine.eval(source) {
        error.report(source, filename);
        return;
    }

    while engine.has_tasks() {
        if let Some(wake) = engine.next_wake() {
            thread::sleep(wake.min(Duration::from_millis(100)));
        }
        engine.pump_background();
    }
}
