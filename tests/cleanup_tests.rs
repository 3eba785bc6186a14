//! Exit-time cleanup of spawned children
//!
//! Kept in its own test binary: `reap_all` kills every child the process
//! tracks, which would take down sessions of concurrently running tests.

#![cfg(unix)]

use consolebench::session::cleanup;
use consolebench::{ConsoleBuilder, ConsoleDevice, TransportRecipe};
use std::thread;
use std::time::{Duration, Instant};

fn sleeper(name: &str) -> ConsoleDevice {
    ConsoleBuilder::new(name)
        .recipe(TransportRecipe::Command {
            program: "sleep".into(),
            args: vec!["30".into()],
        })
        .spawn()
        .expect("Failed to spawn sleep")
}

fn exits_within(device: &mut ConsoleDevice, limit: Duration) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if !device.is_alive() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    !device.is_alive()
}

#[test]
fn test_live_children_are_tracked_and_reaped() {
    let before = cleanup::live_count();

    // A normal close stops tracking the child.
    let mut closed = sleeper("closed");
    assert_eq!(cleanup::live_count(), before + 1);
    closed.close();
    assert_eq!(cleanup::live_count(), before);

    // Whatever is still open gets killed by the exit reaper.
    let mut leaked = sleeper("leaked");
    assert!(leaked.is_alive());
    assert_eq!(cleanup::live_count(), before + 1);

    assert_eq!(cleanup::reap_all(), before + 1);
    assert_eq!(cleanup::live_count(), 0);
    assert!(exits_within(&mut leaked, Duration::from_secs(5)));

    leaked.close();
}
