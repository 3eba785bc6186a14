//! consolebench: console automation for device test benches
//!
//! consolebench drives the text consoles of lab equipment (serial ports,
//! SSH and telnet logins, local shells) from test code, and organises that
//! test code into numbered, logged steps.
//!
//! # Features
//!
//! - **Transports**: local shell, ssh, telnet, serial bridges and arbitrary
//!   commands, all run on a PTY and reaped on exit
//! - **Pattern matching**: exact strings, regex and glob, plus EOF and
//!   timeout sentinels; the earliest match in the output wins
//! - **Command layer**: `run_command` sends a line, skips its echo and
//!   returns the output up to the next prompt
//! - **Device registry**: look devices up by accessor name, role, feature
//!   or location
//! - **Test steps**: queued actions, verification predicates, teardown
//!   steps that keep going, and negative tests
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use consolebench::{ConsoleBuilder, Pattern, TransportRecipe};
//! use std::time::Duration;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut shell = ConsoleBuilder::new("lan")
//!         .recipe(TransportRecipe::Local {
//!             shell: "sh".into(),
//!             args: vec![],
//!         })
//!         .prompt(Pattern::regex(r"\$ $")?)
//!         .spawn()?;
//!
//!     let out = shell.run_command("echo FOO", Some(Duration::from_secs(5)))?;
//!     assert_eq!(out, "FOO");
//!     shell.close();
//!     Ok(())
//! }
//! ```
//!
//! # Pattern Matching
//!
//! ```rust,no_run
//! use consolebench::{ConsoleDevice, Pattern};
//! use std::time::Duration;
//!
//! # fn example(cm: &mut ConsoleDevice) -> Result<(), Box<dyn std::error::Error>> {
//! let patterns = [
//!     Pattern::exact("Registration complete"),
//!     Pattern::regex(r"T\d timeout")?,
//!     Pattern::Eof,
//! ];
//! let m = cm.expect_any(&patterns, Some(Duration::from_secs(120)))?;
//! match m.pattern_index {
//!     0 => println!("modem online"),
//!     1 => println!("ranging failed: {}", m.matched),
//!     _ => println!("console closed"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Test Steps
//!
//! ```rust,no_run
//! use consolebench::registry::DeviceRegistry;
//! use consolebench::step::{TearDown, TestContext, TestStep};
//! use consolebench::Inventory;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = DeviceRegistry::from_inventory(&Inventory::load("bench.toml")?)?;
//! let lan = registry.by_role("lan");
//!
//! let ctx = TestContext::new("PingTest");
//! let mut step = TestStep::new(&ctx, "ping the gateway", "Test");
//! step.scope(|s| {
//!     let out = s.call("ping", || Ok(lan.run_command("ping -c 1 10.0.0.1", None)?))?;
//!     s.verify(move || out.contains("1 received"), "gateway answers");
//!     s.add("log", || Ok(()));
//!     s.execute()
//! })?;
//!
//! let mut teardown = TearDown::new(&ctx, "release");
//! teardown.scope(|t| {
//!     t.call("close lan", || Ok(lan.close()?))?;
//!     Ok(())
//! })?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod buffer;
pub mod config;
pub mod console;
pub mod diag;
pub mod expect;
pub mod pattern;
pub mod registry;
mod result;
pub mod retry;
pub mod session;
pub mod step;

// Public API exports
pub use config::{DeviceConfig, Inventory, RunConfig};
pub use console::{ConsoleBuilder, ConsoleDevice};
pub use pattern::Pattern;
pub use registry::{DeviceHandle, DeviceQuery, DeviceRegistry};
pub use result::{
    CapturedError, ConfigError, ContinueOnFail, Error, ExpectError, MatchResult, PatternError,
    RegistryError, Result, StepError,
};
pub use session::{Session, SessionBuilder, TransportRecipe};
pub use step::{expect_raises, TearDown, TestContext, TestStep};
