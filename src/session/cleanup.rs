//! Process-exit cleanup of spawned children.
//!
//! Every PTY child registers a killer here. Closing a session unregisters
//! it; whatever is still registered when the process exits is killed so no
//! ssh or serial bridge outlives the run.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use once_cell::sync::Lazy;
use portable_pty::ChildKiller;

type Killer = Box<dyn ChildKiller + Send + Sync>;

static LIVE: Lazy<Mutex<HashMap<u64, (String, Killer)>>> = Lazy::new(|| Mutex::new(HashMap::new()));

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Handle returned by [`register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CleanupToken(u64);

/// Track a live child until it is unregistered or the process exits.
pub fn register(label: &str, killer: Killer) -> CleanupToken {
    install_exit_hook();
    let token = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
    if let Ok(mut live) = LIVE.lock() {
        live.insert(token, (label.to_string(), killer));
    }
    CleanupToken(token)
}

/// Stop tracking a child that was closed normally.
pub fn unregister(token: CleanupToken) {
    if let Ok(mut live) = LIVE.lock() {
        live.remove(&token.0);
    }
}

/// Number of children still tracked.
pub fn live_count() -> usize {
    LIVE.lock().map(|live| live.len()).unwrap_or(0)
}

/// Kill every tracked child. Returns how many were reaped.
pub fn reap_all() -> usize {
    let drained: Vec<(String, Killer)> = match LIVE.lock() {
        Ok(mut live) => live.drain().map(|(_, entry)| entry).collect(),
        Err(_) => return 0,
    };
    let count = drained.len();
    for (label, mut killer) in drained {
        if let Err(e) = killer.kill() {
            tracing::debug!(session = %label, error = %e, "kill at exit failed");
        }
    }
    count
}

#[cfg(unix)]
fn install_exit_hook() {
    use std::sync::Once;

    static HOOK: Once = Once::new();

    extern "C" fn on_exit() {
        reap_all();
    }

    HOOK.call_once(|| {
        // SAFETY: `on_exit` is a plain extern "C" fn with no captured state.
        unsafe {
            libc::atexit(on_exit);
        }
    });
}

#[cfg(not(unix))]
fn install_exit_hook() {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    #[derive(Debug, Clone)]
    struct FlagKiller(Arc<AtomicBool>);

    impl ChildKiller for FlagKiller {
        fn kill(&mut self) -> std::io::Result<()> {
            self.0.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn clone_killer(&self) -> Box<dyn ChildKiller + Send + Sync> {
            Box::new(self.clone())
        }
    }

    #[test]
    fn test_unregister_removes_entry() {
        let killed = Arc::new(AtomicBool::new(false));
        let token = register("unit-a", Box::new(FlagKiller(killed.clone())));
        unregister(token);
        unregister(token);
        assert!(!killed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_tokens_are_distinct() {
        let a = register("unit-b", Box::new(FlagKiller(Arc::new(AtomicBool::new(false)))));
        let b = register("unit-c", Box::new(FlagKiller(Arc::new(AtomicBool::new(false)))));
        assert_ne!(a, b);
        unregister(a);
        unregister(b);
    }
}
