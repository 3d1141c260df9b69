// halt.rs — What happens when an action is denied.
//
// A denied action is a hard security boundary: in production the process
// stops with a distinguished status. The engine reaches that through a
// `HaltHandler` so embedders and tests can observe denials without exiting.

use std::sync::{Arc, Mutex, PoisonError};

/// Called once for every denied action, after the engine has logged it.
pub trait HaltHandler: Send {
    fn halt(&mut self, signature: &str, exit_code: i32);
}

/// Terminates the process. The default handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessHalt;

impl HaltHandler for ProcessHalt {
    fn halt(&mut self, signature: &str, exit_code: i32) {
        eprintln!("{} is not allowed to be executed!", signature);
        eprintln!("System will exit!");
        std::process::exit(exit_code);
    }
}

/// Records denials instead of exiting. The engine returns
/// `DecisionOutcome::Denied` and the embedder decides what to do.
#[derive(Debug, Clone, Default)]
pub struct RecordingHalt {
    denied: Arc<Mutex<Vec<(String, i32)>>>,
}

impl RecordingHalt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signatures denied so far, in order.
    pub fn denied(&self) -> Vec<String> {
        self.denied
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(signature, _)| signature.clone())
            .collect()
    }

    /// Exit code the last denial would have used.
    pub fn last_exit_code(&self) -> Option<i32> {
        self.denied
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .map(|(_, code)| *code)
    }
}

impl HaltHandler for RecordingHalt {
    fn halt(&mut self, signature: &str, exit_code: i32) {
        self.denied
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((signature.to_string(), exit_code));
    }
}
