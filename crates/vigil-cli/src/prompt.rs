//! Terminal input: one stdin reader shared by interventions and blacklist
//! confirmations.

use std::future::Future;
use std::io::{self, BufRead, Write};
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{mpsc, oneshot};
use vigil_core::AgentHandle;
use vigil_tools::ConfirmHandler;
use vigil_types::preview;

type AnswerSlot = Arc<Mutex<Option<oneshot::Sender<String>>>>;

/// Routes stdin lines to a pending confirmation if there is one, otherwise
/// to the running agent as interventions.
#[derive(Clone, Default)]
pub struct TerminalInput {
    pending_answer: AnswerSlot,
}

impl TerminalInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn confirm_handler(&self) -> Arc<dyn ConfirmHandler> {
        Arc::new(TerminalConfirm {
            pending_answer: Arc::clone(&self.pending_answer),
        })
    }

    /// Start reading stdin and forwarding lines.
    ///
    /// The reader is a plain thread so a blocked `read_line` never holds up
    /// runtime shutdown.
    pub fn forward_to(&self, handle: AgentHandle) {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        std::thread::spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });

        let slot = Arc::clone(&self.pending_answer);
        tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                let waiting = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
                match waiting {
                    Some(answer) => {
                        let _ = answer.send(line);
                    }
                    None => {
                        let line = line.trim();
                        if !line.is_empty() {
                            eprintln!("  [intervention queued]");
                            handle.inject(line);
                        }
                    }
                }
            }
        });
    }
}

/// Asks on the terminal before a blacklisted script tool runs.
struct TerminalConfirm {
    pending_answer: AnswerSlot,
}

impl ConfirmHandler for TerminalConfirm {
    fn confirm<'a>(
        &'a self,
        tool: &'a str,
        raw_arguments: &'a str,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        Box::pin(async move {
            let (tx, rx) = oneshot::channel();
            *self
                .pending_answer
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(tx);

            {
                let mut err = io::stderr().lock();
                let _ = writeln!(err);
                let _ = writeln!(err, "  Blacklisted term in call to {tool}");
                let _ = writeln!(err, "  {}", preview(raw_arguments, 200));
                let _ = write!(err, "  Run it anyway? [y/N] > ");
                let _ = err.flush();
            }

            // Stdin closed counts as a refusal.
            match rx.await {
                Ok(answer) => matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"),
                Err(_) => false,
            }
        })
    }
}
