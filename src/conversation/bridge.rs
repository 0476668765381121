use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

/// A blocking, turn-based computation bridged onto the tick thread. The
/// implementation may call `read_line` (the only blocking point) and
/// `write_line` freely; it must return once `read_line` yields None.
pub trait Interpreter: Send + 'static {
    fn run(&mut self, io: &ConversationIo);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Running,
    Suspended,
    Stopped,
}

#[derive(Debug)]
struct ChannelState {
    read_buf: VecDeque<String>,
    write_buf: VecDeque<String>,
    resume_ready: bool,
    stopping: bool,
    phase: Phase,
    snapshot: Option<Vec<u8>>,
}

impl ChannelState {
    fn new() -> Self {
        Self {
            read_buf: VecDeque::new(),
            write_buf: VecDeque::new(),
            resume_ready: false,
            stopping: false,
            phase: Phase::Running,
            snapshot: None,
        }
    }
}

#[derive(Debug)]
struct Shared {
    state: Mutex<ChannelState>,
    wake: Condvar,
}

/// The worker-side handle. Input becomes readable only after the host
/// tick raises the resume signal; once `stopping` is set the reads drain
/// whatever is buffered and then yield None, so a forced shutdown can
/// never block.
pub struct ConversationIo {
    shared: Arc<Shared>,
}

impl ConversationIo {
    pub fn read_line(&self) -> Option<String> {
        let mut state = self.shared.state.lock().ok()?;
        loop {
            if state.stopping {
                return state.read_buf.pop_front();
            }
            if state.resume_ready {
                if let Some(line) = state.read_buf.pop_front() {
                    if state.read_buf.is_empty() {
                        state.resume_ready = false;
                    }
                    return Some(line);
                }
                state.resume_ready = false;
            }
            state.phase = Phase::Suspended;
            state = self.shared.wake.wait(state).ok()?;
            state.phase = Phase::Running;
        }
    }

    pub fn write_line(&self, text: impl Into<String>) {
        if let Ok(mut state) = self.shared.state.lock() {
            state.write_buf.push_back(text.into());
        }
    }

    pub fn is_stopping(&self) -> bool {
        self.shared
            .state
            .lock()
            .map(|state| state.stopping)
            .unwrap_or(true)
    }

    /// Deposit an opaque resumption blob. The registry hands the last
    /// deposit to persistence when the conversation is torn down.
    pub fn save_blob(&self, blob: Vec<u8>) {
        if let Ok(mut state) = self.shared.state.lock() {
            state.snapshot = Some(blob);
        }
    }
}

/// Host-side record of one live conversation: the shared buffers plus the
/// worker thread running the interpreter.
pub struct Conversation {
    story: String,
    private: bool,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl Conversation {
    pub fn launch(story: impl Into<String>, private: bool, mut interpreter: Box<dyn Interpreter>) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(ChannelState::new()),
            wake: Condvar::new(),
        });
        let io = ConversationIo {
            shared: Arc::clone(&shared),
        };
        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::spawn(move || {
            interpreter.run(&io);
            if let Ok(mut state) = worker_shared.state.lock() {
                state.phase = Phase::Stopped;
            }
        });
        Self {
            story: story.into(),
            private,
            shared,
            worker: Some(worker),
        }
    }

    pub fn story(&self) -> &str {
        &self.story
    }

    pub fn is_private(&self) -> bool {
        self.private
    }

    /// Buffer a line of input. Does NOT wake the worker: only the host
    /// tick raises the resume signal.
    pub fn push_input(&self, line: impl Into<String>) {
        if let Ok(mut state) = self.shared.state.lock() {
            if !state.stopping {
                state.read_buf.push_back(line.into());
            }
        }
    }

    /// Raise the resume signal if input is waiting. Called exactly once
    /// per conversation per host tick.
    pub fn resume_if_ready(&self) {
        let should_wake = {
            let Ok(mut state) = self.shared.state.lock() else {
                return;
            };
            if state.phase == Phase::Stopped || state.read_buf.is_empty() {
                false
            } else {
                state.resume_ready = true;
                true
            }
        };
        if should_wake {
            self.shared.wake.notify_one();
        }
    }

    pub fn take_output(&self) -> Vec<String> {
        match self.shared.state.lock() {
            Ok(mut state) => state.write_buf.drain(..).collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.shared
            .state
            .lock()
            .map(|state| state.phase == Phase::Stopped)
            .unwrap_or(true)
    }

    /// Force shutdown: queue the synthetic quit/confirm input, disable
    /// suspension, wake the worker and wait for it to run out. Returns
    /// the interpreter's final resumption blob, if it left one.
    pub fn terminate(&mut self) -> Option<Vec<u8>> {
        {
            let Ok(mut state) = self.shared.state.lock() else {
                return None;
            };
            if state.phase != Phase::Stopped {
                state.read_buf.push_back("quit".to_string());
                state.read_buf.push_back("yes".to_string());
            }
            state.stopping = true;
            state.resume_ready = true;
        }
        self.shared.wake.notify_one();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        self.shared
            .state
            .lock()
            .ok()
            .and_then(|mut state| state.snapshot.take())
    }
}

impl Drop for Conversation {
    fn drop(&mut self) {
        if self.worker.is_some() {
            let _ = self.terminate();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    /// Replies "echo: <line>" until the input runs dry.
    struct EchoInterpreter;

    impl Interpreter for EchoInterpreter {
        fn run(&mut self, io: &ConversationIo) {
            io.write_line("ready");
            while let Some(line) = io.read_line() {
                io.write_line(format!("echo: {}", line));
            }
        }
    }

    struct RecordingInterpreter {
        seen: Arc<StdMutex<Vec<String>>>,
    }

    impl Interpreter for RecordingInterpreter {
        fn run(&mut self, io: &ConversationIo) {
            while let Some(line) = io.read_line() {
                if let Ok(mut seen) = self.seen.lock() {
                    seen.push(line);
                }
            }
        }
    }

    fn wait_for_output(conversation: &Conversation) -> Vec<String> {
        for _ in 0..200 {
            let output = conversation.take_output();
            if !output.is_empty() {
                return output;
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        Vec::new()
    }

    #[test]
    fn worker_only_progresses_when_resumed() {
        let conversation = Conversation::launch("echo", true, Box::new(EchoInterpreter));
        assert_eq!(wait_for_output(&conversation), vec!["ready"]);

        conversation.push_input("first");
        // Input alone must not wake the worker.
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(conversation.take_output().is_empty());

        conversation.resume_if_ready();
        assert_eq!(wait_for_output(&conversation), vec!["echo: first"]);
    }

    #[test]
    fn terminate_drains_the_forced_quit_sequence() {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let mut conversation = Conversation::launch(
            "recorder",
            true,
            Box::new(RecordingInterpreter {
                seen: Arc::clone(&seen),
            }),
        );
        conversation.terminate();
        assert!(conversation.is_finished());
        let seen = seen.lock().expect("seen lock");
        assert_eq!(*seen, vec!["quit".to_string(), "yes".to_string()]);
    }

    #[test]
    fn terminate_twice_is_safe_and_yields_the_blob() {
        struct BlobInterpreter;
        impl Interpreter for BlobInterpreter {
            fn run(&mut self, io: &ConversationIo) {
                while io.read_line().is_some() {}
                io.save_blob(b"state".to_vec());
            }
        }
        let mut conversation = Conversation::launch("blob", false, Box::new(BlobInterpreter));
        assert_eq!(conversation.terminate(), Some(b"state".to_vec()));
        assert_eq!(conversation.terminate(), None);
    }

    #[test]
    fn input_after_stopping_is_ignored() {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let mut conversation = Conversation::launch(
            "recorder",
            true,
            Box::new(RecordingInterpreter {
                seen: Arc::clone(&seen),
            }),
        );
        conversation.terminate();
        conversation.push_input("late");
        assert_eq!(seen.lock().expect("seen lock").len(), 2);
    }
}
