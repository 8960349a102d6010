//! The log-stream reconnect automaton, free of I/O.

/// Stream state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// No stream open.
    Idle,
    /// A stream is open and copying.
    Streaming,
    /// A stream is open and will close when the grace delay elapses.
    Closing,
}

/// Inputs to the automaton.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// The container is running.
    Start,
    /// The container terminated.
    Close,
    /// The close grace delay elapsed.
    GraceElapsed,
    /// The open stream reached its end.
    StreamEnded,
}

/// What the driver must do in response to a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Open a stream; `tail_lines` is `None` for the full log.
    Open {
        /// Lines of history to replay.
        tail_lines: Option<i64>,
    },
    /// Start the grace timer.
    ScheduleClose,
    /// Stop the grace timer; the stream stays open.
    CancelClose,
    /// Close the open stream.
    CloseStream,
}

/// Coalesces start/close signals into stream actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowerMachine {
    state: StreamState,
    opened: u32,
}

impl Default for FollowerMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl FollowerMachine {
    /// A machine with no stream open.
    pub fn new() -> Self {
        Self {
            state: StreamState::Idle,
            opened: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Number of streams opened so far.
    pub fn opened(&self) -> u32 {
        self.opened
    }

    /// Feed one signal. `None` means the signal is redundant.
    pub fn on(&mut self, signal: Signal) -> Option<Action> {
        use StreamState::*;
        let (next, action) = match (self.state, signal) {
            (Idle, Signal::Start) => {
                // Only the first stream replays the whole log.
                let tail_lines = (self.opened > 0).then_some(1);
                self.opened += 1;
                (Streaming, Some(Action::Open { tail_lines }))
            }
            (Streaming, Signal::Start) => (Streaming, None),
            (Closing, Signal::Start) => (Streaming, Some(Action::CancelClose)),

            (Streaming, Signal::Close) => (Closing, Some(Action::ScheduleClose)),
            (Closing | Idle, Signal::Close) => (self.state, None),

            (Closing, Signal::GraceElapsed) => (Idle, Some(Action::CloseStream)),
            (state, Signal::GraceElapsed) => (state, None),

            (Streaming | Closing, Signal::StreamEnded) => (Idle, None),
            (Idle, Signal::StreamEnded) => (Idle, None),
        };
        self.state = next;
        action
    }
}
