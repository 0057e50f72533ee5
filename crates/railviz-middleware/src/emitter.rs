//! Command Emitter.
//!
//! Turns a local [`ControlIntent`] into a single outbound text frame.  The
//! frame is sent only while the channel reports [`ChannelStatus::Open`];
//! otherwise the intent is dropped.  There is no queue and no retry: each
//! intent is delivered at most once.

use railviz_types::{ChannelStatus, ControlIntent, StreamError};
use tracing::{debug, warn};

/// The outbound half of a stream channel, as seen by the emitter.
pub trait ControlChannel: Send + Sync {
    /// Current ready state of the channel.
    fn status(&self) -> ChannelStatus;

    /// Hand one bare text frame to the transport.
    fn send_text(&self, text: &str) -> Result<(), StreamError>;
}

/// What happened to an emitted intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitOutcome {
    /// The frame was handed to the transport.
    Sent,
    /// The channel was not open, or the transport refused the frame.
    Dropped,
}

/// Fire-and-forget sender of control intents.
#[derive(Debug, Clone)]
pub struct CommandEmitter<C> {
    channel: C,
}

impl<C: ControlChannel> CommandEmitter<C> {
    pub fn new(channel: C) -> Self {
        Self { channel }
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Send `intent` if the channel is open.  Never fails.
    pub fn emit(&self, intent: ControlIntent) -> EmitOutcome {
        let status = self.channel.status();
        if status != ChannelStatus::Open {
            debug!(?intent, ?status, "channel not open; dropping control intent");
            return EmitOutcome::Dropped;
        }

        match self.channel.send_text(intent.wire_token()) {
            Ok(()) => {
                debug!(?intent, "control intent sent");
                EmitOutcome::Sent
            }
            Err(e) => {
                warn!(?intent, error = %e, "failed to send control intent");
                EmitOutcome::Dropped
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct StubChannel {
        status: ChannelStatus,
        fail: bool,
        sent: Mutex<Vec<String>>,
    }

    impl StubChannel {
        fn new(status: ChannelStatus) -> Self {
            Self {
                status,
                fail: false,
                sent: Mutex::new(Vec::new()),
            }
        }

        fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl ControlChannel for StubChannel {
        fn status(&self) -> ChannelStatus {
            self.status
        }

        fn send_text(&self, text: &str) -> Result<(), StreamError> {
            if self.fail {
                return Err(StreamError::ChannelClosed);
            }
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    #[test]
    fn open_channel_sends_toggle_token() {
        let emitter = CommandEmitter::new(StubChannel::new(ChannelStatus::Open));
        assert_eq!(emitter.emit(ControlIntent::TogglePlayback), EmitOutcome::Sent);
        assert_eq!(emitter.channel().sent(), vec!["toggle_pause".to_string()]);
    }

    #[test]
    fn closed_channel_drops_silently() {
        for status in [
            ChannelStatus::Connecting,
            ChannelStatus::Closing,
            ChannelStatus::Closed,
        ] {
            let emitter = CommandEmitter::new(StubChannel::new(status));
            assert_eq!(emitter.emit(ControlIntent::TogglePlayback), EmitOutcome::Dropped);
            assert!(emitter.channel().sent().is_empty(), "status {status:?} must not send");
        }
    }

    #[test]
    fn transport_failure_is_contained() {
        let mut stub = StubChannel::new(ChannelStatus::Open);
        stub.fail = true;
        let emitter = CommandEmitter::new(stub);
        assert_eq!(emitter.emit(ControlIntent::TogglePlayback), EmitOutcome::Dropped);
    }

    #[test]
    fn each_intent_is_one_frame() {
        let emitter = CommandEmitter::new(StubChannel::new(ChannelStatus::Open));
        emitter.emit(ControlIntent::TogglePlayback);
        emitter.emit(ControlIntent::TogglePlayback);
        assert_eq!(emitter.channel().sent().len(), 2);
    }
}
