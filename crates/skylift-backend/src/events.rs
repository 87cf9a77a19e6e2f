use tokio::sync::mpsc;

/// Progress and status notifications emitted while discovering, downloading,
/// or installing. Progress is a percentage in `0..=100`; Indeterminate marks
/// phases with no measurable total (for example while the external patcher
/// runs).
#[derive(Debug, Clone, PartialEq)]
pub enum InstallEvent {
    Progress(f64),
    Indeterminate,
    Status(String),
}

/// Sending half of the event stream. Sends never block and never fail the
/// operation: a dropped receiver simply mutes the stream.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    sender: Option<mpsc::UnboundedSender<InstallEvent>>,
}

impl EventSink {
    /// Create a sink together with the receiver that observes it.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<InstallEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender: Some(sender),
            },
            receiver,
        )
    }

    /// A sink that discards everything. Useful when no observer is attached.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn progress(&self, percent: f64) {
        self.emit(InstallEvent::Progress(percent.clamp(0.0, 100.0)));
    }

    pub fn indeterminate(&self) {
        self.emit(InstallEvent::Indeterminate);
    }

    pub fn status(&self, message: impl Into<String>) {
        self.emit(InstallEvent::Status(message.into()));
    }

    fn emit(&self, event: InstallEvent) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(event);
        }
    }
}
