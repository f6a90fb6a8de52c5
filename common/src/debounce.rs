/// Deadline-based debounce: every `schedule` pushes the deadline out by the
/// quiet period, and `take_due` reports the deadline once it has passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Debounce {
    quiet_ms: u64,
    deadline_ms: Option<u64>,
}

impl Debounce {
    pub fn new(quiet_ms: u64) -> Self {
        Self {
            quiet_ms,
            deadline_ms: None,
        }
    }

    pub fn schedule(&mut self, now_ms: u64) {
        self.deadline_ms = Some(now_ms.saturating_add(self.quiet_ms));
    }

    pub fn cancel(&mut self) {
        self.deadline_ms = None;
    }

    pub fn is_pending(&self) -> bool {
        self.deadline_ms.is_some()
    }

    pub fn deadline_ms(&self) -> Option<u64> {
        self.deadline_ms
    }

    pub fn take_due(&mut self, now_ms: u64) -> bool {
        match self.deadline_ms {
            Some(due_ms) if now_ms >= due_ms => {
                self.deadline_ms = None;
                true
            }
            _ => false,
        }
    }
}
