use corelib::Signal;

/// Remembers the last signal that was considered for alerting.
///
/// A signal is alert-worthy when it differs from the remembered one and is
/// actionable. Non-actionable signals update the memory too, so BUY, HOLD,
/// BUY alerts twice while BUY, BUY alerts once.
#[derive(Debug, Clone, Default)]
pub struct AlertGate {
    last_notified: Option<Signal>,
}

impl AlertGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` exactly when an alert must be sent for `signal`.
    pub fn evaluate(&mut self, signal: Signal) -> bool {
        if self.last_notified == Some(signal) {
            return false;
        }

        self.last_notified = Some(signal);
        signal.is_actionable()
    }

    pub fn last_notified(&self) -> Option<Signal> {
        self.last_notified
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Signal::*;

    fn fired(sequence: &[Signal]) -> Vec<usize> {
        let mut gate = AlertGate::new();
        sequence
            .iter()
            .enumerate()
            .filter(|(_, s)| gate.evaluate(**s))
            .map(|(i, _)| i)
            .collect()
    }

    #[test]
    fn hold_between_buys_rearms_the_alert() {
        assert_eq!(fired(&[Wait, Buy, Buy, Hold, Buy]), vec![1, 4]);
    }

    #[test]
    fn first_actionable_signal_alerts() {
        assert_eq!(fired(&[Sell]), vec![0]);
    }

    #[test]
    fn repeated_actionable_signal_alerts_once() {
        assert_eq!(fired(&[Buy, Buy, Buy]), vec![0]);
    }

    #[test]
    fn direct_flip_between_actionable_signals_alerts_each_time() {
        assert_eq!(fired(&[Buy, Sell, Buy]), vec![0, 1, 2]);
    }

    #[test]
    fn non_actionable_signals_never_alert() {
        assert!(fired(&[Wait, Hold, Wait, Hold]).is_empty());
    }

    #[test]
    fn memory_tracks_every_distinct_signal() {
        let mut gate = AlertGate::new();
        assert_eq!(gate.last_notified(), None);

        gate.evaluate(Buy);
        gate.evaluate(Hold);

        assert_eq!(gate.last_notified(), Some(Hold));
    }
}
