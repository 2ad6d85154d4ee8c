use tokio::time::Instant;
use vmlink_core::ControlState;
use vmlink_protocol::Operation;

/// The request in flight and what the controller is waiting for.
///
/// Created when a command is written and dropped when the controller leaves
/// the waiting states. Passive steps of the dispense sequence keep the same
/// exchange and only update the expectation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingExchange {
    operation: Operation,
    command: Vec<u8>,
    expected_len: usize,
    single_channel: bool,
    deadline: Option<Instant>,
    issued_at: Instant,
}

impl PendingExchange {
    pub(crate) fn new(operation: Operation, command: Vec<u8>, now: Instant) -> Self {
        Self {
            operation,
            command,
            expected_len: operation.expected_response_len(),
            single_channel: operation.single_channel(),
            deadline: None,
            issued_at: now,
        }
    }

    /// Operation that opened the exchange.
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Bytes written for the operation.
    pub fn command(&self) -> &[u8] {
        &self.command
    }

    /// Number of bytes that make up the awaited reply.
    pub fn expected_len(&self) -> usize {
        self.expected_len
    }

    pub fn single_channel(&self) -> bool {
        self.single_channel
    }

    /// Armed deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn issued_at(&self) -> Instant {
        self.issued_at
    }

    /// Returns `true` once `available` bytes hold a complete reply.
    pub fn is_complete(&self, available: usize) -> bool {
        available >= self.expected_len
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }

    pub(crate) fn arm(&mut self, deadline: Instant) {
        self.deadline = Some(deadline);
    }

    pub(crate) fn disarm(&mut self) {
        self.deadline = None;
    }

    /// Await the reply of `state`, keeping the channel mode of the request.
    pub(crate) fn expect(&mut self, state: ControlState) {
        if let Some(len) = state.expected_response_len(self.single_channel) {
            self.expected_len = len;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_expectation_follows_operation() {
        let op = Operation::DispenseCombo {
            row1: 1,
            col1: 1,
            row2: 2,
            col2: 2,
        };
        let mut exchange = PendingExchange::new(op, op.encode(), Instant::now());

        assert_eq!(exchange.expected_len(), 7);
        assert!(!exchange.single_channel());
        assert!(!exchange.is_complete(6));
        assert!(exchange.is_complete(7));

        exchange.expect(ControlState::WaitDispenseDone);
        assert_eq!(exchange.expected_len(), 8);
    }

    #[test]
    fn test_deadline() {
        let now = Instant::now();
        let mut exchange = PendingExchange::new(Operation::FirmwareInfo, b"VMIF\n".to_vec(), now);

        assert!(!exchange.is_expired(now + Duration::from_secs(60)));

        exchange.arm(now + Duration::from_secs(3));
        assert!(!exchange.is_expired(now));
        assert!(exchange.is_expired(now + Duration::from_secs(3)));

        exchange.disarm();
        assert_eq!(exchange.deadline(), None);
    }
}
