use crate::TransferError;

/// Lifecycle of one transfer, shared by both directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Idle,
    MetadataExchanged,
    Streaming,
    Completed,
    Failed,
}

/// Enforces the transfer state machine and counts received bytes.
///
/// `Idle → MetadataExchanged → Streaming → {Completed | Failed}`. A chunk
/// observed before metadata is a protocol violation.
#[derive(Debug)]
pub struct TransferTracker {
    state: TransferState,
    declared: u64,
    received: u64,
    limit: u64,
}

impl TransferTracker {
    pub fn new(limit: u64) -> Self {
        Self {
            state: TransferState::Idle,
            declared: 0,
            received: 0,
            limit,
        }
    }

    /// Records the declared size from the metadata.
    pub fn metadata(&mut self, declared: u64) -> Result<(), TransferError> {
        if self.state != TransferState::Idle {
            self.state = TransferState::Failed;
            return Err(TransferError::ProtocolViolation(
                "metadata received twice".into(),
            ));
        }
        if declared > self.limit {
            self.state = TransferState::Failed;
            return Err(TransferError::TooLarge {
                size: declared,
                limit: self.limit,
            });
        }
        self.declared = declared;
        self.state = TransferState::MetadataExchanged;
        Ok(())
    }

    /// Records one chunk of `len` bytes.
    pub fn chunk(&mut self, len: usize) -> Result<(), TransferError> {
        match self.state {
            TransferState::MetadataExchanged | TransferState::Streaming => {}
            TransferState::Idle => {
                self.state = TransferState::Failed;
                return Err(TransferError::ProtocolViolation(
                    "chunk received before metadata".into(),
                ));
            }
            state => {
                return Err(TransferError::ProtocolViolation(format!(
                    "chunk received in state {state:?}"
                )));
            }
        }

        self.received += len as u64;
        if self.received > self.limit {
            self.state = TransferState::Failed;
            return Err(TransferError::TooLarge {
                size: self.received,
                limit: self.limit,
            });
        }
        self.state = TransferState::Streaming;
        Ok(())
    }

    /// Closes the transfer after a clean end of input.
    ///
    /// Returns `true` when the received byte count equals the declared size.
    pub fn finish(&mut self) -> bool {
        let complete = matches!(
            self.state,
            TransferState::MetadataExchanged | TransferState::Streaming
        ) && self.received == self.declared;
        self.state = if complete {
            TransferState::Completed
        } else {
            TransferState::Failed
        };
        complete
    }

    /// Marks the transfer as failed.
    pub fn fail(&mut self) {
        self.state = TransferState::Failed;
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    pub fn declared(&self) -> u64 {
        self.declared
    }

    pub fn received(&self) -> u64 {
        self.received
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_reaches_completed() {
        let mut t = TransferTracker::new(100);
        assert_eq!(t.state(), TransferState::Idle);
        t.metadata(10).unwrap();
        assert_eq!(t.state(), TransferState::MetadataExchanged);
        t.chunk(4).unwrap();
        assert_eq!(t.state(), TransferState::Streaming);
        t.chunk(6).unwrap();
        assert!(t.finish());
        assert_eq!(t.state(), TransferState::Completed);
        assert_eq!(t.received(), 10);
    }

    #[test]
    fn zero_byte_transfer_completes_without_chunks() {
        let mut t = TransferTracker::new(100);
        t.metadata(0).unwrap();
        assert!(t.finish());
        assert_eq!(t.state(), TransferState::Completed);
    }

    #[test]
    fn chunk_before_metadata_is_violation() {
        let mut t = TransferTracker::new(100);
        let err = t.chunk(1).unwrap_err();
        assert!(matches!(err, TransferError::ProtocolViolation(_)));
        assert_eq!(t.state(), TransferState::Failed);
    }

    #[test]
    fn duplicate_metadata_is_violation() {
        let mut t = TransferTracker::new(100);
        t.metadata(1).unwrap();
        assert!(matches!(
            t.metadata(1),
            Err(TransferError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn size_mismatch_fails() {
        let mut t = TransferTracker::new(100);
        t.metadata(10).unwrap();
        t.chunk(5).unwrap();
        assert!(!t.finish());
        assert_eq!(t.state(), TransferState::Failed);
        assert_eq!(t.declared(), 10);
        assert_eq!(t.received(), 5);
    }

    #[test]
    fn declared_size_over_limit_is_rejected() {
        let mut t = TransferTracker::new(8);
        assert!(matches!(
            t.metadata(9),
            Err(TransferError::TooLarge { size: 9, limit: 8 })
        ));
    }

    #[test]
    fn received_bytes_over_limit_are_rejected() {
        let mut t = TransferTracker::new(8);
        t.metadata(4).unwrap();
        t.chunk(8).unwrap();
        assert!(matches!(t.chunk(1), Err(TransferError::TooLarge { .. })));
        assert_eq!(t.state(), TransferState::Failed);
    }

    #[test]
    fn chunk_after_completion_is_violation() {
        let mut t = TransferTracker::new(8);
        t.metadata(0).unwrap();
        t.finish();
        assert!(t.chunk(1).is_err());
    }
}
