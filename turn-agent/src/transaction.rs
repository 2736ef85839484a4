use crate::error::StunAgentError;
use crate::rtt::{RetransmissionTimer, RttConfig};
use crate::timeout::TimeoutQueue;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::time::Instant;
use turn_rs::attributes::stun::{ErrorCode, MessageIntegrity};
use turn_rs::{
    DecoderContextBuilder, HMACKey, MessageClass, MessageDecoderBuilder, MessageMethod,
    StunMessage, TransactionId,
};

/// Ways a transaction can end without a success response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    /// No valid response arrived in time
    TimedOut,
    /// Responses arrived but none of them passed the integrity check
    ProtectionViolated,
    /// The server sent an error response
    ServerError {
        /// Numeric error code
        code: u16,
        /// Reason phrase
        reason: String,
        /// The whole response, needed to pick up REALM and NONCE
        response: Box<StunMessage>,
    },
}

/// Output of [`TransactionEngine::on_timeout`]
#[derive(Debug)]
pub enum TransactionEvent {
    /// The request must be sent again
    Retransmit(Vec<u8>),
    /// The transaction failed
    Failed(TransactionId, TransactionError),
}

#[derive(Debug)]
struct Transaction {
    method: MessageMethod,
    buffer: Vec<u8>,
    key: Option<HMACKey>,
    timer: RetransmissionTimer,
    deadline: Instant,
    integrity_violated: bool,
}

/// Tracks the outstanding requests of a client: retransmissions, timeouts
/// and the matching of responses. Several transactions can be in progress
/// at once, but only one per transaction id.
#[derive(Debug)]
pub struct TransactionEngine {
    rtt: RttConfig,
    reliable: bool,
    transactions: HashMap<TransactionId, Transaction>,
    timeouts: TimeoutQueue<TransactionId>,
}

impl TransactionEngine {
    pub fn new(rtt: RttConfig, reliable: bool) -> Self {
        Self {
            rtt,
            reliable,
            transactions: HashMap::new(),
            timeouts: TimeoutQueue::default(),
        }
    }

    /// Registers a request that has just been sent for the first time.
    /// `key` is the key used to protect the request, responses must be
    /// protected with the same key.
    pub fn start(
        &mut self,
        transaction_id: TransactionId,
        method: MessageMethod,
        buffer: Vec<u8>,
        key: Option<HMACKey>,
        instant: Instant,
    ) -> Result<(), StunAgentError> {
        if self.transactions.contains_key(&transaction_id) {
            warn!("Transaction {} already in progress", transaction_id);
            return Err(StunAgentError::DuplicatedTransaction);
        }

        let mut timer = RetransmissionTimer::new(&self.rtt, self.reliable);
        let Some(rto) = timer.next_rto() else {
            // Validated configurations always provide a first timeout
            return Err(StunAgentError::Discarded);
        };
        let deadline = instant + rto;
        debug!("set timeout {:?} for {}", rto, transaction_id);

        self.timeouts.add(deadline, transaction_id);
        self.transactions.insert(
            transaction_id,
            Transaction {
                method,
                buffer,
                key,
                timer,
                deadline,
                integrity_violated: false,
            },
        );
        Ok(())
    }

    pub fn contains(&self, transaction_id: &TransactionId) -> bool {
        self.transactions.contains_key(transaction_id)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Time left until the next retransmission or failure.
    #[cfg(test)]
    pub fn next_timeout(&self, instant: Instant) -> Option<std::time::Duration> {
        self.timeouts.next_timeout(instant)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timeouts.next_deadline()
    }

    /// Drops every transaction and timer. No event is produced for them.
    pub fn cancel_all(&mut self) {
        if !self.transactions.is_empty() {
            debug!("Cancelling {} transactions", self.transactions.len());
        }
        self.transactions.clear();
        self.timeouts.clear();
    }

    fn finish(&mut self, transaction_id: &TransactionId) -> Option<Transaction> {
        self.timeouts.remove(transaction_id);
        self.transactions.remove(transaction_id)
    }

    // A response to a protected request is valid if it carries a
    // MESSAGE-INTEGRITY computed with the request key. Error responses
    // without MESSAGE-INTEGRITY are accepted, servers can not protect a 401
    // or 438 sent because of the credentials themselves.
    fn check_integrity(raw: &[u8], msg: &StunMessage, key: &HMACKey) -> bool {
        if !msg.contains::<MessageIntegrity>() {
            return msg.class() == MessageClass::ErrorResponse;
        }

        let ctx = DecoderContextBuilder::default()
            .with_key(key.clone())
            .with_validation()
            .build();
        let decoder = MessageDecoderBuilder::default().with_context(ctx).build();
        decoder.decode(raw).is_ok()
    }

    /// Matches a decoded response with its transaction. `raw` is the buffer
    /// the message was decoded from. Returns `None` if the message is not a
    /// valid response for any outstanding transaction, in which case it
    /// must be ignored as if it was never received.
    pub fn on_response(
        &mut self,
        raw: &[u8],
        msg: StunMessage,
    ) -> Option<(TransactionId, Result<StunMessage, TransactionError>)> {
        let transaction_id = *msg.transaction_id();
        let Some(transaction) = self.transactions.get_mut(&transaction_id) else {
            debug!(
                "Received response with no matching {}. Discarding.",
                transaction_id
            );
            return None;
        };

        if transaction.method != msg.method() {
            debug!(
                "Response method {} does not match the request method {}. Discarding.",
                msg.method(),
                transaction.method
            );
            return None;
        }

        if let Some(key) = &transaction.key {
            if !Self::check_integrity(raw, &msg, key) {
                if self.reliable {
                    info!("[{}] Integrity check failed", transaction_id);
                    self.finish(&transaction_id);
                    return Some((transaction_id, Err(TransactionError::ProtectionViolated)));
                }
                // Keep retransmitting as if the response was never received
                debug!("[{}] Integrity check failed. Discarding.", transaction_id);
                transaction.integrity_violated = true;
                return None;
            }
        }

        self.finish(&transaction_id);

        if msg.class() == MessageClass::ErrorResponse {
            let (code, reason) = match msg.get::<ErrorCode>().map(|attr| attr.as_error_code()) {
                Some(Ok(attr)) => (
                    attr.error_code().error_code(),
                    attr.error_code().reason().to_string(),
                ),
                // Error responses must carry ERROR-CODE, report a generic
                // server failure otherwise
                _ => (500, String::from("Server Error")),
            };
            return Some((
                transaction_id,
                Err(TransactionError::ServerError {
                    code,
                    reason,
                    response: Box::new(msg),
                }),
            ));
        }

        Some((transaction_id, Ok(msg)))
    }

    /// Handles every expired deadline.
    pub fn on_timeout(&mut self, instant: Instant) -> Vec<TransactionEvent> {
        let mut events = Vec::new();

        for transaction_id in self.timeouts.check(instant) {
            let Some(transaction) = self.transactions.get_mut(&transaction_id) else {
                warn!("No transaction found for {}", transaction_id);
                continue;
            };

            match transaction.timer.next_rto() {
                Some(rto) => {
                    transaction.deadline += rto;
                    self.timeouts.add(transaction.deadline, transaction_id);
                    debug!("retransmit {}, next timeout {:?}", transaction_id, rto);
                    events.push(TransactionEvent::Retransmit(transaction.buffer.clone()));
                }
                None => {
                    let error = if transaction.integrity_violated {
                        TransactionError::ProtectionViolated
                    } else {
                        TransactionError::TimedOut
                    };
                    info!("Transaction {} failed: {:?}", transaction_id, error);
                    self.transactions.remove(&transaction_id);
                    events.push(TransactionEvent::Failed(transaction_id, error));
                }
            }
        }

        events
    }
}
