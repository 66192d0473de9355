// Ingress acknowledgment contract.
//
// A Delivery wraps one event from the partitioned source together with a
// one-shot reply channel. The consumer acks only after the decision has
// been handed to the sink; a nack asks the source to redeliver.

use tokio::sync::oneshot;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acknowledgment {
    Ack,
    Nack { reason: String },
}

impl Acknowledgment {
    pub fn is_ack(&self) -> bool {
        matches!(self, Acknowledgment::Ack)
    }
}

#[derive(Debug)]
pub struct Delivery<T> {
    pub payload: T,
    /// 1 for the first delivery, incremented by the source on redelivery
    pub attempt: u32,
    reply: oneshot::Sender<Acknowledgment>,
}

impl<T> Delivery<T> {
    pub fn new(payload: T) -> (Self, oneshot::Receiver<Acknowledgment>) {
        Self::with_attempt(payload, 1)
    }

    pub fn with_attempt(payload: T, attempt: u32) -> (Self, oneshot::Receiver<Acknowledgment>) {
        let (reply, rx) = oneshot::channel();
        (
            Self {
                payload,
                attempt,
                reply,
            },
            rx,
        )
    }

    // The source may have gone away; there is nobody left to tell.
    pub fn ack(self) {
        let _ = self.reply.send(Acknowledgment::Ack);
    }

    pub fn nack(self, reason: impl Into<String>) {
        let _ = self.reply.send(Acknowledgment::Nack {
            reason: reason.into(),
        });
    }
}
