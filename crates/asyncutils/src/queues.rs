//! Cross-thread message queues (SPEC_FULL.md §5, §9: coroutine-style
//! `fg_call_later`/`bg_call_later` become explicit MPSC queues drained
//! between event-loop ticks rather than arbitrary-depth callbacks).

use futures::channel::mpsc;

/// One direction of the foreground/background queue pair. `T` is
/// whatever message shape the caller needs (model mutation, task
/// result, …) — this module only owns the plumbing.
pub type Sender<T> = mpsc::UnboundedSender<T>;
pub type Receiver<T> = mpsc::UnboundedReceiver<T>;

pub fn channel<T>() -> (Sender<T>, Receiver<T>) {
    mpsc::unbounded()
}

/// The pair of queues a foreground/background thread split needs:
/// work handed to the background side, and results/mutations handed
/// back to the foreground side.
pub struct MessageQueues<ToForeground, ToBackground> {
    pub to_foreground: (Sender<ToForeground>, Receiver<ToForeground>),
    pub to_background: (Sender<ToBackground>, Receiver<ToBackground>),
}

impl<ToForeground, ToBackground> MessageQueues<ToForeground, ToBackground> {
    pub fn new() -> Self {
        Self { to_foreground: channel(), to_background: channel() }
    }
}

impl<ToForeground, ToBackground> Default for MessageQueues<ToForeground, ToBackground> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn a_sent_message_is_received_in_order() {
        let (tx, mut rx) = channel::<u32>();
        tx.unbounded_send(1).unwrap();
        tx.unbounded_send(2).unwrap();
        drop(tx);
        assert_eq!(rx.next().await, Some(1));
        assert_eq!(rx.next().await, Some(2));
        assert_eq!(rx.next().await, None);
    }
}
