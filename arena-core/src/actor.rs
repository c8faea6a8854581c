//! A minimal mailbox runtime on top of tokio tasks. Every actor owns its state and
//! processes messages one at a time; all cross-actor communication is an async send
//! into an unbounded mailbox. A failed send is the liveness signal: the receiver is
//! gone and the sender cleans up its reference.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

static NEXT_ACTOR_ID: AtomicU64 = AtomicU64::new(1);

/// Whether the mailbox loop keeps running after a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// A state machine driven by its mailbox.
pub trait Actor: Send + 'static {
    type Message: Send + 'static;

    /// Handles one message. Returning [`Flow::Stop`] ends the mailbox loop.
    fn handle(&mut self, msg: Self::Message) -> impl Future<Output = Flow> + Send;

    /// Runs once after the mailbox loop ends, for cancelling timers and the like.
    /// Stops are idempotent; this is the only cleanup hook.
    fn stopped(&mut self) -> impl Future<Output = ()> + Send {
        async {}
    }
}

/// Cloneable handle to a running actor.
pub struct Pid<M> {
    id: u64,
    tx: mpsc::UnboundedSender<M>,
}

impl<M> Clone for Pid<M> {
    fn clone(&self) -> Self {
        Pid { id: self.id, tx: self.tx.clone() }
    }
}

impl<M> fmt::Debug for Pid<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pid({})", self.id)
    }
}

/// Error from [`Pid::ask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AskError {
    /// The actor stopped before or while handling the request.
    Gone,
    /// No reply within the deadline.
    Timeout,
}

impl fmt::Display for AskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AskError::Gone => write!(f, "actor is gone"),
            AskError::Timeout => write!(f, "ask timed out"),
        }
    }
}

impl std::error::Error for AskError {}

impl<M: Send + 'static> Pid<M> {
    /// Stable id of the actor behind this handle.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Fire-and-forget send. Returns false if the actor has stopped.
    pub fn send(&self, msg: M) -> bool {
        self.tx.send(msg).is_ok()
    }

    /// True once the actor's mailbox loop has ended.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Request/reply with a deadline. `make` embeds the reply sender into the message.
    /// Not used on the tick hot path; tests and the join flow go through here.
    pub async fn ask<R>(
        &self,
        make: impl FnOnce(oneshot::Sender<R>) -> M,
        deadline: Duration,
    ) -> Result<R, AskError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if !self.send(make(reply_tx)) {
            return Err(AskError::Gone);
        }
        match tokio::time::timeout(deadline, reply_rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(AskError::Gone),
            Err(_) => Err(AskError::Timeout),
        }
    }
}

/// Spawns an actor whose constructor needs its own [`Pid`] (for timers that send
/// back into the mailbox).
pub fn spawn_with<A, F>(make: F) -> Pid<A::Message>
where
    A: Actor,
    F: FnOnce(Pid<A::Message>) -> A,
{
    let (tx, mut rx) = mpsc::unbounded_channel();
    let id = NEXT_ACTOR_ID.fetch_add(1, Ordering::Relaxed);
    let pid = Pid { id, tx };
    let mut actor = make(pid.clone());
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if actor.handle(msg).await == Flow::Stop {
                break;
            }
        }
        // Drain nothing further; late senders see a closed mailbox.
        rx.close();
        actor.stopped().await;
    });
    pid
}

/// Spawns an actor and returns its handle.
pub fn spawn<A: Actor>(actor: A) -> Pid<A::Message> {
    spawn_with(move |_| actor)
}

/// Sends `make()` into the mailbox at a fixed period until the actor stops.
pub fn spawn_ticker<M, F>(pid: Pid<M>, period: Duration, make: F) -> JoinHandle<()>
where
    M: Send + 'static,
    F: Fn() -> M + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if !pid.send(make()) {
                break;
            }
        }
    })
}

/// Delivers one message after `delay`. Dropped silently if the actor stopped first;
/// aborting the returned handle cancels the delivery.
pub fn send_after<M: Send + 'static>(pid: Pid<M>, delay: Duration, msg: M) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let _ = pid.send(msg);
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    enum CounterMsg {
        Add(u64),
        Get { reply: oneshot::Sender<u64> },
        Stop,
    }

    struct Counter {
        value: u64,
    }

    impl Actor for Counter {
        type Message = CounterMsg;

        async fn handle(&mut self, msg: CounterMsg) -> Flow {
            match msg {
                CounterMsg::Add(n) => {
                    self.value += n;
                    Flow::Continue
                }
                CounterMsg::Get { reply } => {
                    let _ = reply.send(self.value);
                    Flow::Continue
                }
                CounterMsg::Stop => Flow::Stop,
            }
        }
    }

    #[tokio::test]
    async fn send_and_ask_round_trip() {
        let pid = spawn(Counter { value: 0 });
        assert!(pid.send(CounterMsg::Add(2)));
        assert!(pid.send(CounterMsg::Add(3)));
        let value = pid
            .ask(|reply| CounterMsg::Get { reply }, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(value, 5);
    }

    #[tokio::test]
    async fn stop_closes_the_mailbox() {
        let pid = spawn(Counter { value: 0 });
        assert!(pid.send(CounterMsg::Stop));
        // Give the loop a moment to wind down.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(pid.is_closed());
        assert!(!pid.send(CounterMsg::Add(1)));
        let err = pid
            .ask(|reply| CounterMsg::Get { reply }, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err, AskError::Gone);
    }

    #[tokio::test]
    async fn ticker_stops_with_the_actor() {
        let pid = spawn(Counter { value: 0 });
        let ticker = spawn_ticker(pid.clone(), Duration::from_millis(5), || CounterMsg::Add(1));
        tokio::time::sleep(Duration::from_millis(40)).await;
        let value = pid
            .ask(|reply| CounterMsg::Get { reply }, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(value >= 2, "expected a few ticks, got {}", value);
        pid.send(CounterMsg::Stop);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(ticker.is_finished());
    }

    #[tokio::test]
    async fn delayed_send_arrives_once() {
        let pid = spawn(Counter { value: 0 });
        send_after(pid.clone(), Duration::from_millis(10), CounterMsg::Add(7));
        tokio::time::sleep(Duration::from_millis(50)).await;
        let value = pid
            .ask(|reply| CounterMsg::Get { reply }, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(value, 7);
    }
}
