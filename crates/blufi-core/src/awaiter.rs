// ── Awaiter ──
//
// Races a predicate over bus events against a deadline. Each expectation
// owns exactly one subscription, released on every exit path.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::bus::{EventBus, Observed, Subscription};
use crate::matcher::Signal;
use crate::model::EventKind;

type Predicate = Box<dyn Fn(&Observed) -> bool + Send + Sync>;

#[derive(Clone)]
pub struct Awaiter {
    bus: EventBus,
}

impl Awaiter {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }

    /// Arm an expectation now; events published from here on are considered.
    pub fn expect(
        &self,
        scope: &CancellationToken,
        kinds: &[EventKind],
        predicate: impl Fn(&Observed) -> bool + Send + Sync + 'static,
    ) -> Expectation {
        Expectation {
            subscription: self.bus.subscribe(kinds, scope),
            predicate: Box::new(predicate),
        }
    }

    /// Arm an expectation on classified signals.
    pub fn expect_signal(
        &self,
        scope: &CancellationToken,
        predicate: impl Fn(Signal) -> bool + Send + Sync + 'static,
    ) -> Expectation {
        self.expect(scope, EventKind::SIGNALS, move |observed| {
            observed.signal.is_some_and(&predicate)
        })
    }

    /// `true` if the predicate holds for some event before `deadline`.
    pub async fn wait_for(
        &self,
        scope: &CancellationToken,
        kinds: &[EventKind],
        predicate: impl Fn(&Observed) -> bool + Send + Sync + 'static,
        deadline: Duration,
    ) -> bool {
        self.expect(scope, kinds, predicate).resolve(deadline).await
    }
}

/// A pending wait. Dropping it releases its subscription.
pub struct Expectation {
    subscription: Subscription,
    predicate: Predicate,
}

impl Expectation {
    /// Next matching event with no deadline. `None` once the scope ends.
    pub async fn next_match(&mut self) -> Option<Arc<Observed>> {
        while let Some(observed) = self.subscription.recv().await {
            if (self.predicate)(&observed) {
                return Some(observed);
            }
        }
        None
    }

    /// Matching event among those already delivered, without waiting.
    pub fn try_match(&mut self) -> Option<Arc<Observed>> {
        while let Some(observed) = self.subscription.try_recv() {
            if (self.predicate)(&observed) {
                return Some(observed);
            }
        }
        None
    }

    /// Wait for a match until `deadline`. An event that is ready when the
    /// deadline fires still counts; anything later is ignored.
    pub async fn resolve_matching(mut self, deadline: Duration) -> Option<Arc<Observed>> {
        let timer = tokio::time::sleep(deadline);
        tokio::pin!(timer);

        let outcome = tokio::select! {
            biased;
            hit = self.next_match() => hit,
            () = &mut timer => self.try_match(),
        };
        self.subscription.cancel();
        outcome
    }

    pub async fn resolve(self, deadline: Duration) -> bool {
        self.resolve_matching(deadline).await.is_some()
    }

    pub fn cancel(&self) {
        self.subscription.cancel();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use blufi_api::RawEvent;

    use super::*;
    use crate::store::{Catalog, SessionLog};

    fn setup() -> (EventBus, Awaiter) {
        let bus = EventBus::new(64, Arc::new(SessionLog::new()), Arc::new(Catalog::new()));
        let awaiter = Awaiter::new(bus.clone());
        (bus, awaiter)
    }

    fn joined(signal: Signal) -> bool {
        signal == Signal::WifiJoined
    }

    #[tokio::test(start_paused = true)]
    async fn resolves_on_matching_event_and_releases_subscription() {
        let (bus, awaiter) = setup();
        let scope = bus.scope();
        let expectation = awaiter.expect_signal(&scope, joined);
        assert_eq!(bus.active_subscriptions(), 1);

        let publisher = bus.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            publisher.ingest(RawEvent::log("Security Result: 0"));
            publisher.ingest(RawEvent::status("Connected to Wi-Fi"));
        });

        let hit = expectation.resolve_matching(Duration::from_secs(10)).await.unwrap();
        assert_eq!(hit.signal, Some(Signal::WifiJoined));
        assert_eq!(bus.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn non_matching_events_keep_the_wait_pending() {
        let (bus, awaiter) = setup();
        let scope = bus.scope();
        let mut expectation = awaiter.expect_signal(&scope, joined);
        let mut next = tokio_test::task::spawn(expectation.next_match());

        tokio_test::assert_pending!(next.poll());
        bus.ingest(RawEvent::log("Security Result: 0"));
        tokio_test::assert_pending!(next.poll());
        bus.ingest(RawEvent::status("Connected to Wi-Fi"));

        let hit = tokio_test::assert_ready!(next.poll()).unwrap();
        assert_eq!(hit.signal, Some(Signal::WifiJoined));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_yields_false_and_releases_subscription() {
        let (bus, awaiter) = setup();
        let scope = bus.scope();
        let started = tokio::time::Instant::now();

        let hit = awaiter
            .wait_for(&scope, EventKind::SIGNALS, |o| o.signal.is_some(), Duration::from_secs(10))
            .await;

        assert!(!hit);
        assert_eq!(started.elapsed(), Duration::from_secs(10));
        assert_eq!(bus.active_subscriptions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn event_ready_at_the_deadline_wins() {
        let (bus, awaiter) = setup();
        let scope = bus.scope();
        let expectation = awaiter.expect_signal(&scope, joined);

        bus.ingest(RawEvent::status("Connected to Wi-Fi"));

        assert!(expectation.resolve(Duration::ZERO).await);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_resolves_promptly_as_false() {
        let (bus, awaiter) = setup();
        let scope = bus.scope();
        let expectation = awaiter.expect_signal(&scope, joined);

        let canceller = scope.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let started = tokio::time::Instant::now();
        assert!(!expectation.resolve(Duration::from_secs(30)).await);
        assert_eq!(started.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn late_events_do_not_reach_a_timed_out_wait() {
        let (bus, awaiter) = setup();
        let scope = bus.scope();
        let expectation = awaiter.expect_signal(&scope, joined);

        assert!(!expectation.resolve(Duration::from_secs(2)).await);
        bus.ingest(RawEvent::status("Connected to Wi-Fi"));
        assert_eq!(bus.active_subscriptions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_waits_are_independent() {
        let (bus, awaiter) = setup();
        let scope = bus.scope();
        let security = awaiter.expect_signal(&scope, |s| s == Signal::SecurityOk);
        let wifi = awaiter.expect_signal(&scope, joined);

        bus.ingest(RawEvent::status("Security Result: 0"));

        let (a, b) = tokio::join!(
            security.resolve(Duration::from_secs(5)),
            wifi.resolve(Duration::from_secs(5)),
        );
        assert!(a);
        assert!(!b);
        assert_eq!(bus.active_subscriptions(), 0);
    }
}
