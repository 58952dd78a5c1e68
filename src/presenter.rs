//! Transient surface showing one scan: loading, then a verdict or an error,
//! then gone.
//!
//! [`Presenter`] is the bare state machine. [`spawn`] runs it in its own task
//! together with the idle timer, so the timer can never outlive the surface
//! it would dismiss.

use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};
use tracing::debug;

use crate::protocol::{AnalysisResult, PresenterMessage};

const MAILBOX_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DismissReason {
    /// The user closed the surface.
    Closed,
    /// Nobody touched a finished surface for the whole idle window.
    IdleTimeout,
    /// Every handle to the surface was dropped.
    Detached,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PresenterState {
    Loading,
    Result(AnalysisResult),
    Error { message: String },
    Dismissed(DismissReason),
}

impl PresenterState {
    pub fn is_dismissed(&self) -> bool {
        matches!(self, PresenterState::Dismissed(_))
    }

    pub fn dismiss_reason(&self) -> Option<DismissReason> {
        match self {
            PresenterState::Dismissed(reason) => Some(*reason),
            _ => None,
        }
    }

    fn is_settled(&self) -> bool {
        matches!(self, PresenterState::Result(_) | PresenterState::Error { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PresenterEvent {
    Message(PresenterMessage),
    PointerEnter,
    PointerLeave,
    Close,
}

#[derive(Debug)]
pub struct Presenter {
    state: PresenterState,
    hovered: bool,
    idle_window: Duration,
    idle_deadline: Option<Instant>,
}

impl Presenter {
    pub fn new(idle_window: Duration) -> Self {
        Self {
            state: PresenterState::Loading,
            hovered: false,
            idle_window,
            idle_deadline: None,
        }
    }

    pub fn state(&self) -> &PresenterState {
        &self.state
    }

    /// When the surface dismisses itself unless something happens first.
    pub fn idle_deadline(&self) -> Option<Instant> {
        self.idle_deadline
    }

    pub fn handle(&mut self, event: PresenterEvent, now: Instant) {
        if self.state.is_dismissed() {
            return;
        }

        match event {
            PresenterEvent::Message(PresenterMessage::Loading) => {
                self.state = PresenterState::Loading;
            }
            PresenterEvent::Message(PresenterMessage::Done { data }) => {
                self.state = PresenterState::Result(data);
            }
            PresenterEvent::Message(PresenterMessage::Error { error }) => {
                self.state = PresenterState::Error { message: error };
            }
            PresenterEvent::PointerEnter => self.hovered = true,
            PresenterEvent::PointerLeave => self.hovered = false,
            PresenterEvent::Close => {
                self.dismiss(DismissReason::Closed);
                return;
            }
        }

        self.rearm(now);
    }

    /// Called when the idle deadline passes.
    pub fn idle_elapsed(&mut self, now: Instant) {
        match self.idle_deadline {
            Some(deadline) if deadline <= now && !self.hovered => {
                self.dismiss(DismissReason::IdleTimeout);
            }
            _ => {}
        }
    }

    pub fn detach(&mut self) {
        if !self.state.is_dismissed() {
            self.dismiss(DismissReason::Detached);
        }
    }

    // Only a finished, unhovered surface counts down.
    fn rearm(&mut self, now: Instant) {
        self.idle_deadline = if self.state.is_settled() && !self.hovered {
            Some(now + self.idle_window)
        } else {
            None
        };
    }

    fn dismiss(&mut self, reason: DismissReason) {
        self.state = PresenterState::Dismissed(reason);
        self.idle_deadline = None;
    }
}

/// Starts a presenter in its own task, initially `Loading`.
pub fn spawn(idle_window: Duration) -> PresenterHandle {
    let (event_tx, event_rx) = mpsc::channel(MAILBOX_CAPACITY);
    let (state_tx, state_rx) = watch::channel(PresenterState::Loading);

    tokio::spawn(drive(Presenter::new(idle_window), event_rx, state_tx));

    PresenterHandle {
        events: event_tx,
        state: state_rx,
    }
}

async fn drive(
    mut presenter: Presenter,
    mut events: mpsc::Receiver<PresenterEvent>,
    state_tx: watch::Sender<PresenterState>,
) {
    loop {
        let deadline = presenter.idle_deadline();

        tokio::select! {
            event = events.recv() => match event {
                Some(event) => presenter.handle(event, Instant::now()),
                None => presenter.detach(),
            },
            _ = idle(deadline) => presenter.idle_elapsed(Instant::now()),
        }

        state_tx.send_if_modified(|shown| {
            if shown != presenter.state() {
                *shown = presenter.state().clone();
                true
            } else {
                false
            }
        });

        if let Some(reason) = presenter.state().dismiss_reason() {
            debug!(?reason, "presenter dismissed");
            break;
        }
    }
}

async fn idle(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Mailbox and view of a running presenter. Dropping every clone detaches it.
#[derive(Clone)]
pub struct PresenterHandle {
    events: mpsc::Sender<PresenterEvent>,
    state: watch::Receiver<PresenterState>,
}

impl PresenterHandle {
    /// Returns `false` once the presenter is gone.
    pub async fn deliver(&self, message: PresenterMessage) -> bool {
        self.send(PresenterEvent::Message(message)).await
    }

    pub async fn pointer_enter(&self) -> bool {
        self.send(PresenterEvent::PointerEnter).await
    }

    pub async fn pointer_leave(&self) -> bool {
        self.send(PresenterEvent::PointerLeave).await
    }

    pub async fn close(&self) -> bool {
        self.send(PresenterEvent::Close).await
    }

    pub fn state(&self) -> PresenterState {
        self.state.borrow().clone()
    }

    /// A view of the surface that does not keep it alive.
    pub fn subscribe(&self) -> watch::Receiver<PresenterState> {
        self.state.clone()
    }

    /// Waits until `predicate` holds, or returns the final state if the
    /// presenter stops first.
    pub async fn wait_for(&self, predicate: impl FnMut(&PresenterState) -> bool) -> PresenterState {
        let mut rx = self.state.clone();
        let matched = rx.wait_for(predicate).await.map(|state| state.clone()).ok();
        matched.unwrap_or_else(|| self.state.borrow().clone())
    }

    pub async fn dismissed(&self) -> DismissReason {
        self.wait_for(PresenterState::is_dismissed)
            .await
            .dismiss_reason()
            .unwrap_or(DismissReason::Detached)
    }

    async fn send(&self, event: PresenterEvent) -> bool {
        self.events.send(event).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDLE: Duration = Duration::from_secs(10);

    fn verdict() -> PresenterMessage {
        PresenterMessage::Done {
            data: AnalysisResult {
                rating: "Seems legit".into(),
                score: Some(0.91),
                source_url: None,
            },
        }
    }

    fn assert_near(actual: Duration, expected: Duration) {
        assert!(
            actual >= expected && actual < expected + Duration::from_millis(5),
            "expected ~{:?}, got {:?}",
            expected,
            actual
        );
    }

    #[test]
    fn loading_does_not_count_down() {
        let now = Instant::now();
        let mut presenter = Presenter::new(IDLE);

        presenter.handle(PresenterEvent::PointerLeave, now);
        assert_eq!(presenter.idle_deadline(), None);

        presenter.handle(PresenterEvent::Message(verdict()), now);
        assert_eq!(presenter.idle_deadline(), Some(now + IDLE));

        presenter.handle(PresenterEvent::Message(PresenterMessage::Loading), now);
        assert_eq!(presenter.state(), &PresenterState::Loading);
        assert_eq!(presenter.idle_deadline(), None);
    }

    #[test]
    fn hovering_cancels_and_leaving_rearms() {
        let now = Instant::now();
        let mut presenter = Presenter::new(IDLE);
        presenter.handle(PresenterEvent::Message(verdict()), now);

        presenter.handle(PresenterEvent::PointerEnter, now + Duration::from_secs(3));
        assert_eq!(presenter.idle_deadline(), None);
        presenter.idle_elapsed(now + Duration::from_secs(60));
        assert!(!presenter.state().is_dismissed());

        let left = now + Duration::from_secs(61);
        presenter.handle(PresenterEvent::PointerLeave, left);
        assert_eq!(presenter.idle_deadline(), Some(left + IDLE));
    }

    #[test]
    fn result_arriving_while_hovered_waits_for_leave() {
        let now = Instant::now();
        let mut presenter = Presenter::new(IDLE);
        presenter.handle(PresenterEvent::PointerEnter, now);
        presenter.handle(
            PresenterEvent::Message(PresenterMessage::Error {
                error: "Couldn't reach the service".into(),
            }),
            now,
        );

        assert_eq!(presenter.idle_deadline(), None);
    }

    #[test]
    fn dismissal_is_terminal() {
        let now = Instant::now();
        let mut presenter = Presenter::new(IDLE);
        presenter.handle(PresenterEvent::Close, now);

        presenter.handle(PresenterEvent::Message(verdict()), now);
        presenter.detach();

        assert_eq!(presenter.state(), &PresenterState::Dismissed(DismissReason::Closed));
        assert_eq!(presenter.idle_deadline(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn finished_surface_dismisses_after_idle_window() {
        let presenter = spawn(IDLE);
        assert_eq!(presenter.state(), PresenterState::Loading);

        presenter.deliver(verdict()).await;
        let shown = presenter
            .wait_for(|state| matches!(state, PresenterState::Result(_)))
            .await;
        assert!(matches!(shown, PresenterState::Result(ref r) if r.rating == "Seems legit"));

        let shown_at = Instant::now();
        assert_eq!(presenter.dismissed().await, DismissReason::IdleTimeout);
        assert_near(shown_at.elapsed(), IDLE);
    }

    #[tokio::test(start_paused = true)]
    async fn loading_surface_never_times_out() {
        let presenter = spawn(IDLE);

        tokio::time::sleep(Duration::from_secs(120)).await;

        assert_eq!(presenter.state(), PresenterState::Loading);
    }

    #[tokio::test(start_paused = true)]
    async fn continuous_hover_keeps_surface_open() {
        let presenter = spawn(IDLE);
        presenter.deliver(verdict()).await;
        presenter.pointer_enter().await;

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert!(matches!(presenter.state(), PresenterState::Result(_)));

        presenter.pointer_leave().await;
        let left_at = Instant::now();
        assert_eq!(presenter.dismissed().await, DismissReason::IdleTimeout);
        assert_near(left_at.elapsed(), IDLE);
    }

    #[tokio::test(start_paused = true)]
    async fn new_outcome_restarts_the_window() {
        let presenter = spawn(IDLE);
        presenter.deliver(verdict()).await;

        tokio::time::sleep(Duration::from_secs(6)).await;
        presenter
            .deliver(PresenterMessage::Error {
                error: "The credibility service took too long to respond.".into(),
            })
            .await;
        let restarted_at = Instant::now();

        assert_eq!(presenter.dismissed().await, DismissReason::IdleTimeout);
        assert_near(restarted_at.elapsed(), IDLE);
    }

    #[tokio::test(start_paused = true)]
    async fn close_dismisses_immediately_and_ignores_later_messages() {
        let presenter = spawn(IDLE);
        presenter
            .deliver(PresenterMessage::Error {
                error: "Not enough readable text here to check.".into(),
            })
            .await;
        presenter.close().await;

        let started = Instant::now();
        assert_eq!(presenter.dismissed().await, DismissReason::Closed);
        assert_eq!(started.elapsed(), Duration::ZERO);

        assert!(!presenter.deliver(verdict()).await);
        assert_eq!(presenter.state(), PresenterState::Dismissed(DismissReason::Closed));
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_every_handle_detaches() {
        let presenter = spawn(IDLE);
        let mut view = presenter.subscribe();
        drop(presenter);

        let state = view.wait_for(PresenterState::is_dismissed).await.unwrap().clone();
        assert_eq!(state, PresenterState::Dismissed(DismissReason::Detached));
    }
}
