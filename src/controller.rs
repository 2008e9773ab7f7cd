//! Pull-to-refresh controller: binds the recognizer to a surface, a form
//! factor and a refresh action.
//!
//! Touch events are only delivered while the controller's listeners are
//! attached to the registered surface, and listeners are only attached on a
//! mobile form factor. A settled refresh is applied on the next [`poll`].
//!
//! [`poll`]: PullToRefresh::poll

use log::{debug, info, warn};
use std::{sync::Arc, time::Duration};

use crate::config::Profile;
use crate::pull::{EndOutcome, MoveOutcome, PullRecognizer, PullState};
use crate::refresh::{RefreshAction, RefreshRunner, Settled};
use crate::surface::{ListenerId, Surface};
use crate::tracker::{TouchEvent, TouchPhase};
use crate::viewport::{FormFactor, FormFactorWatch, Viewport};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Dispatch {
    /// No listener on the surface; the event never reached the recognizer.
    Detached,
    Ignored,
    Tracking,
    Pulling { distance: f32, prevent_default: bool },
    Released { distance: f32 },
    RefreshStarted { generation: u64, distance: f32 },
}

pub struct PullToRefresh {
    id: ListenerId,
    recognizer: PullRecognizer,
    form_factor: FormFactorWatch,
    surface: Surface,
    action: Arc<dyn RefreshAction>,
    runner: RefreshRunner,
    mounted: bool,
}

impl PullToRefresh {
    pub fn new(threshold: f32, form_factor: FormFactorWatch, action: Arc<dyn RefreshAction>) -> Self {
        Self {
            id: ListenerId::next(),
            recognizer: PullRecognizer::new(threshold),
            form_factor,
            surface: Surface::document(),
            action,
            runner: RefreshRunner::new(),
            mounted: false,
        }
    }

    /// Threshold, form factor and refresh action all come from the profile.
    pub fn from_profile(profile: &Profile) -> Self {
        Self::new(
            profile.pull.threshold_px,
            profile.form_factor(),
            profile.refresh_action(),
        )
    }

    pub fn is_refreshing(&self) -> bool {
        self.recognizer.is_refreshing()
    }

    pub fn state(&self) -> PullState {
        self.recognizer.state()
    }

    pub fn recognizer(&self) -> &PullRecognizer {
        &self.recognizer
    }

    pub fn pull_distance(&self) -> Option<f32> {
        self.recognizer.pull_distance()
    }

    pub fn form_factor(&self) -> FormFactor {
        self.form_factor.current()
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut Surface {
        &mut self.surface
    }

    pub fn is_listening(&self) -> bool {
        self.surface.is_attached(self.id)
    }

    pub fn mount(&mut self) {
        self.mounted = true;
        self.sync_listeners();
    }

    pub fn unmount(&mut self) {
        self.mounted = false;
        self.sync_listeners();
    }

    /// Swaps the observed container and returns the previous one, with this
    /// controller's listeners removed from it.
    pub fn register_container(&mut self, surface: Surface) -> Surface {
        let mut old = std::mem::replace(&mut self.surface, surface);
        old.detach(self.id);
        // a gesture started on the old container cannot finish on the new one
        self.recognizer.cancel();
        self.sync_listeners();
        debug!("observing container '{}'", self.surface.name());
        old
    }

    /// Replaces the refresh action and re-registers listeners. A refresh
    /// already in flight keeps running with the old action.
    pub fn set_action(&mut self, action: Arc<dyn RefreshAction>) {
        self.action = action;
        self.surface.detach(self.id);
        self.sync_listeners();
    }

    pub fn resize(&mut self, viewport: Viewport) -> Option<FormFactor> {
        let changed = self.form_factor.resize(viewport)?;
        info!("form factor changed to {changed:?}");
        self.sync_listeners();
        Some(changed)
    }

    fn sync_listeners(&mut self) {
        if self.mounted && self.form_factor.is_mobile() {
            if self.surface.attach(self.id) {
                debug!("touch listeners attached to '{}'", self.surface.name());
            }
        } else {
            if self.surface.detach(self.id) {
                debug!("touch listeners detached from '{}'", self.surface.name());
            }
            if self.recognizer.cancel() {
                debug!("abandoned gesture in progress");
            }
        }
    }

    pub fn handle(&mut self, ev: TouchEvent) -> Dispatch {
        if !self.surface.accepts(self.id, ev.phase) {
            return Dispatch::Detached;
        }
        match ev.phase {
            TouchPhase::Start => {
                if self.recognizer.touch_start(ev.y, self.surface.scroll_top()) {
                    Dispatch::Tracking
                } else {
                    Dispatch::Ignored
                }
            }
            TouchPhase::Move => match self.recognizer.touch_move(ev.y) {
                MoveOutcome::Ignored => Dispatch::Ignored,
                MoveOutcome::Pulling {
                    distance,
                    prevent_default,
                } => Dispatch::Pulling {
                    distance,
                    prevent_default,
                },
            },
            TouchPhase::End => match self.recognizer.touch_end() {
                EndOutcome::Ignored => Dispatch::Ignored,
                EndOutcome::Released { distance } => Dispatch::Released { distance },
                EndOutcome::Triggered { distance } => {
                    let generation = self.runner.start(self.action.clone());
                    info!(
                        "pull of {distance:.0}px crossed threshold; refreshing ({})",
                        self.action.describe()
                    );
                    Dispatch::RefreshStarted {
                        generation,
                        distance,
                    }
                }
            },
        }
    }

    /// Applies any settled refreshes without blocking.
    pub fn poll(&mut self) -> Vec<Settled> {
        let mut out = Vec::new();
        while let Some(s) = self.runner.try_settled() {
            self.apply(&s);
            out.push(s);
        }
        out
    }

    pub fn wait_settled(&mut self, timeout: Option<Duration>) -> Option<Settled> {
        let s = self.runner.wait_settled(timeout)?;
        self.apply(&s);
        Some(s)
    }

    fn apply(&mut self, s: &Settled) {
        match &s.outcome {
            Ok(()) => info!("refresh #{} finished in {:?}", s.generation, s.elapsed),
            Err(e) => warn!("refresh #{} failed after {:?}: {e}", s.generation, s.elapsed),
        }
        self.recognizer.settle();
    }
}

impl Drop for PullToRefresh {
    fn drop(&mut self) {
        self.surface.detach(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pull::PULL_THRESHOLD;
    use crate::refresh::RefreshError;
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
        mpsc,
    };

    const WAIT: Option<Duration> = Some(Duration::from_secs(5));

    fn counting(calls: &Arc<AtomicUsize>) -> Arc<dyn RefreshAction> {
        let calls = calls.clone();
        Arc::new(move || -> Result<(), RefreshError> {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    /// An action that holds until the test releases it.
    fn gated(calls: &Arc<AtomicUsize>) -> (Arc<dyn RefreshAction>, mpsc::Sender<bool>) {
        let (tx, rx) = mpsc::channel::<bool>();
        let rx = Mutex::new(rx);
        let calls = calls.clone();
        let action: Arc<dyn RefreshAction> = Arc::new(move || -> Result<(), RefreshError> {
            calls.fetch_add(1, Ordering::SeqCst);
            let ok = rx.lock().unwrap().recv().unwrap_or(false);
            if ok {
                Ok(())
            } else {
                Err(RefreshError::Failed("backend unavailable".into()))
            }
        });
        (action, tx)
    }

    fn mobile(action: Arc<dyn RefreshAction>) -> PullToRefresh {
        let mut p = PullToRefresh::new(
            PULL_THRESHOLD,
            FormFactorWatch::fixed(FormFactor::Mobile),
            action,
        );
        p.mount();
        p
    }

    fn pull(p: &mut PullToRefresh, from: f32, to: f32) -> Dispatch {
        p.handle(TouchEvent::start(from));
        p.handle(TouchEvent::moved(to));
        p.handle(TouchEvent::end(to))
    }

    #[test]
    fn scenario_pull_past_threshold() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut p = mobile(counting(&calls));

        assert_eq!(p.state(), PullState::Idle);
        assert_eq!(p.handle(TouchEvent::start(200.0)), Dispatch::Tracking);
        assert_eq!(
            p.handle(TouchEvent::moved(320.0)),
            Dispatch::Pulling {
                distance: 120.0,
                prevent_default: true
            }
        );
        assert!(matches!(
            p.handle(TouchEvent::end(320.0)),
            Dispatch::RefreshStarted { distance, .. } if distance == 120.0
        ));
        assert!(p.is_refreshing());

        let s = p.wait_settled(WAIT).expect("settled");
        assert!(s.outcome.is_ok());
        assert_eq!(p.state(), PullState::Idle);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn scenario_short_pull() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut p = mobile(counting(&calls));
        assert_eq!(pull(&mut p, 200.0, 260.0), Dispatch::Released { distance: 60.0 });
        assert_eq!(p.state(), PullState::Idle);
        assert!(p.wait_settled(WAIT).is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn scrolled_surface_never_refreshes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut p = mobile(counting(&calls));
        p.surface_mut().scroll_to(80.0);

        assert_eq!(p.handle(TouchEvent::start(10.0)), Dispatch::Ignored);
        // scrolling back to the top mid-gesture does not re-sample
        p.surface_mut().scroll_to(0.0);
        assert_eq!(p.handle(TouchEvent::moved(700.0)), Dispatch::Ignored);
        assert_eq!(p.handle(TouchEvent::end(700.0)), Dispatch::Ignored);
        assert_eq!(p.recognizer().last_scroll_top(), 80.0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn gestures_ignored_while_refreshing() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (action, release) = gated(&calls);
        let mut p = mobile(action);

        assert!(matches!(pull(&mut p, 0.0, 150.0), Dispatch::RefreshStarted { .. }));
        assert_eq!(pull(&mut p, 0.0, 400.0), Dispatch::Ignored);
        assert_eq!(p.state(), PullState::Refreshing);
        assert!(p.poll().is_empty());

        release.send(true).expect("release");
        assert!(p.wait_settled(WAIT).is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_refresh_settles_to_idle() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (action, release) = gated(&calls);
        let mut p = mobile(action);

        pull(&mut p, 10.0, 200.0);
        release.send(false).expect("release");
        let s = p.wait_settled(WAIT).expect("settled");
        assert!(s.outcome.is_err());
        assert_eq!(p.state(), PullState::Idle);
        assert_eq!(p.recognizer().positions(), (0.0, 0.0));

        // ready for the next gesture
        assert!(matches!(pull(&mut p, 10.0, 200.0), Dispatch::RefreshStarted { .. }));
        release.send(true).expect("release");
        assert!(p.wait_settled(WAIT).is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn desktop_attaches_nothing() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut p = PullToRefresh::new(
            PULL_THRESHOLD,
            FormFactorWatch::fixed(FormFactor::Desktop),
            counting(&calls),
        );
        p.mount();
        assert!(!p.is_listening());
        assert_eq!(p.surface().listener_count(), 0);
        assert_eq!(pull(&mut p, 0.0, 500.0), Dispatch::Detached);
        assert_eq!(p.state(), PullState::Idle);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn resize_moves_between_form_factors() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut p = PullToRefresh::new(
            PULL_THRESHOLD,
            FormFactorWatch::auto(Viewport { width: 1280, height: 800 }, 768),
            counting(&calls),
        );
        p.mount();
        assert!(!p.is_listening());

        assert_eq!(p.resize(Viewport { width: 390, height: 844 }), Some(FormFactor::Mobile));
        assert!(p.is_listening());
        assert_eq!(p.surface().listener_count(), 3);

        assert_eq!(p.resize(Viewport { width: 1024, height: 768 }), Some(FormFactor::Desktop));
        assert!(!p.is_listening());
        assert_eq!(p.handle(TouchEvent::start(0.0)), Dispatch::Detached);
    }

    #[test]
    fn mount_and_action_swaps_leave_no_duplicates() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut p = mobile(counting(&calls));
        p.mount();
        assert_eq!(p.surface().listener_count(), 3);

        let other = Arc::new(AtomicUsize::new(0));
        p.set_action(counting(&other));
        p.set_action(counting(&other));
        assert_eq!(p.surface().listener_count(), 3);

        pull(&mut p, 0.0, 150.0);
        p.wait_settled(WAIT);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(other.load(Ordering::SeqCst), 1);

        p.unmount();
        p.unmount();
        assert_eq!(p.surface().listener_count(), 0);
    }

    #[test]
    fn register_container_moves_listeners() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut p = mobile(counting(&calls));
        let mut list = Surface::new("transactions");
        list.scroll_to(0.0);

        let old = p.register_container(list);
        assert_eq!(old.name(), "document");
        assert_eq!(old.listener_count(), 0);
        assert_eq!(p.surface().name(), "transactions");
        assert!(p.is_listening());
    }

    #[test]
    fn resize_mid_gesture_abandons_it() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut p = PullToRefresh::new(
            PULL_THRESHOLD,
            FormFactorWatch::auto(Viewport { width: 390, height: 844 }, 768),
            counting(&calls),
        );
        p.mount();
        p.handle(TouchEvent::start(0.0));
        p.handle(TouchEvent::moved(300.0));

        p.resize(Viewport { width: 1280, height: 800 });
        assert_eq!(p.state(), PullState::Idle);
        p.resize(Viewport { width: 390, height: 844 });

        assert_eq!(p.handle(TouchEvent::end(300.0)), Dispatch::Ignored);
        assert!(p.wait_settled(WAIT).is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unmount_and_container_swap_abandon_gesture() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut p = mobile(counting(&calls));

        p.handle(TouchEvent::start(0.0));
        p.handle(TouchEvent::moved(300.0));
        p.unmount();
        assert_eq!(p.state(), PullState::Idle);
        assert_eq!(p.recognizer().positions(), (0.0, 0.0));
        p.mount();
        assert_eq!(p.handle(TouchEvent::end(300.0)), Dispatch::Ignored);

        p.handle(TouchEvent::start(0.0));
        p.handle(TouchEvent::moved(300.0));
        assert_eq!(p.pull_distance(), Some(300.0));
        p.register_container(Surface::new("budgets"));
        assert_eq!(p.pull_distance(), None);
        assert_eq!(p.handle(TouchEvent::end(300.0)), Dispatch::Ignored);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn detach_leaves_refresh_in_flight() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (action, release) = gated(&calls);
        let mut p = mobile(action);

        assert!(matches!(pull(&mut p, 0.0, 150.0), Dispatch::RefreshStarted { .. }));
        p.unmount();
        assert!(p.is_refreshing());
        release.send(true).expect("release");
        assert!(p.wait_settled(WAIT).is_some());
        assert_eq!(p.state(), PullState::Idle);
    }

    #[test]
    fn builds_from_profile() {
        let profile = Profile::parse(
            "[meta]\n[pull]\nthreshold_px = 40.0\n[viewport]\nwidth = 1024\nheight = 768\n",
        )
        .expect("profile");
        let mut p = PullToRefresh::from_profile(&profile);
        assert_eq!(p.recognizer().threshold(), 40.0);
        assert_eq!(p.form_factor(), FormFactor::Desktop);
        p.mount();
        assert!(!p.is_listening());
    }

    #[test]
    fn unmounted_controller_is_inert() {
        let calls = Arc::new(AtomicUsize::new(0));
        let p = PullToRefresh::new(
            PULL_THRESHOLD,
            FormFactorWatch::fixed(FormFactor::Mobile),
            counting(&calls),
        );
        assert!(!p.is_listening());
    }
}
