//! Device location: permission tracking and one-shot position fixes.
//!
//! The platform (OS location service, or a fixed configured position) sits
//! behind [`LocationPlatform`]. [`LocationResolver`] runs the permission
//! state machine on top of it and reports what happens as [`LocationEvent`]s
//! on channels handed out by [`LocationResolver::subscribe`].

use crate::types::{AuthorizationState, Coordinate, LocationError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

const FIX_TIMEOUT_SECS: u64 = 30;

/// The OS-level location service.
#[async_trait]
pub trait LocationPlatform: Send + Sync + 'static {
    /// Permission as the platform reports it right now
    fn authorization_status(&self) -> AuthorizationState;

    /// Ask the user for permission. The answer is delivered later through
    /// [`LocationResolver::notify_authorization_changed`].
    fn request_authorization(&self);

    /// Obtain a single position fix
    async fn one_shot_fix(&self) -> Result<Coordinate, LocationError>;
}

/// Events emitted by the resolver
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocationEvent {
    AuthorizationChanged(AuthorizationState),
    CoordinateArrived(Coordinate),
}

/// Platform backed by a fixed, configured position.
///
/// With no position there is no positioning service, which reads as denied.
/// A position outside the valid ranges never produces a fix.
#[derive(Debug, Clone, Default)]
pub struct ConfiguredLocation {
    position: Option<Coordinate>,
}

impl ConfiguredLocation {
    pub fn new(position: Option<Coordinate>) -> Self {
        Self { position }
    }
}

#[async_trait]
impl LocationPlatform for ConfiguredLocation {
    fn authorization_status(&self) -> AuthorizationState {
        match self.position {
            Some(_) => AuthorizationState::AuthorizedWhenInUse,
            None => AuthorizationState::Denied,
        }
    }

    fn request_authorization(&self) {
        tracing::debug!("Configured location needs no authorization prompt");
    }

    async fn one_shot_fix(&self) -> Result<Coordinate, LocationError> {
        match self.position {
            Some(coordinate) if coordinate.is_valid() => Ok(coordinate),
            Some(_) => Err(LocationError::NoFix),
            None => Err(LocationError::PermissionUnavailable),
        }
    }
}

#[derive(Default)]
struct ResolverState {
    authorization: AuthorizationState,
    last_fix: Option<Coordinate>,
    updating: bool,
    listeners: Vec<mpsc::UnboundedSender<LocationEvent>>,
}

struct Inner {
    platform: Arc<dyn LocationPlatform>,
    runtime: Handle,
    state: Mutex<ResolverState>,
}

/// Wraps the platform's permission state machine. Cheap to clone.
#[derive(Clone)]
pub struct LocationResolver {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for LocationResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("LocationResolver")
            .field("authorization", &state.authorization)
            .field("last_fix", &state.last_fix)
            .field("updating", &state.updating)
            .finish()
    }
}

impl LocationResolver {
    /// `runtime` is where fix requests run, so platform callbacks may come
    /// from threads outside tokio.
    pub fn new(platform: Arc<dyn LocationPlatform>, runtime: Handle) -> Self {
        let authorization = platform.authorization_status();
        Self {
            inner: Arc::new(Inner {
                platform,
                runtime,
                state: Mutex::new(ResolverState {
                    authorization,
                    ..ResolverState::default()
                }),
            }),
        }
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<LocationEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.state.lock().listeners.push(tx);
        rx
    }

    pub fn authorization(&self) -> AuthorizationState {
        self.inner.state.lock().authorization
    }

    /// Last known fix. None unless location use is currently permitted.
    pub fn current_coordinate(&self) -> Option<Coordinate> {
        let state = self.inner.state.lock();
        if state.authorization.is_authorized() {
            state.last_fix
        } else {
            None
        }
    }

    /// Re-read the platform's permission and restart the request flow.
    /// Safe to call repeatedly.
    pub fn check_access(&self) {
        let status = self.inner.platform.authorization_status();
        self.apply_authorization(status);
    }

    /// Platform callback for permission changes. Callable from any thread.
    pub fn notify_authorization_changed(&self, status: AuthorizationState) {
        tracing::info!("Location authorization changed to {:?}", status);
        self.apply_authorization(status);
    }

    /// Start a one-shot fix if permitted and none is outstanding
    pub fn request_fix(&self) {
        {
            let mut state = self.inner.state.lock();
            if !state.authorization.is_authorized() {
                tracing::debug!("Fix not requested: authorization is {:?}", state.authorization);
                return;
            }
            if state.updating {
                tracing::debug!("Fix already in progress");
                return;
            }
            state.updating = true;
        }

        let resolver = self.clone();
        self.inner.runtime.spawn(async move {
            let result = tokio::time::timeout(
                Duration::from_secs(FIX_TIMEOUT_SECS),
                resolver.inner.platform.one_shot_fix(),
            )
            .await
            .unwrap_or(Err(LocationError::Timeout));
            resolver.finish_fix(result);
        });
    }

    fn apply_authorization(&self, status: AuthorizationState) {
        {
            let mut state = self.inner.state.lock();
            if state.authorization != status {
                state.authorization = status;
                // Sent under the lock so listeners see changes in write order
                state.emit(LocationEvent::AuthorizationChanged(status));
            }
            if status.is_unusable() {
                state.last_fix = None;
            }
        }

        match status {
            AuthorizationState::NotDetermined => self.inner.platform.request_authorization(),
            s if s.is_authorized() => self.request_fix(),
            s => tracing::info!("Location unavailable ({:?}); no updates attempted", s),
        }
    }

    fn finish_fix(&self, result: Result<Coordinate, LocationError>) {
        let mut state = self.inner.state.lock();
        state.updating = false;
        match result {
            Ok(coordinate) if state.authorization.is_authorized() => {
                tracing::info!("Location fix: {}", coordinate);
                state.last_fix = Some(coordinate);
                state.emit(LocationEvent::CoordinateArrived(coordinate));
            }
            Ok(_) => tracing::debug!("Discarding fix: authorization revoked while updating"),
            Err(LocationError::PermissionUnavailable) => {
                tracing::info!("Platform refused the fix; forgetting the last one");
                state.last_fix = None;
            }
            Err(e) => tracing::warn!("Location fix failed: {}", e),
        }
    }
}

impl ResolverState {
    /// Deliver to every live listener, dropping closed ones
    fn emit(&mut self, event: LocationEvent) {
        self.listeners.retain(|tx| tx.send(event).is_ok());
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    struct FakePlatform {
        status: Mutex<AuthorizationState>,
        fix: Coordinate,
        gate: Option<Arc<Notify>>,
        fix_calls: AtomicUsize,
        prompts: AtomicUsize,
    }

    impl FakePlatform {
        fn new(status: AuthorizationState) -> Self {
            Self {
                status: Mutex::new(status),
                fix: Coordinate::new(51.5074, -0.1278),
                gate: None,
                fix_calls: AtomicUsize::new(0),
                prompts: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LocationPlatform for FakePlatform {
        fn authorization_status(&self) -> AuthorizationState {
            *self.status.lock()
        }

        fn request_authorization(&self) {
            self.prompts.fetch_add(1, Ordering::SeqCst);
        }

        async fn one_shot_fix(&self) -> Result<Coordinate, LocationError> {
            self.fix_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            Ok(self.fix)
        }
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<LocationEvent>) -> LocationEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_authorized_check_access_delivers_fix() {
        let platform = Arc::new(FakePlatform::new(AuthorizationState::AuthorizedWhenInUse));
        let resolver = LocationResolver::new(platform.clone(), Handle::current());
        let mut rx = resolver.subscribe();

        assert_eq!(resolver.current_coordinate(), None);
        resolver.check_access();

        assert_eq!(
            next_event(&mut rx).await,
            LocationEvent::CoordinateArrived(Coordinate::new(51.5074, -0.1278))
        );
        assert_eq!(resolver.current_coordinate(), Some(Coordinate::new(51.5074, -0.1278)));
        assert_eq!(platform.fix_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_denied_attempts_nothing() {
        let platform = Arc::new(FakePlatform::new(AuthorizationState::Denied));
        let resolver = LocationResolver::new(platform.clone(), Handle::current());
        let mut rx = resolver.subscribe();

        resolver.check_access();
        resolver.request_fix();
        tokio::task::yield_now().await;

        assert!(rx.try_recv().is_err());
        assert_eq!(platform.fix_calls.load(Ordering::SeqCst), 0);
        assert_eq!(platform.prompts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_not_determined_prompts() {
        let platform = Arc::new(FakePlatform::new(AuthorizationState::NotDetermined));
        let resolver = LocationResolver::new(platform.clone(), Handle::current());

        resolver.check_access();
        resolver.check_access();
        assert_eq!(platform.prompts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_grant_emits_change_then_fix() {
        let platform = Arc::new(FakePlatform::new(AuthorizationState::Denied));
        let resolver = LocationResolver::new(platform.clone(), Handle::current());
        let mut rx = resolver.subscribe();

        resolver.notify_authorization_changed(AuthorizationState::AuthorizedWhenInUse);

        assert_eq!(
            next_event(&mut rx).await,
            LocationEvent::AuthorizationChanged(AuthorizationState::AuthorizedWhenInUse)
        );
        assert!(matches!(
            next_event(&mut rx).await,
            LocationEvent::CoordinateArrived(_)
        ));
        assert_eq!(platform.fix_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_repeated_status_is_not_re_emitted() {
        let platform = Arc::new(FakePlatform::new(AuthorizationState::Denied));
        let resolver = LocationResolver::new(platform, Handle::current());
        let mut rx = resolver.subscribe();

        resolver.notify_authorization_changed(AuthorizationState::Denied);
        resolver.notify_authorization_changed(AuthorizationState::Restricted);

        assert_eq!(
            rx.try_recv().unwrap(),
            LocationEvent::AuthorizationChanged(AuthorizationState::Restricted)
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_single_fix_outstanding() {
        let gate = Arc::new(Notify::new());
        let mut fake = FakePlatform::new(AuthorizationState::AuthorizedAlways);
        fake.gate = Some(gate.clone());
        let platform = Arc::new(fake);
        let resolver = LocationResolver::new(platform.clone(), Handle::current());
        let mut rx = resolver.subscribe();

        resolver.request_fix();
        resolver.request_fix();
        resolver.check_access();

        // Let the spawned fix reach the gate before releasing it
        tokio::time::sleep(Duration::from_millis(20)).await;
        gate.notify_one();

        assert!(matches!(
            next_event(&mut rx).await,
            LocationEvent::CoordinateArrived(_)
        ));
        assert_eq!(platform.fix_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_notify_from_foreign_thread() {
        let platform = Arc::new(FakePlatform::new(AuthorizationState::NotDetermined));
        let resolver = LocationResolver::new(platform, Handle::current());
        let mut rx = resolver.subscribe();

        let callback = resolver.clone();
        std::thread::spawn(move || {
            callback.notify_authorization_changed(AuthorizationState::AuthorizedWhenInUse);
        })
        .join()
        .unwrap();

        assert_eq!(
            next_event(&mut rx).await,
            LocationEvent::AuthorizationChanged(AuthorizationState::AuthorizedWhenInUse)
        );
        assert!(matches!(
            next_event(&mut rx).await,
            LocationEvent::CoordinateArrived(_)
        ));
    }

    #[tokio::test]
    async fn test_revoked_permission_forgets_fix() {
        let platform = Arc::new(FakePlatform::new(AuthorizationState::AuthorizedWhenInUse));
        let resolver = LocationResolver::new(platform, Handle::current());
        let mut rx = resolver.subscribe();

        resolver.check_access();
        assert!(matches!(
            next_event(&mut rx).await,
            LocationEvent::CoordinateArrived(_)
        ));
        assert!(resolver.current_coordinate().is_some());

        resolver.notify_authorization_changed(AuthorizationState::Denied);
        assert_eq!(resolver.current_coordinate(), None);

        // The old fix stays forgotten until a fresh one arrives
        resolver.notify_authorization_changed(AuthorizationState::AuthorizedWhenInUse);
        assert_eq!(resolver.current_coordinate(), None);
        loop {
            if let LocationEvent::CoordinateArrived(c) = next_event(&mut rx).await {
                assert_eq!(resolver.current_coordinate(), Some(c));
                break;
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_notifications_arrive_in_write_order() {
        let platform = Arc::new(FakePlatform::new(AuthorizationState::NotDetermined));
        let resolver = LocationResolver::new(platform, Handle::current());
        let mut rx = resolver.subscribe();

        let threads: Vec<_> = (0..4)
            .map(|n| {
                let callback = resolver.clone();
                std::thread::spawn(move || {
                    for i in 0..200 {
                        let status = if (i + n) % 2 == 0 {
                            AuthorizationState::Denied
                        } else {
                            AuthorizationState::AuthorizedAlways
                        };
                        callback.notify_authorization_changed(status);
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        let mut last = None;
        while let Ok(event) = rx.try_recv() {
            if let LocationEvent::AuthorizationChanged(status) = event {
                last = Some(status);
            }
        }
        assert_eq!(last, Some(resolver.authorization()));
    }

    #[tokio::test]
    async fn test_configured_location() {
        let fixed = ConfiguredLocation::new(Some(Coordinate::new(6.9271, 79.8612)));
        assert_eq!(fixed.authorization_status(), AuthorizationState::AuthorizedWhenInUse);
        assert_eq!(fixed.one_shot_fix().await.unwrap(), Coordinate::new(6.9271, 79.8612));

        let none = ConfiguredLocation::default();
        assert_eq!(none.authorization_status(), AuthorizationState::Denied);
        assert!(matches!(
            none.one_shot_fix().await,
            Err(LocationError::PermissionUnavailable)
        ));

        let bogus = ConfiguredLocation::new(Some(Coordinate::new(123.0, 0.0)));
        assert!(matches!(bogus.one_shot_fix().await, Err(LocationError::NoFix)));
    }
}
