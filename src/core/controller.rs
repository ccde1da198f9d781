use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::core::selection;
use crate::domain::model::{Profile, SearchRequest, SearchState, SearchUpdate, Slot};
use crate::domain::ports::{ProfileStore, SchedulingApi};
use crate::utils::error::{HunterError, Result};
use crate::utils::validation::Validate;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Mutable state of the one session a controller runs at a time.
///
/// `generation` is the cancellation token: every `start()` and `cancel()`
/// bumps it, and a polling cycle may only mutate the session while the
/// generation it was spawned with is still current. `poll_task` is the
/// recurring-timer handle; at most one exists, and it is cleared before any
/// transition out of Searching/Booking.
struct Session {
    generation: u64,
    state: SearchState,
    poll_task: Option<JoinHandle<()>>,
}

/// Search-and-book engine: owns the session state machine, the polling task
/// lifecycle and cancellation, and orchestrates the scheduling API and the
/// selection policy.
pub struct SearchController<A: SchedulingApi + 'static, P: ProfileStore> {
    api: Arc<A>,
    profiles: P,
    poll_interval: Duration,
    session: Arc<Mutex<Session>>,
    updates: watch::Sender<SearchUpdate>,
}

impl<A: SchedulingApi + 'static, P: ProfileStore> SearchController<A, P> {
    pub fn new(api: A, profiles: P) -> Self {
        Self::with_poll_interval(api, profiles, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_poll_interval(api: A, profiles: P, poll_interval: Duration) -> Self {
        let (updates, _) = watch::channel(SearchUpdate::idle());
        Self {
            api: Arc::new(api),
            profiles,
            poll_interval,
            session: Arc::new(Mutex::new(Session {
                generation: 0,
                state: SearchState::Idle,
                poll_task: None,
            })),
            updates,
        }
    }

    /// Begin a search session. Validates the request and resolves the
    /// profile first; on validation failure no session is created. A prior
    /// non-terminal session on this controller is implicitly cancelled.
    ///
    /// The first fetch+select cycle runs immediately, then the session
    /// repeats at the configured interval until a qualifying slot is found
    /// or the session is cancelled.
    pub async fn start(&self, request: SearchRequest) -> Result<()> {
        request.validate()?;
        let profile = self
            .profiles
            .get(&request.profile_id)
            .await?
            .ok_or_else(|| {
                HunterError::validation(format!("profile '{}' not found", request.profile_id))
            })?;
        if profile.clinic_id != request.clinic_id {
            return Err(HunterError::validation(format!(
                "profile '{}' belongs to clinic {}, not clinic {}",
                profile.id, profile.clinic_id, request.clinic_id
            )));
        }

        let mut session = self.session.lock().await;
        // Starting replaces any prior non-terminal session: the old task is
        // detached here and exits at its next generation check.
        session.poll_task.take();
        session.generation = session.generation.wrapping_add(1);
        session.state = SearchState::Searching;
        self.updates.send_replace(SearchUpdate {
            state: SearchState::Searching,
            message: format!("Searching for a slot starting {} or later", request.threshold),
            selected_slot: None,
        });

        tracing::info!(
            clinic = %request.clinic_id,
            doctor = %request.doctor_id,
            profile = %profile.display_name(),
            threshold = %request.threshold,
            "search session started"
        );

        let task = tokio::spawn(run_session(
            Arc::clone(&self.api),
            Arc::clone(&self.session),
            self.updates.clone(),
            request,
            profile,
            session.generation,
            self.poll_interval,
        ));
        session.poll_task = Some(task);
        Ok(())
    }

    /// Cancel the current session. Clears the polling task handle, bumps the
    /// generation so any in-flight cycle discards its result, and moves to
    /// Cancelled. Idempotent: calling it on an already-terminal session does
    /// nothing.
    pub async fn cancel(&self) {
        let mut session = self.session.lock().await;
        if session.state.is_terminal() {
            return;
        }
        session.poll_task.take();
        session.generation = session.generation.wrapping_add(1);
        session.state = SearchState::Cancelled;
        self.updates.send_replace(SearchUpdate {
            state: SearchState::Cancelled,
            message: "Search cancelled".to_string(),
            selected_slot: None,
        });
        tracing::info!("search session cancelled");
    }

    /// Subscribe to state/status updates. The receiver always holds the
    /// latest `SearchUpdate`.
    pub fn subscribe(&self) -> watch::Receiver<SearchUpdate> {
        self.updates.subscribe()
    }

    pub async fn state(&self) -> SearchState {
        self.session.lock().await.state
    }

    /// Wait until the session reaches a terminal state and return the final
    /// update.
    pub async fn wait(&self) -> SearchUpdate {
        let mut rx = self.updates.subscribe();
        loop {
            {
                let current = rx.borrow_and_update();
                if current.state.is_terminal() {
                    return current.clone();
                }
            }
            if rx.changed().await.is_err() {
                return self.updates.borrow().clone();
            }
        }
    }
}

/// One session's polling loop. Runs fetch+select cycles at a fixed interval
/// on a single task, so cycles for the session can never overlap. Every
/// await is followed by a generation check before the session is touched:
/// a cancel or restart that happened while the call was in flight wins and
/// the stale result is discarded.
async fn run_session<A: SchedulingApi>(
    api: Arc<A>,
    session: Arc<Mutex<Session>>,
    updates: watch::Sender<SearchUpdate>,
    request: SearchRequest,
    profile: Profile,
    generation: u64,
    interval: Duration,
) {
    loop {
        {
            let session = session.lock().await;
            if session.generation != generation || session.state.is_terminal() {
                return;
            }
        }

        tracing::debug!(
            clinic = %request.clinic_id,
            doctor = %request.doctor_id,
            "querying available slots"
        );
        let fetched = api
            .fetch_available_slots(&request.clinic_id, &request.doctor_id)
            .await;

        let selected = {
            let mut session = session.lock().await;
            if session.generation != generation || session.state.is_terminal() {
                return;
            }
            match fetched {
                Err(failure) => {
                    tracing::warn!("slot query failed: {}", failure);
                    send_update(
                        &updates,
                        SearchState::Searching,
                        format!(
                            "Slot query failed ({}), retrying in {}s",
                            failure,
                            interval.as_secs()
                        ),
                        None,
                    );
                    None
                }
                Ok(slots) => match selection::choose(&slots, request.threshold) {
                    None => {
                        tracing::debug!("no qualifying slot among {} offered", slots.len());
                        send_update(
                            &updates,
                            SearchState::Searching,
                            format!(
                                "No slot at or after {} yet, next check in {}s",
                                request.threshold,
                                interval.as_secs()
                            ),
                            None,
                        );
                        None
                    }
                    Some(slot) => {
                        let slot = slot.clone();
                        // The recurring schedule ends here; the handle is
                        // dropped before the session leaves Searching.
                        session.poll_task.take();
                        session.state = SearchState::Booking;
                        tracing::info!(slot = %slot.id, start = %slot.start, "qualifying slot found, booking");
                        send_update(
                            &updates,
                            SearchState::Booking,
                            format!("Slot found for {}, booking", slot.start),
                            Some(slot.clone()),
                        );
                        Some(slot)
                    }
                },
            }
        };

        let Some(slot) = selected else {
            tokio::time::sleep(interval).await;
            continue;
        };

        // Single booking attempt, never retried.
        let booked = api.book_slot(&request.clinic_id, &profile, &slot).await;

        let mut session = session.lock().await;
        if session.generation != generation || session.state.is_terminal() {
            return;
        }
        match booked {
            Ok(confirmation) => {
                session.state = SearchState::Succeeded;
                tracing::info!(slot = %slot.id, "appointment booked");
                send_update(&updates, SearchState::Succeeded, confirmation, Some(slot));
            }
            Err(failure) => {
                session.state = SearchState::Failed;
                tracing::error!("booking failed: {}", failure);
                send_update(
                    &updates,
                    SearchState::Failed,
                    failure.outcome_message(),
                    Some(slot),
                );
            }
        }
        return;
    }
}

fn send_update(
    updates: &watch::Sender<SearchUpdate>,
    state: SearchState,
    message: String,
    selected_slot: Option<Slot>,
) {
    updates.send_replace(SearchUpdate {
        state,
        message,
        selected_slot,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{BookingFailure, FetchFailure};
    use async_trait::async_trait;
    use chrono::{NaiveDate, NaiveDateTime};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Semaphore;

    type FetchResult = std::result::Result<Vec<Slot>, FetchFailure>;
    type BookResult = std::result::Result<String, BookingFailure>;

    /// Scripted scheduling API: pops one fetch response per cycle and
    /// returns a transport failure once the script runs out, keeping the
    /// session in Searching. An optional gate parks each fetch until the
    /// test releases a permit.
    struct ScriptedApi {
        fetches: Mutex<VecDeque<FetchResult>>,
        book: BookResult,
        fetch_calls: AtomicUsize,
        book_calls: AtomicUsize,
        gate: Option<Arc<Semaphore>>,
    }

    impl ScriptedApi {
        fn new(fetches: Vec<FetchResult>, book: BookResult) -> Self {
            Self {
                fetches: Mutex::new(fetches.into()),
                book,
                fetch_calls: AtomicUsize::new(0),
                book_calls: AtomicUsize::new(0),
                gate: None,
            }
        }

        fn gated(fetches: Vec<FetchResult>, book: BookResult, gate: Arc<Semaphore>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::new(fetches, book)
            }
        }

        fn fetch_calls(&self) -> usize {
            self.fetch_calls.load(Ordering::SeqCst)
        }

        fn book_calls(&self) -> usize {
            self.book_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SchedulingApi for Arc<ScriptedApi> {
        async fn fetch_available_slots(
            &self,
            _clinic_id: &str,
            _doctor_id: &str,
        ) -> FetchResult {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.acquire().await.expect("gate closed").forget();
            }
            self.fetches.lock().await.pop_front().unwrap_or_else(|| {
                Err(FetchFailure::Transport("no scripted response".to_string()))
            })
        }

        async fn book_slot(
            &self,
            _clinic_id: &str,
            _profile: &Profile,
            _slot: &Slot,
        ) -> BookResult {
            self.book_calls.fetch_add(1, Ordering::SeqCst);
            self.book.clone()
        }
    }

    struct InMemoryProfiles(Mutex<Vec<Profile>>);

    impl InMemoryProfiles {
        fn with(profiles: Vec<Profile>) -> Self {
            Self(Mutex::new(profiles))
        }
    }

    #[async_trait]
    impl ProfileStore for InMemoryProfiles {
        async fn list(&self, clinic_id: &str) -> Result<Vec<Profile>> {
            Ok(self
                .0
                .lock()
                .await
                .iter()
                .filter(|p| p.clinic_id == clinic_id)
                .cloned()
                .collect())
        }

        async fn get(&self, profile_id: &str) -> Result<Option<Profile>> {
            Ok(self
                .0
                .lock()
                .await
                .iter()
                .find(|p| p.id == profile_id)
                .cloned())
        }

        async fn upsert(&self, profile: Profile) -> Result<()> {
            let mut profiles = self.0.lock().await;
            profiles.retain(|p| p.id != profile.id);
            profiles.push(profile);
            Ok(())
        }

        async fn remove(&self, profile_id: &str) -> Result<bool> {
            let mut profiles = self.0.lock().await;
            let before = profiles.len();
            profiles.retain(|p| p.id != profile_id);
            Ok(profiles.len() < before)
        }
    }

    fn at(hour: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 10)
            .unwrap()
            .and_hms_opt(hour, min, 0)
            .unwrap()
    }

    fn slot(id: &str, start: NaiveDateTime) -> Slot {
        Slot {
            id: id.to_string(),
            start,
            end: start + chrono::Duration::minutes(15),
            address: "Liteyny pr. 56".to_string(),
            room: "214".to_string(),
            number: 3,
        }
    }

    fn profile() -> Profile {
        Profile {
            id: "p-1".to_string(),
            clinic_id: "229".to_string(),
            last_name: "Ivanova".to_string(),
            first_name: "Anna".to_string(),
            middle_name: "Petrovna".to_string(),
            birth_date: NaiveDate::from_ymd_opt(1985, 3, 14).unwrap(),
            email: "anna@example.com".to_string(),
            phone: "+78120000000".to_string(),
        }
    }

    fn request() -> SearchRequest {
        SearchRequest {
            clinic_id: "229".to_string(),
            doctor_id: "36".to_string(),
            profile_id: "p-1".to_string(),
            threshold: at(9, 0),
        }
    }

    fn controller(
        api: &Arc<ScriptedApi>,
    ) -> SearchController<Arc<ScriptedApi>, InMemoryProfiles> {
        SearchController::with_poll_interval(
            Arc::clone(api),
            InMemoryProfiles::with(vec![profile()]),
            Duration::from_millis(5),
        )
    }

    async fn wait_terminal(
        controller: &SearchController<Arc<ScriptedApi>, InMemoryProfiles>,
    ) -> SearchUpdate {
        tokio::time::timeout(Duration::from_secs(5), controller.wait())
            .await
            .expect("session did not reach a terminal state in time")
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..500 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("condition not met within deadline");
    }

    #[tokio::test]
    async fn test_start_rejects_unknown_profile() {
        let api = Arc::new(ScriptedApi::new(vec![], Ok("Confirmed".to_string())));
        let controller = SearchController::new(
            Arc::clone(&api),
            InMemoryProfiles::with(vec![]),
        );

        let err = controller.start(request()).await.unwrap_err();
        assert!(matches!(err, HunterError::ValidationError { .. }));
        assert_eq!(controller.state().await, SearchState::Idle);
        assert_eq!(api.fetch_calls(), 0);
    }

    #[tokio::test]
    async fn test_start_rejects_profile_from_another_clinic() {
        let api = Arc::new(ScriptedApi::new(vec![], Ok("Confirmed".to_string())));
        let mut foreign = profile();
        foreign.clinic_id = "999".to_string();
        let controller = SearchController::new(
            Arc::clone(&api),
            InMemoryProfiles::with(vec![foreign]),
        );

        let err = controller.start(request()).await.unwrap_err();
        assert!(matches!(err, HunterError::ValidationError { .. }));
        assert_eq!(controller.state().await, SearchState::Idle);
    }

    #[tokio::test]
    async fn test_start_rejects_empty_request_fields() {
        let api = Arc::new(ScriptedApi::new(vec![], Ok("Confirmed".to_string())));
        let controller = controller(&api);

        let mut bad = request();
        bad.doctor_id = String::new();
        let err = controller.start(bad).await.unwrap_err();
        assert!(matches!(err, HunterError::ValidationError { .. }));
        assert_eq!(controller.state().await, SearchState::Idle);
    }

    #[tokio::test]
    async fn test_booking_success_selects_earliest_qualifying_slot() {
        // Threshold 09:00; offered starts 10:00, 08:00, 09:30.
        let batch = vec![
            slot("a", at(10, 0)),
            slot("b", at(8, 0)),
            slot("c", at(9, 30)),
        ];
        let api = Arc::new(ScriptedApi::new(
            vec![Ok(batch)],
            Ok("Confirmed".to_string()),
        ));
        let controller = controller(&api);

        controller.start(request()).await.unwrap();
        let outcome = wait_terminal(&controller).await;

        assert_eq!(outcome.state, SearchState::Succeeded);
        assert_eq!(outcome.message, "Confirmed");
        let selected = outcome.selected_slot.unwrap();
        assert_eq!(selected.id, "c");
        assert_eq!(selected.start, at(9, 30));
        assert_eq!(api.fetch_calls(), 1);
        assert_eq!(api.book_calls(), 1);
    }

    #[tokio::test]
    async fn test_booking_failure_ends_session_failed() {
        let api = Arc::new(ScriptedApi::new(
            vec![Ok(vec![slot("a", at(9, 30))])],
            Err(BookingFailure::Service("Slot taken".to_string())),
        ));
        let controller = controller(&api);

        controller.start(request()).await.unwrap();
        let outcome = wait_terminal(&controller).await;

        assert_eq!(outcome.state, SearchState::Failed);
        assert_eq!(outcome.message, "Slot taken");
        // Booking is never retried.
        assert_eq!(api.book_calls(), 1);
        assert_eq!(api.fetch_calls(), 1);
    }

    #[tokio::test]
    async fn test_retry_then_success_makes_exactly_one_booking_call() {
        // Cycle 1: service failure. Cycle 2: no qualifying slot.
        // Cycle 3: qualifying slot, booking succeeds.
        let api = Arc::new(ScriptedApi::new(
            vec![
                Err(FetchFailure::Service("temporary outage".to_string())),
                Ok(vec![slot("early", at(8, 0))]),
                Ok(vec![slot("hit", at(9, 30))]),
            ],
            Ok("Confirmed".to_string()),
        ));
        let controller = controller(&api);

        controller.start(request()).await.unwrap();
        let outcome = wait_terminal(&controller).await;

        assert_eq!(outcome.state, SearchState::Succeeded);
        assert_eq!(api.fetch_calls(), 3);
        assert_eq!(api.book_calls(), 1);
    }

    #[tokio::test]
    async fn test_polling_failures_never_fail_the_session() {
        // Script exhausted from the first cycle: every fetch is a transport
        // failure, and the session must keep searching regardless.
        let api = Arc::new(ScriptedApi::new(vec![], Ok("Confirmed".to_string())));
        let controller = controller(&api);

        controller.start(request()).await.unwrap();
        let calls = Arc::clone(&api);
        wait_until(move || calls.fetch_calls() >= 4).await;

        assert_eq!(controller.state().await, SearchState::Searching);
        assert_eq!(api.book_calls(), 0);
        controller.cancel().await;
        assert_eq!(controller.state().await, SearchState::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let api = Arc::new(ScriptedApi::new(vec![], Ok("Confirmed".to_string())));
        let controller = controller(&api);

        controller.start(request()).await.unwrap();
        controller.cancel().await;
        assert_eq!(controller.state().await, SearchState::Cancelled);

        // Second cancel on a terminal session: no panic, no new transition.
        controller.cancel().await;
        assert_eq!(controller.state().await, SearchState::Cancelled);
        let latest = controller.subscribe().borrow().clone();
        assert_eq!(latest.state, SearchState::Cancelled);
        assert_eq!(latest.message, "Search cancelled");
    }

    #[tokio::test]
    async fn test_cancel_from_idle() {
        let api = Arc::new(ScriptedApi::new(vec![], Ok("Confirmed".to_string())));
        let controller = controller(&api);

        controller.cancel().await;
        assert_eq!(controller.state().await, SearchState::Cancelled);
    }

    #[tokio::test]
    async fn test_no_transition_after_cancel_with_fetch_in_flight() {
        let gate = Arc::new(Semaphore::new(0));
        let api = Arc::new(ScriptedApi::gated(
            vec![Ok(vec![slot("hit", at(9, 30))])],
            Ok("Confirmed".to_string()),
            Arc::clone(&gate),
        ));
        let controller = controller(&api);

        controller.start(request()).await.unwrap();
        let calls = Arc::clone(&api);
        wait_until(move || calls.fetch_calls() == 1).await;

        // Cancel while the fetch is parked in flight, then let it resolve
        // with a qualifying slot. The result must be discarded.
        controller.cancel().await;
        gate.add_permits(1);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(controller.state().await, SearchState::Cancelled);
        assert_eq!(api.book_calls(), 0);
    }

    #[tokio::test]
    async fn test_restart_discards_prior_session_in_flight_result() {
        let gate = Arc::new(Semaphore::new(0));
        let api = Arc::new(ScriptedApi::gated(
            vec![
                Ok(vec![slot("hit-1", at(9, 30))]),
                Ok(vec![slot("hit-2", at(9, 45))]),
            ],
            Ok("Confirmed".to_string()),
            Arc::clone(&gate),
        ));
        let controller = controller(&api);

        controller.start(request()).await.unwrap();
        let calls = Arc::clone(&api);
        wait_until(move || calls.fetch_calls() == 1).await;

        // Second start implicitly cancels the first session while its fetch
        // is still in flight.
        controller.start(request()).await.unwrap();
        let calls = Arc::clone(&api);
        wait_until(move || calls.fetch_calls() == 2).await;

        gate.add_permits(2);
        let outcome = wait_terminal(&controller).await;

        assert_eq!(outcome.state, SearchState::Succeeded);
        // Only the second session's hit may be booked.
        assert_eq!(api.book_calls(), 1);
    }
}
