use crate::alerts::Scheduler;
use log::debug;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Length of the rolling admission window
pub const ADMISSION_WINDOW: Duration = Duration::from_secs(60 * 60);

/// Admission control for outgoing alerts
///
/// Bounds the number of alerts admitted per rolling hour and suppresses an
/// alert whose rendered body is identical to the previously admitted one.
/// Every admission occupies one slot of the budget for exactly one window;
/// the slot is released by a task handed to the [`Scheduler`].
///
/// The gate is cheap to share: all state sits behind a single mutex that is
/// held only for the duration of a check, never while rendering or sending.
pub struct AdmissionGate {
    /// Maximum number of alerts allowed per window
    max_per_hour: usize,
    /// How long a single admission occupies the budget
    window: Duration,
    state: Arc<Mutex<AdmissionState>>,
    scheduler: Arc<dyn Scheduler>,
}

#[derive(Debug, Default)]
struct AdmissionState {
    /// Admissions still inside their window
    admitted: usize,
    /// Body of the most recently admitted alert
    last_body: Option<String>,
}

impl fmt::Debug for AdmissionGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionGate")
            .field("max_per_hour", &self.max_per_hour)
            .field("window", &self.window)
            .field("state", &self.state)
            .finish()
    }
}

impl AdmissionGate {
    /// Create a gate with a one hour window
    ///
    /// # Arguments
    ///
    /// * `max_per_hour` - Admission ceiling; see [`AdmissionGate::request_admission`]
    /// * `scheduler` - Runs the delayed release of each admission
    pub fn new(max_per_hour: usize, scheduler: Arc<dyn Scheduler>) -> Self {
        Self::with_window(max_per_hour, ADMISSION_WINDOW, scheduler)
    }

    /// Create a gate with a custom window length
    pub fn with_window(
        max_per_hour: usize,
        window: Duration,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        Self {
            max_per_hour,
            window,
            state: Arc::new(Mutex::new(AdmissionState::default())),
            scheduler,
        }
    }

    /// Ask whether one more alert may proceed
    ///
    /// The alert is denied only once the current count is strictly greater
    /// than the maximum, so `max + 1` alerts are admitted within a window
    /// before the first denial.
    ///
    /// On admission the count is incremented and a release is scheduled one
    /// window later. The release takes the same lock as this check.
    ///
    /// # Returns
    ///
    /// `true` if the alert was admitted, `false` if the hourly budget is used up
    pub fn request_admission(&self) -> bool {
        {
            let mut state = self.lock_state();
            if state.admitted > self.max_per_hour {
                debug!(
                    "Alert denied: {} admitted in the current window (max {})",
                    state.admitted, self.max_per_hour
                );
                return false;
            }
            state.admitted += 1;
        }

        let state = Arc::clone(&self.state);
        self.scheduler.schedule(
            self.window,
            Box::new(move || {
                let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                debug_assert!(state.admitted > 0, "admission released more often than granted");
                state.admitted = state.admitted.saturating_sub(1);
            }),
        );
        true
    }

    /// Check a rendered alert body against the last admitted one
    ///
    /// A body differing from the last one becomes the new reference. A
    /// matching body leaves the state untouched.
    ///
    /// # Returns
    ///
    /// `true` if the body repeats the previous one and should not be sent
    pub fn should_suppress_duplicate(&self, body: &str) -> bool {
        let mut state = self.lock_state();
        if state.last_body.as_deref() == Some(body) {
            debug!("Alert suppressed: body identical to the previous alert");
            return true;
        }
        state.last_body = Some(body.to_string());
        false
    }

    /// Number of admissions currently occupying the window
    pub fn admitted_count(&self) -> usize {
        self.lock_state().admitted
    }

    pub fn max_per_hour(&self) -> usize {
        self.max_per_hour
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    // Every mutation leaves the state consistent, so a poisoned lock is still usable.
    fn lock_state(&self) -> MutexGuard<'_, AdmissionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
