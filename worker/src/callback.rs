use std::{collections::HashMap, sync::Arc};

use comms::{Message, ModelId, ThreadId};
use parking_lot::{Condvar, Mutex};

use crate::error::CallbackErr;

/// Called once per reply of a request.
pub type RecvHandle = Arc<dyn Fn(&Message) + Send + Sync>;
/// Called once, after the last reply of a request was handled.
pub type FinishHandle = Arc<dyn Fn() + Send + Sync>;

/// The correlation state of one `(app thread, model)` pair.
#[derive(Default)]
struct Tracker {
    expected: u32,
    /// Replies claimed by `add_response`, their handlers may still be running.
    claimed: u32,
    /// Replies whose handlers already returned.
    handled: u32,
    on_recv: Option<RecvHandle>,
    on_finish: Option<FinishHandle>,
}

impl Tracker {
    fn in_flight(&self) -> bool {
        self.handled < self.expected
    }
}

/// Matches the replies of scatter-gather requests back to the application thread waiting on them.
///
/// One runner is shared by every thread of the process: application threads issue requests and wait on
/// them, the helper thread delivers replies.
#[derive(Default)]
pub struct CallbackRunner {
    trackers: Mutex<HashMap<(ThreadId, ModelId), Tracker>>,
    cond: Condvar,
}

impl CallbackRunner {
    /// Creates a new `CallbackRunner`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the handler every reply of the next request of `(app_thread, model_id)` goes through.
    pub fn register_recv_handle<F>(&self, app_thread: ThreadId, model_id: ModelId, handle: F)
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        let mut trackers = self.trackers.lock();
        trackers.entry((app_thread, model_id)).or_default().on_recv = Some(Arc::new(handle));
    }

    /// Installs the handler called once the next request of `(app_thread, model_id)` is complete.
    pub fn register_recv_finish_handle<F>(&self, app_thread: ThreadId, model_id: ModelId, handle: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut trackers = self.trackers.lock();
        trackers.entry((app_thread, model_id)).or_default().on_finish = Some(Arc::new(handle));
    }

    /// Starts tracking a request that completes after `expected` replies.
    ///
    /// # Arguments
    /// * `app_thread` - The thread issuing the request.
    /// * `model_id` - The table the request is for.
    /// * `expected` - The amount of replies to wait for.
    ///
    /// # Returns
    /// `RequestInFlight` if the previous request of this pair hasn't completed yet.
    pub fn new_request(
        &self,
        app_thread: ThreadId,
        model_id: ModelId,
        expected: u32,
    ) -> Result<(), CallbackErr> {
        let mut trackers = self.trackers.lock();
        let tracker = trackers.entry((app_thread, model_id)).or_default();

        if tracker.in_flight() {
            return Err(CallbackErr::RequestInFlight {
                app_thread,
                model_id,
            });
        }

        tracker.expected = expected;
        tracker.claimed = 0;
        tracker.handled = 0;
        Ok(())
    }

    /// Gives up on the current request of `(app_thread, model_id)`.
    ///
    /// Replies already handed over still finish, later ones are refused as unexpected. A new request can be
    /// issued once `wait_request` returns.
    pub fn cancel_request(&self, app_thread: ThreadId, model_id: ModelId) {
        let mut trackers = self.trackers.lock();
        if let Some(tracker) = trackers.get_mut(&(app_thread, model_id)) {
            tracker.expected = tracker.claimed;
        }
        drop(trackers);

        self.cond.notify_all();
    }

    /// Hands one reply to its request.
    ///
    /// Whether `msg` is the last expected reply is decided under the lock before any handler runs, so
    /// concurrent replies can't fire the finish handler twice. Handlers run without the lock held.
    ///
    /// # Arguments
    /// * `app_thread` - The thread that issued the request.
    /// * `model_id` - The table the request is for.
    /// * `msg` - The reply.
    ///
    /// # Returns
    /// An error if the pair has no request waiting for more replies.
    pub fn add_response(
        &self,
        app_thread: ThreadId,
        model_id: ModelId,
        msg: &Message,
    ) -> Result<(), CallbackErr> {
        let (is_last, on_recv, on_finish) = {
            let mut trackers = self.trackers.lock();
            let Some(tracker) = trackers.get_mut(&(app_thread, model_id)) else {
                return Err(CallbackErr::NoRequest {
                    app_thread,
                    model_id,
                });
            };

            if tracker.claimed >= tracker.expected {
                let err = match tracker.expected {
                    0 => CallbackErr::NoRequest {
                        app_thread,
                        model_id,
                    },
                    _ => CallbackErr::TooManyResponses {
                        app_thread,
                        model_id,
                    },
                };
                return Err(err);
            }

            tracker.claimed += 1;
            let is_last = tracker.claimed == tracker.expected;
            (is_last, tracker.on_recv.clone(), tracker.on_finish.clone())
        };

        if let Some(on_recv) = on_recv {
            on_recv(msg);
        }

        if is_last {
            if let Some(on_finish) = on_finish {
                on_finish();
            }
        }

        let mut trackers = self.trackers.lock();
        if let Some(tracker) = trackers.get_mut(&(app_thread, model_id)) {
            tracker.handled += 1;
        }
        drop(trackers);

        self.cond.notify_all();
        Ok(())
    }

    /// Blocks until every expected reply of the current request of `(app_thread, model_id)` was handled.
    ///
    /// Returns right away if the pair has nothing in flight.
    pub fn wait_request(&self, app_thread: ThreadId, model_id: ModelId) {
        let mut trackers = self.trackers.lock();

        self.cond.wait_while(&mut trackers, |trackers| {
            trackers
                .get(&(app_thread, model_id))
                .is_some_and(Tracker::in_flight)
        });
    }

    /// Returns whether `(app_thread, model_id)` still waits for replies.
    pub fn is_in_flight(&self, app_thread: ThreadId, model_id: ModelId) -> bool {
        self.trackers
            .lock()
            .get(&(app_thread, model_id))
            .is_some_and(Tracker::in_flight)
    }
}
