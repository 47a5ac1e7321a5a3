use crate::config::RetryConfig;
use derivative::Derivative;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

/// Deferred action ran by the scheduler or the failure registry
pub type RetryAction = Rc<dyn Fn()>;

struct Timer {
    deadline: Duration,
    sequence: u64,
    action: RetryAction,
}

#[derive(Default)]
struct SchedulerInner {
    now: Duration,
    sequence: u64,
    timers: Vec<Timer>,
}

/// Host clock driven timer queue, backing every [`RetryTrigger`] it creates.
///
/// Nothing fires on its own: due actions run from [`RetryScheduler::update`], outside of any
/// borrow of the scheduler so they may schedule again.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct RetryScheduler {
    #[derivative(Debug = "ignore")]
    inner: Rc<RefCell<SchedulerInner>>,
    intervals: Rc<[Duration]>,
    registry: FailureRegistry,
}

impl RetryScheduler {
    pub fn new(config: &RetryConfig, registry: FailureRegistry) -> Self {
        Self {
            inner: Rc::new(RefCell::new(SchedulerInner::default())),
            intervals: Rc::from(config.intervals.as_slice()),
            registry,
        }
    }

    pub fn registry(&self) -> &FailureRegistry {
        &self.registry
    }

    /// Build a trigger which retries `retry` on the configured intervals, or `intervals` when
    /// given. Once they run out `give_up` runs, and if a `url` is known a manual reloader is
    /// registered under it.
    pub fn create_trigger(
        &self,
        url: Option<&str>,
        retry: RetryAction,
        give_up: Option<RetryAction>,
        intervals: Option<&[Duration]>,
    ) -> RetryTrigger {
        RetryTrigger {
            state: Rc::new(RefCell::new(RetryState {
                url: url.map(str::to_string),
                attempt: 0,
                registered: false,
                intervals: intervals.map(Rc::from).unwrap_or_else(|| self.intervals.clone()),
            })),
            retry,
            give_up,
            scheduler: self.clone(),
        }
    }

    /// Run `action` once `delay` has elapsed on the host clock
    pub fn schedule(&self, delay: Duration, action: RetryAction) {
        let mut inner = self.inner.borrow_mut();
        inner.sequence += 1;
        let timer = Timer {
            deadline: inner.now + delay,
            sequence: inner.sequence,
            action,
        };
        inner.timers.push(timer);
    }

    /// Number of timers not yet fired
    pub fn pending(&self) -> usize {
        self.inner.borrow().timers.len()
    }

    pub fn now(&self) -> Duration {
        self.inner.borrow().now
    }

    /// Advance the clock by `delta` and run every action which came due, in deadline order.
    /// Returns how many ran.
    pub fn update(&self, delta: Duration) -> usize {
        let mut due = {
            let mut inner = self.inner.borrow_mut();
            inner.now += delta;
            let now = inner.now;
            let (due, waiting): (Vec<Timer>, Vec<Timer>) =
                inner.timers.drain(..).partition(|timer| timer.deadline <= now);
            inner.timers = waiting;
            due
        };
        due.sort_by_key(|timer| (timer.deadline, timer.sequence));
        for timer in due.iter() {
            (timer.action)();
        }
        due.len()
    }
}

struct RetryState {
    url: Option<String>,
    attempt: usize,
    /// A manual reloader sits in the failure registry
    registered: bool,
    intervals: Rc<[Duration]>,
}

/// Per resource retry policy.
///
/// Each [`RetryTrigger::invoke`] either schedules the retry after the next backoff interval or,
/// once they are spent, gives up.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct RetryTrigger {
    #[derivative(Debug = "ignore")]
    state: Rc<RefCell<RetryState>>,
    #[derivative(Debug = "ignore")]
    retry: RetryAction,
    #[derivative(Debug = "ignore")]
    give_up: Option<RetryAction>,
    scheduler: RetryScheduler,
}

impl RetryTrigger {
    pub fn invoke(&self) {
        let (delay, url) = {
            let mut state = self.state.borrow_mut();
            match state.intervals.get(state.attempt).copied() {
                Some(delay) => {
                    state.attempt += 1;
                    (Some(delay), None)
                }
                // at most one reloader per resource until it runs
                None if state.registered => (None, None),
                None => {
                    state.registered = state.url.is_some();
                    (None, state.url.clone())
                }
            }
        };

        if let Some(delay) = delay {
            self.scheduler.schedule(delay, self.retry.clone());
            return;
        }

        if let Some(give_up) = self.give_up.as_ref() {
            give_up();
        }
        if let Some(url) = url {
            let state = self.state.clone();
            let retry = self.retry.clone();
            self.scheduler.registry.register(
                url,
                Rc::new(move || {
                    {
                        let mut state = state.borrow_mut();
                        state.attempt = 0;
                        state.registered = false;
                    }
                    retry();
                }),
            );
        }
    }

    /// Number of retries scheduled so far
    pub fn attempts(&self) -> usize {
        self.state.borrow().attempt
    }

    /// Whether the retries ran out and a reloader waits in the failure registry
    pub fn is_registered(&self) -> bool {
        self.state.borrow().registered
    }

    /// Start over with the full set of retries
    pub fn reset(&self) {
        self.state.borrow_mut().attempt = 0;
    }
}

#[derive(Default)]
struct RegistryInner {
    reloaders: Vec<(String, RetryAction)>,
    loading_error: Option<String>,
}

/// Resources which gave up on automatic retries and now wait for an explicit [`FailureRegistry::retry_all`].
///
/// The first registration after an empty registry raises the loading error overlay.
#[derive(Derivative, Clone, Default)]
#[derivative(Debug)]
pub struct FailureRegistry {
    #[derivative(Debug = "ignore")]
    inner: Rc<RefCell<RegistryInner>>,
}

impl FailureRegistry {
    pub fn register(&self, url: impl Into<String>, reloader: RetryAction) {
        let url = url.into();
        let mut inner = self.inner.borrow_mut();
        if inner.reloaders.is_empty() {
            tracing::error!("Failed to load: {}", url);
            inner.loading_error = Some(url.clone());
        }
        inner.reloaders.push((url, reloader));
    }

    /// Whether anything is waiting for a manual retry
    pub fn exists(&self) -> bool {
        !self.inner.borrow().reloaders.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().reloaders.len()
    }

    pub fn is_empty(&self) -> bool {
        !self.exists()
    }

    pub fn urls(&self) -> Vec<String> {
        self.inner
            .borrow()
            .reloaders
            .iter()
            .map(|(url, _)| url.clone())
            .collect()
    }

    /// Url shown by the loading error overlay, if it is up
    pub fn loading_error(&self) -> Option<String> {
        self.inner.borrow().loading_error.clone()
    }

    /// Dismiss the overlay and run every reloader once, returns how many ran
    pub fn retry_all(&self) -> usize {
        let reloaders = {
            let mut inner = self.inner.borrow_mut();
            inner.loading_error = None;
            std::mem::take(&mut inner.reloaders)
        };
        if !reloaders.is_empty() {
            tracing::info!("Retrying {} failed resources", reloaders.len());
        }
        for (_, reloader) in reloaders.iter() {
            reloader();
        }
        reloaders.len()
    }
}
