use crate::context::LoaderContext;
use crate::error::{LoadError, TransportError};
use crate::queue::Request;
use crate::retry::RetryTrigger;
use crate::transport::Ticket;
use bytes::Bytes;
use lode_cache::Budgeted;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};
use std::sync::Arc;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum LoadState {
    /// Nothing to load, the unit is blank and ready
    None,
    /// Waiting to be admitted by a request queue
    Pending,
    /// Transport in flight for a plain resource
    Requesting,
    /// Transport in flight for an encrypted resource
    Decrypting,
    RequestCompleted,
    DecryptCompleted,
    /// Decoded and ready for use
    Loaded,
    Error,
    /// Fetched but nobody asked for the decoded content, which was released
    Purged,
}

impl LoadState {
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            LoadState::Pending | LoadState::Requesting | LoadState::Decrypting
        )
    }
}

/// Decoded RGBA pixels of a resource
#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    image: Arc<image::RgbaImage>,
}

impl Texture {
    pub fn decode(bytes: &[u8]) -> Result<Self, LoadError> {
        let image = image::load_from_memory(bytes)
            .map_err(|err| LoadError::Decode(err.to_string()))?
            .to_rgba8();
        Ok(Self {
            image: Arc::new(image),
        })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Pixel count, what the image cache budgets against
    pub fn cost(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    pub fn image(&self) -> &image::RgbaImage {
        &self.image
    }
}

/// One shot callback ran once a unit becomes ready
pub type LoadListener = Box<dyn FnOnce(&LoadUnit)>;

pub(crate) struct UnitState {
    url: String,
    state: LoadState,
    /// Someone is waiting for the decoded content
    decode_requested: bool,
    listeners: VecDeque<LoadListener>,
    retry: Option<RetryTrigger>,
    ticket: Option<Ticket>,
    /// Transformed bytes between completion and decode
    fetched: Option<Bytes>,
    texture: Option<Texture>,
    error: Option<LoadError>,
}

/// Handle to a single resource and its load state machine.
///
/// Cloning is cheap and every clone observes the same state. The resource lives until the last
/// handle is dropped, any completion arriving after that is discarded.
#[derive(Clone)]
pub struct LoadUnit {
    state: Rc<RefCell<UnitState>>,
    ctx: Rc<LoaderContext>,
}

impl std::fmt::Debug for LoadUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("LoadUnit")
            .field("url", &state.url)
            .field("state", &state.state)
            .field("decode_requested", &state.decode_requested)
            .finish()
    }
}

impl PartialEq for LoadUnit {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }
}

impl LoadUnit {
    fn new(url: &str, state: LoadState, decode_requested: bool, ctx: &Rc<LoaderContext>) -> Self {
        Self {
            state: Rc::new(RefCell::new(UnitState {
                url: url.to_string(),
                state,
                decode_requested,
                listeners: VecDeque::new(),
                retry: None,
                ticket: None,
                fetched: None,
                texture: None,
                error: None,
            })),
            ctx: ctx.clone(),
        }
    }

    pub(crate) fn from_parts(state: Rc<RefCell<UnitState>>, ctx: Rc<LoaderContext>) -> Self {
        Self { state, ctx }
    }

    /// Unit which starts fetching immediately and decodes once it arrives
    pub(crate) fn load(url: &str, ctx: &Rc<LoaderContext>) -> Self {
        let unit = Self::new(url, LoadState::Pending, true, ctx);
        unit.request_image();
        unit
    }

    /// Unit which waits for [`Request::start_request`] before fetching
    pub(crate) fn request(url: &str, ctx: &Rc<LoaderContext>) -> Self {
        Self::new(url, LoadState::Pending, false, ctx)
    }

    /// Unit with nothing to load
    pub(crate) fn blank(ctx: &Rc<LoaderContext>) -> Self {
        Self::new("", LoadState::None, false, ctx)
    }

    pub fn url(&self) -> String {
        self.state.borrow().url.clone()
    }

    pub fn state(&self) -> LoadState {
        self.state.borrow().state
    }

    pub fn is_decode_requested(&self) -> bool {
        self.state.borrow().decode_requested
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state(), LoadState::Loaded | LoadState::None)
    }

    pub fn is_error(&self) -> bool {
        self.state() == LoadState::Error
    }

    /// Fetched for warming only, nobody waits on the decoded content
    pub fn is_request_only(&self) -> bool {
        !(self.is_decode_requested() || self.is_ready())
    }

    pub fn texture(&self) -> Option<Texture> {
        self.state.borrow().texture.clone()
    }

    pub fn error(&self) -> Option<LoadError> {
        self.state.borrow().error.clone()
    }

    /// Retry trigger guarding the transport, created once someone waits on the content
    pub fn retry_trigger(&self) -> Option<RetryTrigger> {
        self.state.borrow().retry.clone()
    }

    /// Run `listener` once the unit is ready, immediately if it already is.
    /// Listeners fire in the order they were added.
    pub fn add_load_listener(&self, listener: impl FnOnce(&LoadUnit) + 'static) {
        if self.is_ready() {
            listener(self);
        } else {
            self.state
                .borrow_mut()
                .listeners
                .push_back(Box::new(listener));
        }
    }

    /// Ask for the decoded content. Completes the load if the bytes are already here, otherwise
    /// makes sure a transport is running and guarded by a retry trigger.
    pub fn decode(&self) {
        match self.state() {
            LoadState::DecryptCompleted | LoadState::RequestCompleted => self.finish_decode(),
            LoadState::Decrypting | LoadState::Requesting => {
                let needs_trigger = {
                    let mut state = self.state.borrow_mut();
                    state.decode_requested = true;
                    state.retry.is_none()
                };
                if needs_trigger {
                    let trigger = self.create_trigger();
                    self.state.borrow_mut().retry = Some(trigger);
                }
            }
            LoadState::Error | LoadState::Pending | LoadState::Purged => {
                let awaiting_reload = {
                    let mut state = self.state.borrow_mut();
                    state.decode_requested = true;
                    state.retry.as_ref().is_some_and(RetryTrigger::is_registered)
                };
                // gave up, only a manual retry fetches it again
                if !awaiting_reload {
                    self.request_image();
                }
            }
            LoadState::None | LoadState::Loaded => {}
        }
    }

    fn create_trigger(&self) -> RetryTrigger {
        let url = self.url();
        let retry_state = Rc::downgrade(&self.state);
        let retry_ctx = Rc::downgrade(&self.ctx);
        let give_up_state = retry_state.clone();
        let give_up_ctx = retry_ctx.clone();
        self.ctx.scheduler.create_trigger(
            Some(&url),
            Rc::new(move || {
                if let Some(unit) = Self::upgrade(&retry_state, &retry_ctx) {
                    if !unit.is_ready() {
                        tracing::debug!("Retrying {}", unit.url());
                        unit.request_image();
                    }
                }
            }),
            Some(Rc::new(move || {
                if let Some(unit) = Self::upgrade(&give_up_state, &give_up_ctx) {
                    let url = unit.url();
                    unit.on_error(LoadError::ExhaustedRetries { url });
                }
            })),
            None,
        )
    }

    fn upgrade(state: &Weak<RefCell<UnitState>>, ctx: &Weak<LoaderContext>) -> Option<Self> {
        Some(Self {
            state: state.upgrade()?,
            ctx: ctx.upgrade()?,
        })
    }

    /// Issue a fresh transport for the resource, superseding any earlier one
    fn request_image(&self) {
        let needs_trigger = {
            let state = self.state.borrow();
            state.decode_requested && state.retry.is_none()
        };
        if needs_trigger {
            let trigger = self.create_trigger();
            self.state.borrow_mut().retry = Some(trigger);
        }

        let (url, previous) = {
            let mut state = self.state.borrow_mut();
            state.state = if self.ctx.transform.should_transform(&state.url) {
                LoadState::Decrypting
            } else {
                LoadState::Requesting
            };
            state.error = None;
            state.fetched = None;
            (state.url.clone(), state.ticket.take())
        };
        if let Some(previous) = previous {
            self.ctx.forget(previous);
        }
        let ticket = self.ctx.fetch(&url, &self.state);
        self.state.borrow_mut().ticket = Some(ticket);
    }

    pub(crate) fn on_transport_complete(
        &self,
        ticket: Ticket,
        result: Result<Bytes, TransportError>,
    ) {
        {
            let state = self.state.borrow();
            if state.ticket != Some(ticket) {
                tracing::trace!("Ignoring superseded completion for {}", state.url);
                return;
            }
        }
        self.state.borrow_mut().ticket = None;
        match result {
            Ok(bytes) => self.on_load(bytes),
            Err(err) => self.on_transport_failed(err),
        }
    }

    fn on_load(&self, bytes: Bytes) {
        let decrypting = self.state() == LoadState::Decrypting;
        let bytes = if decrypting {
            match self.ctx.transform.decrypt(&bytes) {
                Ok(bytes) => bytes,
                Err(err) => {
                    tracing::error!("Corrupt resource {}: {}", self.url(), err);
                    self.on_error(err.into());
                    return;
                }
            }
        } else {
            bytes
        };

        let decode = {
            let mut state = self.state.borrow_mut();
            state.state = if decrypting {
                LoadState::DecryptCompleted
            } else {
                LoadState::RequestCompleted
            };
            tracing::trace!("{} reached {:?}", state.url, state.state);
            if state.decode_requested {
                state.fetched = Some(bytes);
                true
            } else {
                state.state = LoadState::Purged;
                false
            }
        };
        if decode {
            self.decode();
        }
    }

    fn on_transport_failed(&self, err: TransportError) {
        match self.retry_trigger() {
            Some(trigger) => {
                tracing::debug!(
                    "Transport for {} failed ({}), retry {}",
                    self.url(),
                    err,
                    trigger.attempts() + 1
                );
                trigger.invoke();
            }
            None => self.on_error(err.into()),
        }
    }

    fn on_error(&self, err: LoadError) {
        let mut state = self.state.borrow_mut();
        tracing::warn!("Failed to load {}: {}", state.url, err);
        state.state = LoadState::Error;
        state.error = Some(err);
        state.fetched = None;
        if let Some(ticket) = state.ticket.take() {
            self.ctx.forget(ticket);
        }
    }

    fn finish_decode(&self) {
        let fetched = self.state.borrow_mut().fetched.take();
        let texture = match fetched {
            Some(bytes) => Texture::decode(&bytes),
            None => Err(LoadError::Decode(format!("{} has no content", self.url()))),
        };
        let texture = match texture {
            Ok(texture) => texture,
            Err(err) => {
                self.on_error(err);
                return;
            }
        };

        let (listeners, trigger) = {
            let mut state = self.state.borrow_mut();
            state.state = LoadState::Loaded;
            state.texture = Some(texture);
            tracing::trace!("{} loaded", state.url);
            (std::mem::take(&mut state.listeners), state.retry.clone())
        };
        if let Some(trigger) = trigger {
            trigger.reset();
        }
        for listener in listeners {
            listener(self);
        }
    }
}

impl Budgeted for LoadUnit {
    fn cost(&self) -> u64 {
        self.state
            .borrow()
            .texture
            .as_ref()
            .map(Texture::cost)
            .unwrap_or(0)
    }

    fn is_ready(&self) -> bool {
        LoadUnit::is_ready(self)
    }

    fn is_request_only(&self) -> bool {
        LoadUnit::is_request_only(self)
    }

    fn is_error(&self) -> bool {
        LoadUnit::is_error(self)
    }
}

impl Request for LoadUnit {
    fn is_request_ready(&self) -> bool {
        !self.state().is_in_flight()
    }

    /// Only acts on a pending unit, which is fetched without asking for decode
    fn start_request(&self) {
        if self.state() == LoadState::Pending {
            self.state.borrow_mut().decode_requested = false;
            self.request_image();
        }
    }
}
