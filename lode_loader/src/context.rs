use crate::retry::RetryScheduler;
use crate::transform::{encrypted_url, ByteTransform};
use crate::transport::{Completion, CompletionSender, FetchRequest, Ticket, Transport};
use crate::unit::{LoadUnit, UnitState};
use derivative::Derivative;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

/// State every [`LoadUnit`] of one manager shares
#[derive(Derivative)]
#[derivative(Debug)]
pub(crate) struct LoaderContext {
    #[derivative(Debug = "ignore")]
    transport: Box<dyn Transport>,
    pub(crate) transform: ByteTransform,
    pub(crate) scheduler: RetryScheduler,
    completion_send: CompletionSender,
    completion_recv: crossbeam_channel::Receiver<Completion>,
    /// Units waiting on a ticket. Weak so dropping the last handle to a unit abandons its fetch.
    #[derivative(Debug = "ignore")]
    in_flight: RefCell<HashMap<Ticket, Weak<RefCell<UnitState>>>>,
    next_ticket: Cell<u64>,
}

impl LoaderContext {
    pub(crate) fn new(
        transport: Box<dyn Transport>,
        transform: ByteTransform,
        scheduler: RetryScheduler,
    ) -> Self {
        let (send, completion_recv) = crossbeam_channel::unbounded();
        Self {
            transport,
            transform,
            scheduler,
            completion_send: CompletionSender::new(send),
            completion_recv,
            in_flight: RefCell::new(HashMap::new()),
            next_ticket: Cell::new(0),
        }
    }

    fn allocate_ticket(&self) -> Ticket {
        let ticket = self.next_ticket.get() + 1;
        self.next_ticket.set(ticket);
        Ticket(ticket)
    }

    /// Start fetching `url` on behalf of `unit`, mapping it to its encrypted path if needed
    pub(crate) fn fetch(&self, url: &str, unit: &Rc<RefCell<UnitState>>) -> Ticket {
        let ticket = self.allocate_ticket();
        let fetch_url = if self.transform.should_transform(url) {
            encrypted_url(url)
        } else {
            url.to_string()
        };
        self.in_flight
            .borrow_mut()
            .insert(ticket, Rc::downgrade(unit));
        tracing::trace!("Fetching {} as {:?}", fetch_url, ticket);
        self.transport.fetch(
            FetchRequest {
                ticket,
                url: fetch_url,
            },
            self.completion_send.clone(),
        );
        ticket
    }

    /// Stop waiting on `ticket`, its completion will be discarded
    pub(crate) fn forget(&self, ticket: Ticket) {
        self.in_flight.borrow_mut().remove(&ticket);
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.borrow().len()
    }

    /// Deliver every completion received so far, returns how many reached a live unit
    pub(crate) fn pump(self: &Rc<Self>) -> usize {
        let mut delivered = 0;
        while let Ok(completion) = self.completion_recv.try_recv() {
            let unit = self
                .in_flight
                .borrow_mut()
                .remove(&completion.ticket)
                .and_then(|unit| unit.upgrade());
            match unit {
                Some(state) => {
                    LoadUnit::from_parts(state, self.clone())
                        .on_transport_complete(completion.ticket, completion.result);
                    delivered += 1;
                }
                None => {
                    tracing::trace!("Discarding completion of {:?}", completion.ticket);
                }
            }
        }
        delivered
    }
}
