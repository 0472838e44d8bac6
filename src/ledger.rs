// In-memory record of finalized purchases, insertion only

use dashmap::{mapref::entry::Entry, DashMap};
use uuid::Uuid;

use crate::error::GatewayError;
use crate::model::{Ticket, TicketStatus};

#[derive(Debug, Default)]
pub struct TicketLedger {
    tickets: DashMap<Uuid, Ticket>,
}

impl TicketLedger {
    pub fn new() -> Self {
        Self::default()
    }

    // Only paid tickets with a transaction id get in, and each id only once
    pub fn insert(&self, ticket: Ticket) -> Result<Uuid, GatewayError> {
        if ticket.status != TicketStatus::Paid {
            return Err(GatewayError::Internal(format!(
                "refusing to record ticket in state {:?}",
                ticket.status
            )));
        }

        let id = ticket.transaction_id.ok_or_else(|| {
            GatewayError::Internal("refusing to record ticket without transaction id".to_string())
        })?;

        match self.tickets.entry(id) {
            Entry::Occupied(_) => Err(GatewayError::Internal(format!(
                "transaction {id} already recorded"
            ))),
            Entry::Vacant(slot) => {
                slot.insert(ticket);
                Ok(id)
            }
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<Ticket> {
        self.tickets.get(id).map(|t| t.value().clone())
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.tickets.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }
}
