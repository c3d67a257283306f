//! Invoice ledger module.
//!
//! Append/update-only copy of the processor's invoices, attached to the
//! subscription they bill.

mod aggregate;
mod events;

pub use aggregate::{minor_units_to_decimal, upsert_items, Invoice, InvoiceItem};
pub use events::InvoiceRecorded;
