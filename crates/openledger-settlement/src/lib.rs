//! # openledger-settlement
//!
//! **Settlement plane**: monthly, versioned aggregation of allocation
//! activity into per-seller settlements, plus the billing documents
//! derived from them.
//!
//! ## Architecture
//!
//! - [`SettlementBook`] owns one live settlement per
//!   `(store, year, month)`. Generation builds a Draft from the escrow
//!   ledger's allocation activity; regeneration is guarded by an
//!   optimistic `expected_version` check so concurrent regeneration
//!   attempts fail loudly instead of silently overwriting. Superseded
//!   versions are archived, never deleted.
//! - [`InvoiceIssuer`] derives a commission invoice — or a credit note
//!   when refunds drove net commission negative — from a finalized
//!   settlement, applying a given tax rate.

pub mod billing;
pub mod book;

pub use billing::InvoiceIssuer;
pub use book::SettlementBook;
