// Models module - Database entity representations

pub mod revocation;

pub use revocation::RevocationRecord;
