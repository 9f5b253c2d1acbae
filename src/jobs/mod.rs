// Jobs module - Scheduled background work

pub mod purge_expired;
