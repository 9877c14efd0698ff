pub mod chain;

pub mod client;

pub mod config;

pub mod contract;

pub mod error;

pub mod events;

pub mod submitter;

pub mod sync;

pub mod test_helpers;

pub mod ui;

pub mod wallets;
