#![allow(dead_code)]

pub mod fake_fetcher;
pub mod socket_guard;
