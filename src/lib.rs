//! MYNA stylist backend: a per-session workflow that generates an outfit
//! from an uploaded photo, recommends catalog products for the detected
//! garments, and answers stylist chat, all over a small JSON API.

pub mod audit;
pub mod catalog;
pub mod config;
pub mod error;
pub mod models;
pub mod routes;
pub mod stylist;
pub mod workflow;
