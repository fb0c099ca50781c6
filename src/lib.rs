//! LabGuard Pro mobile printing: QR label print jobs for surveillance sample pools.
//!
//! The server side (`handlers`, `store`, `labels`, `mailer`) renders and relays label
//! PDFs; the client side (`builder`, `dispatch`, `reporter`) assembles jobs and delivers
//! them through a [`platform::Platform`].

pub mod builder;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod handlers;
pub mod labels;
pub mod mailer;
pub mod models;
pub mod platform;
pub mod qrcode;
pub mod reporter;
pub mod store;
