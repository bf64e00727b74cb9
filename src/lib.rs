//! Kerjasama Agent: answers customer inquiries on a business's WhatsApp
//! number.

pub mod agent;
pub mod calendar;
pub mod classifier;
pub mod config;
pub mod crypto;
pub mod date_parser;
pub mod error;
pub mod llm;
pub mod processor;
pub mod store;
pub mod webhook;
pub mod whatsapp;
