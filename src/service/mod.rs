pub mod abstracts;
pub mod admin;
pub mod auth;
pub mod contact;
pub mod crypto;
pub mod emails;
pub mod gateway;
pub mod log;
pub mod mail;
pub mod payment;
pub mod review;
pub mod user;
