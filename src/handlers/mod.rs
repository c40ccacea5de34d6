pub mod abstracts;
pub mod admin;
pub mod auth;
pub mod contact;
pub mod payment;
pub mod review;
pub mod user;
