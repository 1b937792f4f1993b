//! Sisyphus: a task list that wipes itself every day at a time each user
//! picks. The HTTP surface is ordinary CRUD over Redis; the interesting part
//! is [`scheduler`], which applies each user's daily reset exactly once per
//! reset boundary however often it is triggered.

pub mod clock;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod scheduler;
pub mod services;
pub mod state;
