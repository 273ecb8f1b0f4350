pub mod fetch;
pub mod rate;
pub mod rates;
pub mod services;
pub mod setup;
pub mod ui;
