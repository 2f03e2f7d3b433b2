pub mod event;
pub mod login_log;
pub mod session;
