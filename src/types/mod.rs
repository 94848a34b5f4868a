mod auth;
mod chat;
mod grievance;
mod user;

pub use auth::*;
pub use chat::*;
pub use grievance::*;
pub use user::*;
