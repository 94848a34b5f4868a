pub mod chat;
pub mod grievance;
pub mod message;
pub mod user;

pub use chat::{Chat, PLACEHOLDER_TITLE};
pub use grievance::{Grievance, GrievanceStatus};
pub use message::{Message, Role};
pub use user::{User, UserRole};
