pub mod report;
pub mod upvote;
pub mod user;

pub use report::{Entity as Report, Model as ReportModel};
pub use upvote::{Entity as Upvote, Model as UpvoteModel};
pub use user::{Entity as User, Model as UserModel};
