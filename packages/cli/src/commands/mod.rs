pub mod replay;
pub mod show;
pub mod summary;

pub use replay::{replay, ReplayArgs};
pub use show::{show, ShowArgs};
pub use summary::{summary, SummaryArgs};
