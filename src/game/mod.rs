pub mod betting;
pub mod clock;
pub mod schedule;
pub mod settle;
pub mod types;

pub use betting::{BettingError, HandVars};
pub use schedule::DealSchedule;
pub use settle::{FoldWinner, WinnerSelector};
