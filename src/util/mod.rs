pub mod logging;
pub mod output;
pub mod parallel;
pub mod template;
