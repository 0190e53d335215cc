pub mod completion;
pub mod explore;
pub mod run;
