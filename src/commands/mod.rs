pub mod journal;
pub mod run;
pub mod scan;
pub mod stats;
