pub mod compare;
pub mod fetch;
pub mod survey;
pub mod tiles;

pub use compare::compare;
pub use fetch::{fetch, OutputOptions};
pub use survey::{survey, SurveyOptions, SurveyPreset};
pub use tiles::dump_tiles;
