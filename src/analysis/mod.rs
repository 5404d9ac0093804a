pub mod chords;
pub mod pipeline;
pub mod result;
