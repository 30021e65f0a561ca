mod item;
mod transition;

pub use item::{Analysis, ItemRecord, NewRecord, RecordStatus};
#[cfg(test)]
pub use item::Sentiment;
pub use transition::{RecordPatch, TransitionError};
