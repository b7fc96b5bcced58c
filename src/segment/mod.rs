pub mod store;
pub mod writer;

pub use store::SegmentStore;
pub use writer::{SegmentMeta, SegmentWriter};
