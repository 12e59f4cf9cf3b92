//! The generic list screen: fetch → filter/paginate → mutate → refetch.

pub mod controller;
pub mod filter;
pub mod paginate;

pub use controller::{
    Action, AssumeYes, Confirm, Editor, EditorMode, FieldValue, ListController, Outcome, Phase,
};
pub use filter::Filter;
pub use paginate::PageView;
