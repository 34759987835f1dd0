pub mod event;
pub mod subject;
