pub mod entity;
pub mod list;
pub mod notification;
pub mod registration;
pub mod task;
pub mod timestamp;
