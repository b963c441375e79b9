pub mod events;
pub mod pages;
pub mod stats;
pub mod stream;
