pub mod debounce;
pub mod notice;
