pub mod cleaning;
pub mod controller;
pub mod dataset;
pub mod domain;
pub mod filter;
pub mod inputter;
pub mod inspect;
pub mod render;
pub mod session;
pub mod source;
pub mod stats;
pub mod toggles;
pub mod ui;
pub mod viz;
