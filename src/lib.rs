pub mod alert;
pub mod backend;
pub mod camera;
pub mod capture_loop;
pub mod clock;
pub mod configuration;
pub mod console;
pub mod error;
pub mod intent;
pub mod location;
pub mod logging;
pub mod microphone;
pub mod narration;
pub mod session;
pub mod ui_state;
